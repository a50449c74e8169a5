use crate::class::bytes::{ByteReader, ByteWriter};
use crate::class::errors::{ClassError, EncodeError};

/// An attribute carried through decode/encode without interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl RawAttribute {
    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self, ClassError> {
        let name_index = reader.u2()?;
        let len = reader.u4()? as usize;
        Ok(Self {
            name_index,
            info: reader.take(len)?.to_vec(),
        })
    }

    pub(crate) fn decode_list(reader: &mut ByteReader<'_>) -> Result<Vec<Self>, ClassError> {
        let count = reader.u2()?;
        (0..count).map(|_| Self::decode(reader)).collect()
    }

    pub(crate) fn encode(&self, out: &mut ByteWriter) -> Result<(), EncodeError> {
        let len = u32::try_from(self.info.len()).map_err(|_| EncodeError::TooMany {
            what: "attribute byte",
            count: self.info.len(),
        })?;
        out.u2(self.name_index);
        out.u4(len);
        out.bytes(&self.info);
        Ok(())
    }

    pub(crate) fn encode_list(attributes: &[Self], out: &mut ByteWriter) -> Result<(), EncodeError> {
        let count = u16::try_from(attributes.len()).map_err(|_| EncodeError::TooMany {
            what: "attribute",
            count: attributes.len(),
        })?;
        out.u2(count);
        for attribute in attributes {
            attribute.encode(out)?;
        }
        Ok(())
    }
}
