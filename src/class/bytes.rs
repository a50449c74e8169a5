//! Big-endian cursor and sink used by the class file codec.

use crate::class::errors::ClassError;

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], ClassError> {
        if self.remaining() < len {
            return Err(ClassError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ClassError> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn u1(&mut self) -> Result<u8, ClassError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn i1(&mut self) -> Result<i8, ClassError> {
        Ok(self.u1()? as i8)
    }

    pub(crate) fn u2(&mut self) -> Result<u16, ClassError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn i2(&mut self) -> Result<i16, ClassError> {
        Ok(self.u2()? as i16)
    }

    pub(crate) fn u4(&mut self) -> Result<u32, ClassError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i4(&mut self) -> Result<i32, ClassError> {
        Ok(self.u4()? as i32)
    }
}

#[derive(Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn u1(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn u2(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn u4(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn i4(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = ByteReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.u2().unwrap(), 0x0102);
        let err = reader.u4().unwrap_err();
        assert_eq!(
            err,
            ClassError::Truncated {
                offset: 2,
                needed: 3
            }
        );
    }

    #[test]
    fn test_signed_reads() {
        let mut reader = ByteReader::new(&[0xFF, 0xFF, 0xFE, 0xFF, 0xFF, 0xFF, 0xFD]);
        assert_eq!(reader.i1().unwrap(), -1);
        assert_eq!(reader.i2().unwrap(), -2);
        assert_eq!(reader.i4().unwrap(), -3);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_writer_big_endian() {
        let mut writer = ByteWriter::default();
        writer.u1(0xCA);
        writer.u2(0xFEBA);
        writer.i4(-1);
        assert_eq!(writer.into_inner(), vec![0xCA, 0xFE, 0xBA, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
