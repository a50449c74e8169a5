//! Constant pool decoding, lookup and append-only growth.
//!
//! Entries are never reordered or removed, so every index that opaque
//! instructions and attributes carry stays valid after an edit.

use crate::class::bytes::{ByteReader, ByteWriter};
use crate::class::errors::{ClassError, EncodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Slot 0 and the upper slot of a long or double.
    Unusable,
    /// Raw modified UTF-8 bytes.
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE bits, kept raw so NaN payloads survive.
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved `Methodref` / `InterfaceMethodref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self, ClassError> {
        let count = reader.u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        while entries.len() < count as usize {
            let index = entries.len() as u16;
            let tag = reader.u1()?;
            let constant = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    Constant::Utf8(reader.take(len)?.to_vec())
                }
                3 => Constant::Integer(reader.i4()?),
                4 => Constant::Float(reader.u4()?),
                5 => {
                    let hi = reader.u4()? as u64;
                    let lo = reader.u4()? as u64;
                    Constant::Long(((hi << 32) | lo) as i64)
                }
                6 => {
                    let hi = reader.u4()? as u64;
                    let lo = reader.u4()? as u64;
                    Constant::Double((hi << 32) | lo)
                }
                7 => Constant::Class(reader.u2()?),
                8 => Constant::String(reader.u2()?),
                9 => Constant::FieldRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                10 => Constant::MethodRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                12 => Constant::NameAndType {
                    name: reader.u2()?,
                    descriptor: reader.u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.u1()?,
                    reference: reader.u2()?,
                },
                16 => Constant::MethodType(reader.u2()?),
                17 => Constant::Dynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                19 => Constant::Module(reader.u2()?),
                20 => Constant::Package(reader.u2()?),
                _ => return Err(ClassError::UnknownConstantTag { tag, index }),
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        // A long/double in the last slot overruns the declared count.
        if entries.len() != count as usize {
            return Err(ClassError::BadAttribute {
                attribute: "constant pool",
                message: format!(
                    "two-slot constant overruns declared count {}",
                    count
                ),
            });
        }

        Ok(Self { entries })
    }

    pub(crate) fn encode(&self, out: &mut ByteWriter) -> Result<(), EncodeError> {
        let count = u16::try_from(self.entries.len()).map_err(|_| EncodeError::ConstantPoolOverflow)?;
        out.u2(count);
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.u1(1);
                    let len = u16::try_from(bytes.len()).map_err(|_| EncodeError::TooMany {
                        what: "Utf8 byte",
                        count: bytes.len(),
                    })?;
                    out.u2(len);
                    out.bytes(bytes);
                }
                Constant::Integer(v) => {
                    out.u1(3);
                    out.i4(*v);
                }
                Constant::Float(bits) => {
                    out.u1(4);
                    out.u4(*bits);
                }
                Constant::Long(v) => {
                    out.u1(5);
                    out.u4((*v as u64 >> 32) as u32);
                    out.u4(*v as u32);
                }
                Constant::Double(bits) => {
                    out.u1(6);
                    out.u4((bits >> 32) as u32);
                    out.u4(*bits as u32);
                }
                Constant::Class(i) => {
                    out.u1(7);
                    out.u2(*i);
                }
                Constant::String(i) => {
                    out.u1(8);
                    out.u2(*i);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    out.u1(9);
                    out.u2(*class);
                    out.u2(*name_and_type);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    out.u1(10);
                    out.u2(*class);
                    out.u2(*name_and_type);
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    out.u1(11);
                    out.u2(*class);
                    out.u2(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    out.u1(12);
                    out.u2(*name);
                    out.u2(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.u1(15);
                    out.u1(*kind);
                    out.u2(*reference);
                }
                Constant::MethodType(i) => {
                    out.u1(16);
                    out.u2(*i);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.u1(17);
                    out.u2(*bootstrap);
                    out.u2(*name_and_type);
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.u1(18);
                    out.u2(*bootstrap);
                    out.u2(*name_and_type);
                }
                Constant::Module(i) => {
                    out.u1(19);
                    out.u2(*i);
                }
                Constant::Package(i) => {
                    out.u1(20);
                    out.u2(*i);
                }
            }
        }
        Ok(())
    }

    /// Number of slots, including the unusable slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(c) => Some(c),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String, ClassError> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => Ok(decode_modified_utf8(bytes)),
            _ => Err(ClassError::BadConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String, ClassError> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassError::BadConstant {
                index,
                expected: "Class",
            }),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef, ClassError> {
        let (class, name_and_type, interface) = match self.get(index) {
            Some(Constant::MethodRef {
                class,
                name_and_type,
            }) => (*class, *name_and_type, false),
            Some(Constant::InterfaceMethodRef {
                class,
                name_and_type,
            }) => (*class, *name_and_type, true),
            _ => {
                return Err(ClassError::BadConstant {
                    index,
                    expected: "Methodref",
                })
            }
        };
        let (name, descriptor) = match self.get(name_and_type) {
            Some(Constant::NameAndType { name, descriptor }) => (*name, *descriptor),
            _ => {
                return Err(ClassError::BadConstant {
                    index: name_and_type,
                    expected: "NameAndType",
                })
            }
        };
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name: self.utf8(name)?,
            descriptor: self.utf8(descriptor)?,
            interface,
        })
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c == wanted)
            .map(|i| i as u16)
    }

    fn find_or_push(&mut self, constant: Constant) -> Result<u16, EncodeError> {
        if let Some(index) = self.find(&constant) {
            return Ok(index);
        }
        let index = self.entries.len();
        if index >= u16::MAX as usize {
            return Err(EncodeError::ConstantPoolOverflow);
        }
        self.entries.push(constant);
        Ok(index as u16)
    }

    /// Index of an existing Utf8 entry, without growing the pool.
    pub fn utf8_index(&self, value: &str) -> Option<u16> {
        self.find(&Constant::Utf8(encode_modified_utf8(value)))
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16, EncodeError> {
        self.find_or_push(Constant::Integer(value))
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16, EncodeError> {
        self.find_or_push(Constant::Utf8(encode_modified_utf8(value)))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, EncodeError> {
        let name = self.add_utf8(internal_name)?;
        self.find_or_push(Constant::Class(name))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, EncodeError> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.find_or_push(Constant::NameAndType { name, descriptor })
    }

    /// Index of a method reference, appending the chain of entries it needs.
    pub fn add_method_ref(&mut self, member: &MemberRef) -> Result<u16, EncodeError> {
        let class = self.add_class(&member.owner)?;
        let name_and_type = self.add_name_and_type(&member.name, &member.descriptor)?;
        let constant = if member.interface {
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            }
        } else {
            Constant::MethodRef {
                class,
                name_and_type,
            }
        };
        self.find_or_push(constant)
    }
}

/// Decode JVM modified UTF-8 (1-3 byte forms, surrogate pairs, `C0 80` for NUL).
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(char::REPLACEMENT_CHARACTER as u16);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
