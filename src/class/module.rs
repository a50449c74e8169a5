use crate::class::attribute::RawAttribute;
use crate::class::bytes::{ByteReader, ByteWriter};
use crate::class::code::Code;
use crate::class::constant_pool::ConstantPool;
use crate::class::errors::{ClassError, EncodeError, SelectError};
use std::fmt;
use std::ops::BitOr;

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Access and property flags of a class, field or method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(u16);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(0x0020);
    pub const BRIDGE: AccessFlags = AccessFlags(0x0040);
    pub const VARARGS: AccessFlags = AccessFlags(0x0080);
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    pub const STRICT: AccessFlags = AccessFlags(0x0800);
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);

    const NAMES: [(AccessFlags, &'static str); 12] = [
        (Self::PUBLIC, "public"),
        (Self::PRIVATE, "private"),
        (Self::PROTECTED, "protected"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::SYNCHRONIZED, "synchronized"),
        (Self::BRIDGE, "bridge"),
        (Self::VARARGS, "varargs"),
        (Self::NATIVE, "native"),
        (Self::ABSTRACT, "abstract"),
        (Self::STRICT, "strict"),
        (Self::SYNTHETIC, "synthetic"),
    ];

    pub const fn from_bits(bits: u16) -> Self {
        AccessFlags(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: AccessFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "0x{:04x}", self.0)
        } else {
            write!(f, "{}", names.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMethod {
    pub access: AccessFlags,
    pub name: String,
    /// Parameter and return shape, e.g. `(Ljava/util/Random;I)Z`.
    pub descriptor: String,
    /// `None` for abstract and native methods.
    pub code: Option<Code>,
    /// Every attribute except `Code`.
    pub attributes: Vec<RawAttribute>,
}

impl DecodedMethod {
    pub fn instruction_count(&self) -> usize {
        self.code.as_ref().map_or(0, Code::len)
    }

    /// Return type part of the descriptor.
    pub fn return_type(&self) -> &str {
        self.descriptor
            .rsplit_once(')')
            .map_or("", |(_, ret)| ret)
    }

    fn decode(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Self, ClassError> {
        let access = AccessFlags::from_bits(reader.u2()?);
        let name = pool.utf8(reader.u2()?)?;
        let descriptor = pool.utf8(reader.u2()?)?;
        let mut code = None;
        let mut attributes = Vec::new();
        for raw in RawAttribute::decode_list(reader)? {
            if pool.utf8(raw.name_index).ok().as_deref() == Some("Code") {
                if code.is_some() {
                    return Err(ClassError::BadAttribute {
                        attribute: "Code",
                        message: format!("method {}{} has two Code attributes", name, descriptor),
                    });
                }
                code = Some(Code::decode(&raw.info, pool)?);
            } else {
                attributes.push(raw);
            }
        }
        Ok(Self {
            access,
            name,
            descriptor,
            code,
            attributes,
        })
    }

    fn encode(&self, pool: &mut ConstantPool, out: &mut ByteWriter) -> Result<(), EncodeError> {
        out.u2(self.access.bits());
        out.u2(pool.add_utf8(&self.name)?);
        out.u2(pool.add_utf8(&self.descriptor)?);

        let code = match &self.code {
            Some(code) => Some(RawAttribute {
                name_index: pool.add_utf8("Code")?,
                info: code.encode(pool)?,
            }),
            None => None,
        };
        let total = self.attributes.len() + usize::from(code.is_some());
        out.u2(u16::try_from(total).map_err(|_| EncodeError::TooMany {
            what: "method attribute",
            count: total,
        })?);
        if let Some(code) = code {
            code.encode(out)?;
        }
        for attribute in &self.attributes {
            attribute.encode(out)?;
        }
        Ok(())
    }
}

/// Structural form of one class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedModule {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access: AccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<DecodedMethod>,
    pub attributes: Vec<RawAttribute>,
    name: String,
}

impl DecodedModule {
    pub fn decode(bytes: &[u8]) -> Result<Self, ClassError> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.u4()?;
        if magic != MAGIC {
            return Err(ClassError::BadMagic { found: magic });
        }
        let minor_version = reader.u2()?;
        let major_version = reader.u2()?;
        let pool = ConstantPool::decode(&mut reader)?;
        let access = AccessFlags::from_bits(reader.u2()?);
        let this_class = reader.u2()?;
        let name = pool.class_name(this_class)?;
        let super_class = reader.u2()?;

        let interface_count = reader.u2()?;
        let interfaces = (0..interface_count)
            .map(|_| reader.u2())
            .collect::<Result<Vec<_>, _>>()?;

        let field_count = reader.u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(FieldInfo {
                access: AccessFlags::from_bits(reader.u2()?),
                name_index: reader.u2()?,
                descriptor_index: reader.u2()?,
                attributes: RawAttribute::decode_list(&mut reader)?,
            });
        }

        let method_count = reader.u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(DecodedMethod::decode(&mut reader, &pool)?);
        }

        let attributes = RawAttribute::decode_list(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ClassError::TrailingBytes {
                count: reader.remaining(),
            });
        }

        Ok(Self {
            minor_version,
            major_version,
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            name,
        })
    }

    /// Serialize back to class file bytes. The constant pool only grows, and
    /// only when an edited method references something new.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut pool = self.pool.clone();

        let mut body = ByteWriter::default();
        body.u2(self.access.bits());
        body.u2(self.this_class);
        body.u2(self.super_class);
        body.u2(count_u16("interface", self.interfaces.len())?);
        for interface in &self.interfaces {
            body.u2(*interface);
        }
        body.u2(count_u16("field", self.fields.len())?);
        for field in &self.fields {
            body.u2(field.access.bits());
            body.u2(field.name_index);
            body.u2(field.descriptor_index);
            RawAttribute::encode_list(&field.attributes, &mut body)?;
        }
        body.u2(count_u16("method", self.methods.len())?);
        for method in &self.methods {
            method.encode(&mut pool, &mut body)?;
        }
        RawAttribute::encode_list(&self.attributes, &mut body)?;

        let body = body.into_inner();
        let mut out = ByteWriter::with_capacity(body.len() + 1024);
        out.u4(MAGIC);
        out.u2(self.minor_version);
        out.u2(self.major_version);
        pool.encode(&mut out)?;
        out.bytes(&body);
        Ok(out.into_inner())
    }

    /// Internal name, e.g. `net/minecraft/server/EntitySlime`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name, e.g. `net.minecraft.server.EntitySlime`.
    pub fn qualified_name(&self) -> String {
        self.name.replace('/', ".")
    }

    /// Index of the single method matching `rule`.
    pub fn select_method(&self, rule: &MethodRule) -> Result<usize, SelectError> {
        let candidates: Vec<usize> = self
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| rule.matches(m))
            .map(|(i, _)| i)
            .collect();
        match candidates.as_slice() {
            [only] => Ok(*only),
            [] => Err(SelectError::NoCandidates {
                class: self.qualified_name(),
                rule: rule.to_string(),
            }),
            many => Err(SelectError::Ambiguous {
                class: self.qualified_name(),
                rule: rule.to_string(),
                count: many.len(),
            }),
        }
    }
}

fn count_u16(what: &'static str, count: usize) -> Result<u16, EncodeError> {
    u16::try_from(count).map_err(|_| EncodeError::TooMany { what, count })
}

/// Heuristic for locating a method whose name may be obfuscated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodRule {
    pub required: AccessFlags,
    pub forbidden: AccessFlags,
    pub name: Option<String>,
    pub descriptor_suffix: Option<String>,
}

impl MethodRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.required = self.required | flags;
        self
    }

    pub fn without_flags(mut self, flags: AccessFlags) -> Self {
        self.forbidden = self.forbidden | flags;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn descriptor_ends_with(mut self, suffix: impl Into<String>) -> Self {
        self.descriptor_suffix = Some(suffix.into());
        self
    }

    pub fn matches(&self, method: &DecodedMethod) -> bool {
        method.access.contains(self.required)
            && !method.access.intersects(self.forbidden)
            && self.name.as_deref().map_or(true, |n| method.name == n)
            && self
                .descriptor_suffix
                .as_deref()
                .map_or(true, |s| method.descriptor.ends_with(s))
    }
}

impl fmt::Display for MethodRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.required.is_empty() {
            parts.push(format!("[{}]", self.required));
        }
        if !self.forbidden.is_empty() {
            parts.push(format!("not [{}]", self.forbidden));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name {}", name));
        }
        if let Some(suffix) = &self.descriptor_suffix {
            parts.push(format!("descriptor *{}", suffix));
        }
        if parts.is_empty() {
            write!(f, "any method")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::instruction::{op, Instruction};

    fn method(name: &str, descriptor: &str, access: AccessFlags) -> DecodedMethod {
        DecodedMethod {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(Code::new(
                1,
                1,
                vec![
                    Instruction::PushConstant { value: 1 },
                    Instruction::Other {
                        opcode: op::IRETURN,
                        operands: vec![],
                    },
                ],
            )),
            attributes: vec![],
        }
    }

    fn module(methods: Vec<DecodedMethod>) -> DecodedModule {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class("demo/Widget").unwrap();
        let super_class = pool.add_class("java/lang/Object").unwrap();
        DecodedModule {
            minor_version: 0,
            major_version: 52,
            pool,
            access: AccessFlags::PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods,
            attributes: vec![],
            name: "demo/Widget".to_string(),
        }
    }

    #[test]
    fn test_encode_then_decode_built_module() {
        let built = module(vec![
            method("isReady", "()Z", AccessFlags::PUBLIC),
            method("count", "()I", AccessFlags::PUBLIC | AccessFlags::STATIC),
        ]);
        let bytes = built.encode().unwrap();
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);

        let decoded = DecodedModule::decode(&bytes).unwrap();
        assert_eq!(decoded.name(), "demo/Widget");
        assert_eq!(decoded.qualified_name(), "demo.Widget");
        assert_eq!(decoded.methods.len(), 2);
        assert_eq!(decoded.methods[1].name, "count");
        assert_eq!(decoded.methods[1].return_type(), "I");
        assert_eq!(decoded.methods[0].instruction_count(), 2);
    }

    #[test]
    fn test_bad_magic() {
        let err = DecodedModule::decode(&[0xDE, 0xAD, 0xBE, 0xEF, 0, 0]).unwrap_err();
        assert_eq!(err, ClassError::BadMagic { found: 0xDEADBEEF });
    }

    #[test]
    fn test_truncated_module() {
        let bytes = module(vec![method("a", "()Z", AccessFlags::STATIC)])
            .encode()
            .unwrap();
        let err = DecodedModule::decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassError::Truncated { .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = module(vec![]).encode().unwrap();
        bytes.push(0);
        assert_eq!(
            DecodedModule::decode(&bytes).unwrap_err(),
            ClassError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn test_select_exactly_one() {
        let m = module(vec![
            method("a", "()Z", AccessFlags::PUBLIC),
            method("b", "(I)Z", AccessFlags::STATIC),
            method("c", "(I)I", AccessFlags::STATIC),
        ]);
        let rule = MethodRule::new()
            .with_flags(AccessFlags::STATIC)
            .descriptor_ends_with("Z");
        assert_eq!(m.select_method(&rule).unwrap(), 1);
    }

    #[test]
    fn test_select_none_and_ambiguous() {
        let m = module(vec![
            method("a", "()Z", AccessFlags::STATIC),
            method("b", "(I)Z", AccessFlags::STATIC),
        ]);
        let rule = MethodRule::new()
            .with_flags(AccessFlags::STATIC)
            .descriptor_ends_with("Z");
        assert!(matches!(
            m.select_method(&rule),
            Err(SelectError::Ambiguous { count: 2, .. })
        ));

        let rule = rule.without_flags(AccessFlags::STATIC);
        assert!(matches!(
            m.select_method(&rule),
            Err(SelectError::NoCandidates { .. })
        ));
    }

    #[test]
    fn test_access_flags_display() {
        let flags = AccessFlags::PUBLIC | AccessFlags::STATIC;
        assert_eq!(flags.to_string(), "public static");
        assert!(flags.contains(AccessFlags::STATIC));
        assert!(!flags.contains(AccessFlags::PRIVATE | AccessFlags::STATIC));
        assert_eq!(AccessFlags::NONE.to_string(), "0x0000");
    }

    #[test]
    fn test_rule_display() {
        let rule = MethodRule::new()
            .with_flags(AccessFlags::STATIC)
            .without_flags(AccessFlags::PUBLIC)
            .descriptor_ends_with("Z");
        assert_eq!(rule.to_string(), "[static], not [public], descriptor *Z");
    }
}
