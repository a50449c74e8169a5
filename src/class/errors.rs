use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassError {
    #[error("bad magic 0x{found:08X}, not a class file")]
    BadMagic { found: u32 },

    #[error("unexpected end of class data at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {index} is not a {expected}")]
    BadConstant { index: u16, expected: &'static str },

    #[error("unknown opcode 0x{opcode:02X} at bytecode offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    BadBranchTarget { offset: u32, target: i64 },

    #[error("malformed {attribute} attribute: {message}")]
    BadAttribute {
        attribute: &'static str,
        message: String,
    },

    #[error("{count} trailing bytes after the class structure")]
    TrailingBytes { count: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("branch from offset {offset} to {target} does not fit a 16-bit offset")]
    BranchOutOfRange { offset: u32, target: u32 },

    #[error("method body is {length} bytes, larger than the 65535 byte limit")]
    CodeTooLarge { length: usize },

    #[error("two stack map frames collapse onto offset {offset}")]
    FrameCollision { offset: u32 },

    #[error("constant pool would exceed 65535 entries")]
    ConstantPoolOverflow,

    #[error("{what} count {count} does not fit in 16 bits")]
    TooMany { what: &'static str, count: usize },
}

/// Reasons a target-method lookup could not settle on a single method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("no method in {class} matches {rule}")]
    NoCandidates { class: String, rule: String },

    #[error("{count} methods in {class} match {rule}, expected exactly 1")]
    Ambiguous {
        class: String,
        rule: String,
        count: usize,
    },
}
