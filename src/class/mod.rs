//! Class file codec.
//!
//! [`DecodedModule::decode`] turns class bytes into an editable structure in
//! which method bodies are instruction lists and every bytecode offset is a
//! [`Label`]. [`DecodedModule::encode`] lays the structure out again,
//! resolving labels against whatever instructions survived editing.

mod attribute;
mod bytes;
mod code;
mod constant_pool;
mod errors;
mod instruction;
mod module;

pub use attribute::RawAttribute;
pub use code::{
    Code, CodeAttribute, ExceptionHandler, FrameKind, LineNumber, LocalVariable, StackMapFrame,
    VerificationType,
};
pub use constant_pool::{
    decode_modified_utf8, encode_modified_utf8, Constant, ConstantPool, MemberRef,
};
pub use errors::{ClassError, EncodeError, SelectError};
pub use instruction::{
    argument_slots, op, Insn, Instruction, InvokeKind, Label, LocalKind, Switch,
};
pub use module::{AccessFlags, DecodedMethod, DecodedModule, FieldInfo, MethodRule, MAGIC};
