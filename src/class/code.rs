//! `Code` attribute: instruction list plus everything that refers to offsets.
//!
//! Decoding turns every offset into a [`Label`]. Encoding lays the
//! instructions out again and resolves each label to the new offset of the
//! first surviving decoded instruction at or after it, so removing an
//! instruction moves anything that pointed at it onto its successor.

use crate::class::attribute::RawAttribute;
use crate::class::bytes::{ByteReader, ByteWriter};
use crate::class::constant_pool::ConstantPool;
use crate::class::errors::{ClassError, EncodeError};
use crate::class::instruction::{
    argument_slots, decode_instructions, is_wide_branch, op, switch_padding, Insn, Instruction,
    Label, Switch,
};

const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: Label,
    /// Exclusive; may equal the decoded code length.
    pub end: Label,
    pub handler: Label,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start: Label,
    pub line: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: Label,
    pub end: Label,
    pub name: u16,
    pub descriptor: u16,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    /// Points at the `new` instruction that created the value.
    Uninitialized(Label),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Same,
    SameLocals1(VerificationType),
    Chop(u8),
    Append(Vec<VerificationType>),
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    pub offset: Label,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAttribute {
    LineNumbers {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    /// `LocalVariableTable` and `LocalVariableTypeTable` share this layout.
    LocalVariables {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    StackMap {
        name_index: u16,
        frames: Vec<StackMapFrame>,
    },
    Raw(RawAttribute),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub handlers: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            max_stack,
            max_locals,
            instructions: instructions.into_iter().map(Insn::new).collect(),
            handlers: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Decode the `info` bytes of a `Code` attribute.
    pub(crate) fn decode(info: &[u8], pool: &ConstantPool) -> Result<Self, ClassError> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.u2()?;
        let max_locals = reader.u2()?;
        let code_length = reader.u4()? as usize;
        let bytecode = reader.take(code_length)?;
        let instructions = decode_instructions(bytecode, pool)?;
        let code_length = code_length as Label;

        let handler_count = reader.u2()?;
        let mut handlers = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let handler = ExceptionHandler {
                start: reader.u2()? as Label,
                end: reader.u2()? as Label,
                handler: reader.u2()? as Label,
                catch_type: reader.u2()?,
            };
            if handler.start >= handler.end
                || handler.end > code_length
                || handler.handler >= code_length
            {
                return Err(ClassError::BadAttribute {
                    attribute: "Code",
                    message: format!(
                        "exception range {}..{} -> {} outside code of length {}",
                        handler.start, handler.end, handler.handler, code_length
                    ),
                });
            }
            handlers.push(handler);
        }

        let attribute_count = reader.u2()?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let raw = RawAttribute::decode(&mut reader)?;
            attributes.push(decode_code_attribute(raw, pool)?);
        }

        if reader.remaining() != 0 {
            return Err(ClassError::BadAttribute {
                attribute: "Code",
                message: format!("{} unread bytes", reader.remaining()),
            });
        }

        Ok(Self {
            max_stack,
            max_locals,
            instructions,
            handlers,
            attributes,
        })
    }

    /// Encode into `Code` attribute `info` bytes, growing `pool` when an
    /// instruction references a constant that is not there yet.
    pub(crate) fn encode(&self, pool: &mut ConstantPool) -> Result<Vec<u8>, EncodeError> {
        let constants = self.resolve_constants(pool)?;
        let layout = Layout::compute(&self.instructions)?;
        let labels = LabelMap::new(&self.instructions, &layout);

        let mut body = ByteWriter::with_capacity(layout.length as usize);
        for (i, insn) in self.instructions.iter().enumerate() {
            let offset = layout.offsets[i];
            emit(
                &insn.instruction,
                offset,
                layout.wide[i],
                constants[i],
                &labels,
                &mut body,
            )?;
        }
        debug_assert_eq!(body.len(), layout.length as usize);

        let mut out = ByteWriter::with_capacity(body.len() + 32);
        out.u2(self.max_stack);
        out.u2(self.max_locals);
        out.u4(layout.length);
        out.bytes(&body.into_inner());

        let handlers: Vec<(u16, u16, u16, u16)> = self
            .handlers
            .iter()
            .filter_map(|h| {
                let start = labels.resolve(h.start);
                let end = labels.resolve(h.end);
                (start < end).then(|| {
                    (
                        start as u16,
                        end as u16,
                        labels.resolve(h.handler) as u16,
                        h.catch_type,
                    )
                })
            })
            .collect();
        out.u2(count_u16("exception handler", handlers.len())?);
        for (start, end, handler, catch_type) in handlers {
            out.u2(start);
            out.u2(end);
            out.u2(handler);
            out.u2(catch_type);
        }

        out.u2(count_u16("code attribute", self.attributes.len())?);
        for attribute in &self.attributes {
            encode_code_attribute(attribute, &labels, &mut out)?;
        }

        Ok(out.into_inner())
    }

    fn resolve_constants(&self, pool: &mut ConstantPool) -> Result<Vec<Option<u16>>, EncodeError> {
        self.instructions
            .iter()
            .map(|insn| match &insn.instruction {
                Instruction::InvokeMethod { .. } => match insn.instruction.member() {
                    Some(member) => pool.add_method_ref(&member).map(Some),
                    None => Ok(None),
                },
                Instruction::PushConstant { value } if i16::try_from(*value).is_err() => {
                    pool.add_integer(*value).map(Some)
                }
                _ => Ok(None),
            })
            .collect()
    }
}

fn count_u16(what: &'static str, count: usize) -> Result<u16, EncodeError> {
    u16::try_from(count).map_err(|_| EncodeError::TooMany { what, count })
}

/// New offsets for an instruction list.
struct Layout {
    offsets: Vec<u32>,
    /// Branches that need the 32-bit form.
    wide: Vec<bool>,
    length: u32,
}

impl Layout {
    fn compute(insns: &[Insn]) -> Result<Self, EncodeError> {
        let mut wide: Vec<bool> = insns
            .iter()
            .map(|i| matches!(i.instruction, Instruction::Branch { opcode, .. } if is_wide_branch(opcode)))
            .collect();

        // Widening only grows the body, so this settles after a few rounds.
        loop {
            let mut offsets = Vec::with_capacity(insns.len());
            let mut offset: u32 = 0;
            for (i, insn) in insns.iter().enumerate() {
                offsets.push(offset);
                offset += encoded_size(&insn.instruction, offset, wide[i]);
            }
            if offset as usize > MAX_CODE_LENGTH {
                return Err(EncodeError::CodeTooLarge {
                    length: offset as usize,
                });
            }

            let layout = Layout {
                offsets,
                wide: wide.clone(),
                length: offset,
            };
            let labels = LabelMap::new(insns, &layout);

            let mut widened = false;
            for (i, insn) in insns.iter().enumerate() {
                if let Instruction::Branch { opcode, target } = insn.instruction {
                    if wide[i] {
                        continue;
                    }
                    let from = layout.offsets[i];
                    let to = labels.resolve(target);
                    if i16::try_from(to as i64 - from as i64).is_ok() {
                        continue;
                    }
                    if opcode == op::GOTO || opcode == op::JSR {
                        wide[i] = true;
                        widened = true;
                    } else {
                        return Err(EncodeError::BranchOutOfRange {
                            offset: from,
                            target: to,
                        });
                    }
                }
            }

            if !widened {
                return Ok(layout);
            }
        }
    }
}

fn encoded_size(instruction: &Instruction, offset: u32, wide: bool) -> u32 {
    match instruction {
        Instruction::LoadLocal { slot, .. } => match *slot {
            0..=3 => 1,
            4..=255 => 2,
            _ => 4,
        },
        Instruction::PushConstant { value } => match *value {
            -1..=5 => 1,
            v if i8::try_from(v).is_ok() => 2,
            _ => 3,
        },
        Instruction::InvokeMethod { kind, .. } => {
            if kind.opcode() == op::INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Instruction::Branch { .. } => {
            if wide {
                5
            } else {
                3
            }
        }
        Instruction::Switch(switch) => {
            let pad = switch_padding(offset);
            let body = match switch {
                Switch::Table { targets, .. } => 12 + 4 * targets.len() as u32,
                Switch::Lookup { pairs, .. } => 8 + 8 * pairs.len() as u32,
            };
            1 + pad + body
        }
        Instruction::Other { operands, .. } => 1 + operands.len() as u32,
    }
}

/// Maps decoded offsets to re-encoded offsets.
struct LabelMap {
    /// (decoded label, new offset), ascending by label.
    entries: Vec<(Label, u32)>,
    end: u32,
}

impl LabelMap {
    fn new(insns: &[Insn], layout: &Layout) -> Self {
        let mut entries: Vec<(Label, u32)> = insns
            .iter()
            .zip(&layout.offsets)
            .filter_map(|(insn, offset)| insn.label.map(|label| (label, *offset)))
            .collect();
        entries.sort_by_key(|(label, _)| *label);
        Self {
            entries,
            end: layout.length,
        }
    }

    fn resolve(&self, label: Label) -> u32 {
        let idx = self.entries.partition_point(|(l, _)| *l < label);
        self.entries.get(idx).map_or(self.end, |(_, offset)| *offset)
    }

    fn relative(&self, from: u32, label: Label) -> i64 {
        self.resolve(label) as i64 - from as i64
    }
}

fn emit(
    instruction: &Instruction,
    offset: u32,
    wide: bool,
    constant: Option<u16>,
    labels: &LabelMap,
    out: &mut ByteWriter,
) -> Result<(), EncodeError> {
    match instruction {
        Instruction::LoadLocal { kind, slot } => match *slot {
            0..=3 => out.u1(kind.short_load_opcode(*slot as u8)),
            4..=255 => {
                out.u1(kind.load_opcode());
                out.u1(*slot as u8);
            }
            _ => {
                out.u1(op::WIDE);
                out.u1(kind.load_opcode());
                out.u2(*slot);
            }
        },
        Instruction::PushConstant { value } => match (*value, constant) {
            (-1..=5, _) => out.u1(instruction.opcode()),
            (v, _) if i8::try_from(v).is_ok() => {
                out.u1(op::BIPUSH);
                out.u1(v as i8 as u8);
            }
            (v, _) if i16::try_from(v).is_ok() => {
                out.u1(op::SIPUSH);
                out.u2(v as i16 as u16);
            }
            (_, Some(index)) => {
                out.u1(op::LDC_W);
                out.u2(index);
            }
            (_, None) => unreachable!("integer constants are resolved before emit"),
        },
        Instruction::InvokeMethod {
            kind, descriptor, ..
        } => {
            let index = constant.unwrap_or_default();
            out.u1(kind.opcode());
            out.u2(index);
            if kind.opcode() == op::INVOKEINTERFACE {
                out.u1((argument_slots(descriptor) + 1) as u8);
                out.u1(0);
            }
        }
        Instruction::Branch { opcode, target } => {
            let rel = labels.relative(offset, *target);
            if wide {
                let opcode = match *opcode {
                    op::GOTO => op::GOTO_W,
                    op::JSR => op::JSR_W,
                    other => other,
                };
                out.u1(opcode);
                out.i4(rel as i32);
            } else {
                let rel = i16::try_from(rel).map_err(|_| EncodeError::BranchOutOfRange {
                    offset,
                    target: labels.resolve(*target),
                })?;
                out.u1(*opcode);
                out.u2(rel as u16);
            }
        }
        Instruction::Switch(switch) => {
            out.u1(instruction.opcode());
            for _ in 0..switch_padding(offset) {
                out.u1(0);
            }
            match switch {
                Switch::Table {
                    default,
                    low,
                    targets,
                } => {
                    out.i4(labels.relative(offset, *default) as i32);
                    out.i4(*low);
                    out.i4(low + targets.len() as i32 - 1);
                    for target in targets {
                        out.i4(labels.relative(offset, *target) as i32);
                    }
                }
                Switch::Lookup { default, pairs } => {
                    out.i4(labels.relative(offset, *default) as i32);
                    out.i4(pairs.len() as i32);
                    for (key, target) in pairs {
                        out.i4(*key);
                        out.i4(labels.relative(offset, *target) as i32);
                    }
                }
            }
        }
        Instruction::Other { opcode, operands } => {
            out.u1(*opcode);
            out.bytes(operands);
        }
    }
    Ok(())
}

fn decode_code_attribute(raw: RawAttribute, pool: &ConstantPool) -> Result<CodeAttribute, ClassError> {
    let name = match pool.utf8(raw.name_index) {
        Ok(name) => name,
        Err(_) => return Ok(CodeAttribute::Raw(raw)),
    };
    let mut reader = ByteReader::new(&raw.info);
    let attribute = match name.as_str() {
        "LineNumberTable" => {
            let count = reader.u2()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LineNumber {
                    start: reader.u2()? as Label,
                    line: reader.u2()?,
                });
            }
            CodeAttribute::LineNumbers {
                name_index: raw.name_index,
                entries,
            }
        }
        "LocalVariableTable" | "LocalVariableTypeTable" => {
            let count = reader.u2()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let start = reader.u2()? as Label;
                let length = reader.u2()? as Label;
                entries.push(LocalVariable {
                    start,
                    end: start + length,
                    name: reader.u2()?,
                    descriptor: reader.u2()?,
                    slot: reader.u2()?,
                });
            }
            CodeAttribute::LocalVariables {
                name_index: raw.name_index,
                entries,
            }
        }
        "StackMapTable" => CodeAttribute::StackMap {
            name_index: raw.name_index,
            frames: decode_frames(&mut reader)?,
        },
        _ => return Ok(CodeAttribute::Raw(raw)),
    };
    if reader.remaining() != 0 {
        return Err(ClassError::BadAttribute {
            attribute: "Code",
            message: format!("{} unread bytes in {}", reader.remaining(), name),
        });
    }
    Ok(attribute)
}

fn decode_verification_type(reader: &mut ByteReader<'_>) -> Result<VerificationType, ClassError> {
    Ok(match reader.u1()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(reader.u2()?),
        8 => VerificationType::Uninitialized(reader.u2()? as Label),
        tag => {
            return Err(ClassError::BadAttribute {
                attribute: "StackMapTable",
                message: format!("unknown verification type tag {}", tag),
            })
        }
    })
}

fn decode_types(reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<VerificationType>, ClassError> {
    (0..count).map(|_| decode_verification_type(reader)).collect()
}

fn decode_frames(reader: &mut ByteReader<'_>) -> Result<Vec<StackMapFrame>, ClassError> {
    let count = reader.u2()?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut previous: Option<Label> = None;
    for _ in 0..count {
        let frame_type = reader.u1()?;
        let (delta, kind) = match frame_type {
            0..=63 => (frame_type as u32, FrameKind::Same),
            64..=127 => (
                (frame_type - 64) as u32,
                FrameKind::SameLocals1(decode_verification_type(reader)?),
            ),
            247 => {
                let delta = reader.u2()? as u32;
                (delta, FrameKind::SameLocals1(decode_verification_type(reader)?))
            }
            248..=250 => (reader.u2()? as u32, FrameKind::Chop(251 - frame_type)),
            251 => (reader.u2()? as u32, FrameKind::Same),
            252..=254 => {
                let delta = reader.u2()? as u32;
                let locals = decode_types(reader, (frame_type - 251) as usize)?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = reader.u2()? as u32;
                let local_count = reader.u2()? as usize;
                let locals = decode_types(reader, local_count)?;
                let stack_count = reader.u2()? as usize;
                let stack = decode_types(reader, stack_count)?;
                (delta, FrameKind::Full { locals, stack })
            }
            reserved => {
                return Err(ClassError::BadAttribute {
                    attribute: "StackMapTable",
                    message: format!("reserved frame type {}", reserved),
                })
            }
        };
        let offset = match previous {
            None => delta,
            Some(prev) => prev + delta + 1,
        };
        previous = Some(offset);
        frames.push(StackMapFrame { offset, kind });
    }
    Ok(frames)
}

fn encode_verification_type(vt: &VerificationType, labels: &LabelMap, out: &mut ByteWriter) {
    match vt {
        VerificationType::Top => out.u1(0),
        VerificationType::Integer => out.u1(1),
        VerificationType::Float => out.u1(2),
        VerificationType::Double => out.u1(3),
        VerificationType::Long => out.u1(4),
        VerificationType::Null => out.u1(5),
        VerificationType::UninitializedThis => out.u1(6),
        VerificationType::Object(index) => {
            out.u1(7);
            out.u2(*index);
        }
        VerificationType::Uninitialized(label) => {
            out.u1(8);
            out.u2(labels.resolve(*label) as u16);
        }
    }
}

fn encode_frames(frames: &[StackMapFrame], labels: &LabelMap, out: &mut ByteWriter) -> Result<(), EncodeError> {
    // A frame whose instruction was removed at the very end has nothing left to describe.
    let resolved: Vec<(u32, &FrameKind)> = frames
        .iter()
        .map(|f| (labels.resolve(f.offset), &f.kind))
        .filter(|(offset, _)| *offset < labels.end)
        .collect();

    out.u2(count_u16("stack map frame", resolved.len())?);
    let mut previous: Option<u32> = None;
    for (offset, kind) in resolved {
        let delta = match previous {
            None => offset,
            Some(prev) if offset > prev => offset - prev - 1,
            Some(prev) => return Err(EncodeError::FrameCollision { offset: prev }),
        };
        previous = Some(offset);
        match kind {
            FrameKind::Same if delta <= 63 => out.u1(delta as u8),
            FrameKind::Same => {
                out.u1(251);
                out.u2(delta as u16);
            }
            FrameKind::SameLocals1(vt) => {
                if delta <= 63 {
                    out.u1(64 + delta as u8);
                } else {
                    out.u1(247);
                    out.u2(delta as u16);
                }
                encode_verification_type(vt, labels, out);
            }
            FrameKind::Chop(k) => {
                out.u1(251 - k);
                out.u2(delta as u16);
            }
            FrameKind::Append(locals) => {
                out.u1(251 + locals.len() as u8);
                out.u2(delta as u16);
                for vt in locals {
                    encode_verification_type(vt, labels, out);
                }
            }
            FrameKind::Full { locals, stack } => {
                out.u1(255);
                out.u2(delta as u16);
                out.u2(count_u16("frame local", locals.len())?);
                for vt in locals {
                    encode_verification_type(vt, labels, out);
                }
                out.u2(count_u16("frame stack", stack.len())?);
                for vt in stack {
                    encode_verification_type(vt, labels, out);
                }
            }
        }
    }
    Ok(())
}

fn encode_code_attribute(
    attribute: &CodeAttribute,
    labels: &LabelMap,
    out: &mut ByteWriter,
) -> Result<(), EncodeError> {
    let (name_index, info) = match attribute {
        CodeAttribute::Raw(raw) => (raw.name_index, raw.info.clone()),
        CodeAttribute::LineNumbers {
            name_index,
            entries,
        } => {
            let kept: Vec<(u32, u16)> = entries
                .iter()
                .map(|e| (labels.resolve(e.start), e.line))
                .filter(|(start, _)| *start < labels.end)
                .collect();
            let mut info = ByteWriter::with_capacity(2 + kept.len() * 4);
            info.u2(count_u16("line number", kept.len())?);
            for (start, line) in kept {
                info.u2(start as u16);
                info.u2(line);
            }
            (*name_index, info.into_inner())
        }
        CodeAttribute::LocalVariables {
            name_index,
            entries,
        } => {
            let mut info = ByteWriter::with_capacity(2 + entries.len() * 10);
            info.u2(count_u16("local variable", entries.len())?);
            for entry in entries {
                let start = labels.resolve(entry.start);
                let end = labels.resolve(entry.end).max(start);
                info.u2(start as u16);
                info.u2((end - start) as u16);
                info.u2(entry.name);
                info.u2(entry.descriptor);
                info.u2(entry.slot);
            }
            (*name_index, info.into_inner())
        }
        CodeAttribute::StackMap { name_index, frames } => {
            let mut info = ByteWriter::default();
            encode_frames(frames, labels, &mut info)?;
            (*name_index, info.into_inner())
        }
    };
    RawAttribute { name_index, info }.encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::instruction::{InvokeKind, LocalKind};

    fn guard_code() -> Code {
        let mut code = Code::new(
            2,
            2,
            vec![
                Instruction::LoadLocal {
                    kind: LocalKind::Reference,
                    slot: 0,
                },
                Instruction::PushConstant { value: 8 },
                Instruction::InvokeMethod {
                    kind: InvokeKind::Virtual,
                    owner: "java/util/Random".to_string(),
                    name: "nextInt".to_string(),
                    descriptor: "(I)I".to_string(),
                    interface: false,
                },
                Instruction::Branch {
                    opcode: op::IFNE,
                    target: 11,
                },
                Instruction::PushConstant { value: 0 },
                Instruction::Other {
                    opcode: op::IRETURN,
                    operands: vec![],
                },
                Instruction::PushConstant { value: 1 },
                Instruction::Other {
                    opcode: op::IRETURN,
                    operands: vec![],
                },
            ],
        );
        for (insn, label) in code.instructions.iter_mut().zip([0, 1, 3, 6, 9, 10, 11, 12]) {
            insn.label = Some(label);
        }
        code.handlers.push(ExceptionHandler {
            start: 0,
            end: 9,
            handler: 11,
            catch_type: 0,
        });
        code
    }

    #[test]
    fn test_round_trip_keeps_layout() {
        let mut pool = ConstantPool::new();
        let code = guard_code();
        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        assert_eq!(decoded, code);
    }

    #[test]
    fn test_removal_retargets_branches_and_handlers() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        code.instructions.remove(2);
        code.instructions.remove(0);

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        assert_eq!(decoded.len(), 6);
        // push 8 at 0, ifne at 2, iconst_0 at 5, ireturn at 6, iconst_1 at 7
        assert_eq!(
            decoded.instructions[1].instruction,
            Instruction::Branch {
                opcode: op::IFNE,
                target: 7
            }
        );
        assert_eq!(
            decoded.handlers,
            vec![ExceptionHandler {
                start: 0,
                end: 5,
                handler: 7,
                catch_type: 0
            }]
        );
    }

    #[test]
    fn test_empty_handler_range_is_dropped() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        code.handlers = vec![ExceptionHandler {
            start: 0,
            end: 1,
            handler: 11,
            catch_type: 0,
        }];
        code.instructions.remove(0);
        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        assert!(decoded.handlers.is_empty());
    }

    #[test]
    fn test_far_goto_is_widened() {
        let mut pool = ConstantPool::new();
        let mut instructions = vec![Instruction::Branch {
            opcode: op::GOTO,
            target: 1,
        }];
        instructions.extend((0..40_000).map(|_| Instruction::Other {
            opcode: 0x00,
            operands: vec![],
        }));
        instructions.push(Instruction::Other {
            opcode: op::RETURN,
            operands: vec![],
        });
        let mut code = Code::new(0, 0, instructions);
        code.instructions[0].label = Some(0);
        // target the final return
        code.instructions[0].instruction = Instruction::Branch {
            opcode: op::GOTO,
            target: 40_003,
        };
        let last = code.instructions.len() - 1;
        code.instructions[last].label = Some(40_003);

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        assert_eq!(
            decoded.instructions[0].instruction,
            Instruction::Branch {
                opcode: op::GOTO_W,
                target: 40_005
            }
        );
    }

    #[test]
    fn test_far_conditional_branch_is_an_error() {
        let mut pool = ConstantPool::new();
        let mut instructions = vec![Instruction::Branch {
            opcode: op::IFEQ,
            target: 40_003,
        }];
        instructions.extend((0..40_000).map(|_| Instruction::Other {
            opcode: 0x00,
            operands: vec![],
        }));
        instructions.push(Instruction::Other {
            opcode: op::RETURN,
            operands: vec![],
        });
        let mut code = Code::new(0, 0, instructions);
        let last = code.instructions.len() - 1;
        code.instructions[last].label = Some(40_003);
        let err = code.encode(&mut pool).unwrap_err();
        assert!(matches!(err, EncodeError::BranchOutOfRange { offset: 0, .. }));
    }

    #[test]
    fn test_switch_padding_moves_with_offset() {
        let mut pool = ConstantPool::new();
        let mut code = Code::new(
            1,
            1,
            vec![
                Instruction::Other {
                    opcode: 0x00,
                    operands: vec![],
                },
                Instruction::LoadLocal {
                    kind: LocalKind::Int,
                    slot: 0,
                },
                Instruction::Switch(Switch::Lookup {
                    default: 100,
                    pairs: vec![(7, 101)],
                }),
                Instruction::Other {
                    opcode: op::RETURN,
                    operands: vec![],
                },
                Instruction::Other {
                    opcode: op::RETURN,
                    operands: vec![],
                },
            ],
        );
        code.instructions[3].label = Some(100);
        code.instructions[4].label = Some(101);
        code.instructions.remove(0);

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        // iload_0 at 0, lookupswitch at 1 with 2 padding bytes, 16 bytes of operands
        assert_eq!(decoded.instructions[2].label, Some(20));
        assert_eq!(
            decoded.instructions[1].instruction,
            Instruction::Switch(Switch::Lookup {
                default: 20,
                pairs: vec![(7, 21)]
            })
        );
    }

    #[test]
    fn test_frames_follow_their_instructions() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        code.attributes.push(CodeAttribute::StackMap {
            name_index: pool.add_utf8("StackMapTable").unwrap(),
            frames: vec![
                StackMapFrame {
                    offset: 11,
                    kind: FrameKind::Same,
                },
                StackMapFrame {
                    offset: 12,
                    kind: FrameKind::SameLocals1(VerificationType::Integer),
                },
            ],
        });
        code.instructions.remove(2);
        code.instructions.remove(0);

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        let frames = decoded
            .attributes
            .iter()
            .find_map(|a| match a {
                CodeAttribute::StackMap { frames, .. } => Some(frames.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frames[0].offset, 7);
        assert_eq!(frames[1].offset, 8);
        assert_eq!(frames[1].kind, FrameKind::SameLocals1(VerificationType::Integer));
    }

    fn stack_map(pool: &mut ConstantPool, offsets: &[Label]) -> CodeAttribute {
        CodeAttribute::StackMap {
            name_index: pool.add_utf8("StackMapTable").unwrap(),
            frames: offsets
                .iter()
                .map(|&offset| StackMapFrame {
                    offset,
                    kind: FrameKind::Same,
                })
                .collect(),
        }
    }

    #[test]
    fn test_frames_landing_on_one_offset_collide() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        let frames = stack_map(&mut pool, &[9, 10, 11]);
        code.attributes.push(frames);
        // iconst_0 and ireturn go, so all three frames land on iconst_1
        code.instructions.drain(4..6);

        let err = code.encode(&mut pool).unwrap_err();
        assert!(matches!(err, EncodeError::FrameCollision { offset: 9 }));
    }

    #[test]
    fn test_frame_past_the_end_is_dropped() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        let frames = stack_map(&mut pool, &[11, 12]);
        code.attributes.push(frames);
        code.instructions.pop();

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        let offsets: Vec<Label> = decoded
            .attributes
            .iter()
            .find_map(|a| match a {
                CodeAttribute::StackMap { frames, .. } => {
                    Some(frames.iter().map(|f| f.offset).collect())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(offsets, vec![11]);
    }

    #[test]
    fn test_line_numbers_and_locals_remap() {
        let mut pool = ConstantPool::new();
        let mut code = guard_code();
        let name = pool.add_utf8("random").unwrap();
        let descriptor = pool.add_utf8("Ljava/util/Random;").unwrap();
        code.attributes.push(CodeAttribute::LineNumbers {
            name_index: pool.add_utf8("LineNumberTable").unwrap(),
            entries: vec![
                LineNumber { start: 0, line: 10 },
                LineNumber { start: 11, line: 12 },
            ],
        });
        code.attributes.push(CodeAttribute::LocalVariables {
            name_index: pool.add_utf8("LocalVariableTable").unwrap(),
            entries: vec![LocalVariable {
                start: 0,
                end: 13,
                name,
                descriptor,
                slot: 0,
            }],
        });
        code.instructions.remove(2);
        code.instructions.remove(0);

        let info = code.encode(&mut pool).unwrap();
        let decoded = Code::decode(&info, &pool).unwrap();
        assert!(decoded.attributes.contains(&CodeAttribute::LineNumbers {
            name_index: pool.utf8_index("LineNumberTable").unwrap(),
            entries: vec![
                LineNumber { start: 0, line: 10 },
                LineNumber { start: 7, line: 12 },
            ],
        }));
        assert!(decoded.attributes.iter().any(|a| matches!(
            a,
            CodeAttribute::LocalVariables { entries, .. } if entries[0].start == 0 && entries[0].end == 9
        )));
    }
}
