//! Generic JVM instruction decoding.
//!
//! Only the kinds that transformers match on get structured variants; every
//! other opcode is carried as [`Instruction::Other`] with its operand bytes
//! untouched.

use crate::class::bytes::ByteReader;
use crate::class::constant_pool::{ConstantPool, MemberRef};
use crate::class::errors::ClassError;
use std::collections::BTreeSet;
use std::fmt;

/// Original bytecode offset of an instruction. Branches, handlers, frames and
/// debug tables refer to labels, so they survive splicing.
pub type Label = u32;

pub mod op {
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_5: u8 = 0x08;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC_W: u8 = 0x13;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_3: u8 = 0x2d;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IFNE: u8 = 0x9a;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const RETURN: u8 = 0xb1;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const WIDE: u8 = 0xc4;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl LocalKind {
    const ALL: [LocalKind; 5] = [
        LocalKind::Int,
        LocalKind::Long,
        LocalKind::Float,
        LocalKind::Double,
        LocalKind::Reference,
    ];

    fn index(self) -> u8 {
        self as u8
    }

    pub fn load_opcode(self) -> u8 {
        op::ILOAD + self.index()
    }

    /// `xload_<n>` opcode for slots 0..=3.
    pub fn short_load_opcode(self, slot: u8) -> u8 {
        op::ILOAD_0 + self.index() * 4 + slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    pub fn opcode(self) -> u8 {
        match self {
            InvokeKind::Virtual => op::INVOKEVIRTUAL,
            InvokeKind::Special => op::INVOKESPECIAL,
            InvokeKind::Static => op::INVOKESTATIC,
            InvokeKind::Interface => op::INVOKEINTERFACE,
        }
    }

    fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            op::INVOKEVIRTUAL => Some(InvokeKind::Virtual),
            op::INVOKESPECIAL => Some(InvokeKind::Special),
            op::INVOKESTATIC => Some(InvokeKind::Static),
            op::INVOKEINTERFACE => Some(InvokeKind::Interface),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Switch {
    Table {
        default: Label,
        low: i32,
        targets: Vec<Label>,
    },
    Lookup {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `iload`..`aload` in any of their short, normal or `wide` forms.
    LoadLocal { kind: LocalKind, slot: u16 },
    /// `iconst_<n>`, `bipush`, `sipush`.
    PushConstant { value: i32 },
    InvokeMethod {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },
    /// Conditional and unconditional jumps, including `jsr` and the `_w` forms.
    Branch { opcode: u8, target: Label },
    Switch(Switch),
    Other { opcode: u8, operands: Vec<u8> },
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::LoadLocal { kind, .. } => kind.load_opcode(),
            Instruction::PushConstant { value } => match *value {
                -1..=5 => (op::ICONST_M1 as i32 + 1 + *value) as u8,
                v if i8::try_from(v).is_ok() => op::BIPUSH,
                v if i16::try_from(v).is_ok() => op::SIPUSH,
                _ => op::LDC_W,
            },
            Instruction::InvokeMethod { kind, .. } => kind.opcode(),
            Instruction::Branch { opcode, .. } => *opcode,
            Instruction::Switch(Switch::Table { .. }) => op::TABLESWITCH,
            Instruction::Switch(Switch::Lookup { .. }) => op::LOOKUPSWITCH,
            Instruction::Other { opcode, .. } => *opcode,
        }
    }

    pub(crate) fn member(&self) -> Option<MemberRef> {
        match self {
            Instruction::InvokeMethod {
                owner,
                name,
                descriptor,
                interface,
                ..
            } => Some(MemberRef {
                owner: owner.clone(),
                name: name.clone(),
                descriptor: descriptor.clone(),
                interface: *interface,
            }),
            _ => None,
        }
    }

    /// Every label this instruction jumps to.
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::Switch(Switch::Table {
                default, targets, ..
            }) => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Instruction::Switch(Switch::Lookup { default, pairs }) => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, t)| *t))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadLocal { kind, slot } => write!(f, "load {:?} #{}", kind, slot),
            Instruction::PushConstant { value } => write!(f, "push {}", value),
            Instruction::InvokeMethod {
                kind,
                owner,
                name,
                descriptor,
                ..
            } => write!(f, "invoke{:?} {}.{}{}", kind, owner, name, descriptor),
            Instruction::Branch { opcode, target } => {
                write!(f, "branch 0x{:02x} -> @{}", opcode, target)
            }
            Instruction::Switch(switch) => {
                let (kind, default) = match switch {
                    Switch::Table { default, .. } => ("tableswitch", default),
                    Switch::Lookup { default, .. } => ("lookupswitch", default),
                };
                write!(f, "{} default @{}", kind, default)
            }
            Instruction::Other { opcode, operands } => {
                write!(f, "op 0x{:02x}", opcode)?;
                for b in operands {
                    write!(f, " {:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// One element of a method's instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Offset in the decoded body; `None` for instructions added by a transformer.
    pub label: Option<Label>,
    pub instruction: Instruction,
}

impl Insn {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            label: None,
            instruction,
        }
    }
}

/// Operand byte count for opcodes that decode as [`Instruction::Other`].
fn plain_operand_len(opcode: u8) -> Option<usize> {
    Some(match opcode {
        0x00..=0x0f => 0,
        0x12 => 1,
        0x13 | 0x14 => 2,
        0x2e..=0x35 => 0,
        op::ISTORE..=op::ASTORE => 1,
        0x3b..=0x83 => 0,
        op::IINC => 2,
        0x85..=0x98 => 0,
        op::RET => 1,
        0xac..=0xb1 => 0,
        0xb2..=0xb5 => 2,
        0xba => 4,
        0xbb => 2,
        0xbc => 1,
        0xbd => 2,
        0xbe | 0xbf => 0,
        0xc0 | 0xc1 => 2,
        0xc2 | 0xc3 => 0,
        0xc5 => 3,
        _ => return None,
    })
}

fn is_narrow_branch(opcode: u8) -> bool {
    matches!(opcode, op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL)
}

pub(crate) fn is_wide_branch(opcode: u8) -> bool {
    matches!(opcode, op::GOTO_W | op::JSR_W)
}

/// Padding after a switch opcode at `offset` so the operands are 4-byte aligned.
pub(crate) fn switch_padding(offset: u32) -> u32 {
    (4 - ((offset + 1) % 4)) % 4
}

/// Decode a method body. Targets are checked against instruction boundaries.
pub(crate) fn decode_instructions(
    code: &[u8],
    pool: &ConstantPool,
) -> Result<Vec<Insn>, ClassError> {
    let mut reader = ByteReader::new(code);
    let mut insns = Vec::new();
    let mut boundaries = BTreeSet::new();
    let mut jumps: Vec<(u32, i64)> = Vec::new();

    while reader.remaining() > 0 {
        let offset = reader.position() as u32;
        boundaries.insert(offset);
        let opcode = reader.u1()?;
        let mut target = |rel: i64| -> Label {
            let absolute = offset as i64 + rel;
            jumps.push((offset, absolute));
            absolute.max(0) as Label
        };

        let instruction = match opcode {
            op::ICONST_M1..=op::ICONST_5 => Instruction::PushConstant {
                value: opcode as i32 - op::ICONST_M1 as i32 - 1,
            },
            op::BIPUSH => Instruction::PushConstant {
                value: reader.i1()? as i32,
            },
            op::SIPUSH => Instruction::PushConstant {
                value: reader.i2()? as i32,
            },
            op::ILOAD..=op::ALOAD => Instruction::LoadLocal {
                kind: LocalKind::ALL[(opcode - op::ILOAD) as usize],
                slot: reader.u1()? as u16,
            },
            op::ILOAD_0..=op::ALOAD_3 => {
                let n = opcode - op::ILOAD_0;
                Instruction::LoadLocal {
                    kind: LocalKind::ALL[(n / 4) as usize],
                    slot: (n % 4) as u16,
                }
            }
            _ if is_narrow_branch(opcode) => {
                let rel = reader.i2()? as i64;
                Instruction::Branch {
                    opcode,
                    target: target(rel),
                }
            }
            op::GOTO_W | op::JSR_W => {
                let rel = reader.i4()? as i64;
                Instruction::Branch {
                    opcode,
                    target: target(rel),
                }
            }
            op::TABLESWITCH => {
                reader.skip(switch_padding(offset) as usize)?;
                let default = target(reader.i4()? as i64);
                let low = reader.i4()?;
                let high = reader.i4()?;
                let count = (high as i64) - (low as i64) + 1;
                if count < 0 || count as usize > reader.remaining() / 4 {
                    return Err(ClassError::BadAttribute {
                        attribute: "Code",
                        message: format!("tableswitch at {} has range {}..={}", offset, low, high),
                    });
                }
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(target(reader.i4()? as i64));
                }
                Instruction::Switch(Switch::Table {
                    default,
                    low,
                    targets,
                })
            }
            op::LOOKUPSWITCH => {
                reader.skip(switch_padding(offset) as usize)?;
                let default = target(reader.i4()? as i64);
                let npairs = reader.i4()?;
                if npairs < 0 || npairs as usize > reader.remaining() / 8 {
                    return Err(ClassError::BadAttribute {
                        attribute: "Code",
                        message: format!("lookupswitch at {} has {} pairs", offset, npairs),
                    });
                }
                let mut pairs = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let key = reader.i4()?;
                    pairs.push((key, target(reader.i4()? as i64)));
                }
                Instruction::Switch(Switch::Lookup { default, pairs })
            }
            op::INVOKEVIRTUAL..=op::INVOKEINTERFACE => {
                let index = reader.u2()?;
                if opcode == op::INVOKEINTERFACE {
                    // count and the reserved zero byte are recomputed on encode
                    reader.skip(2)?;
                }
                let member = pool.member_ref(index)?;
                Instruction::InvokeMethod {
                    kind: InvokeKind::from_opcode(opcode).unwrap_or(InvokeKind::Virtual),
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    interface: member.interface,
                }
            }
            op::WIDE => {
                let inner = reader.u1()?;
                match inner {
                    op::ILOAD..=op::ALOAD => Instruction::LoadLocal {
                        kind: LocalKind::ALL[(inner - op::ILOAD) as usize],
                        slot: reader.u2()?,
                    },
                    op::IINC => {
                        let mut operands = vec![inner];
                        operands.extend_from_slice(reader.take(4)?);
                        Instruction::Other { opcode, operands }
                    }
                    op::ISTORE..=op::ASTORE | op::RET => {
                        let mut operands = vec![inner];
                        operands.extend_from_slice(reader.take(2)?);
                        Instruction::Other { opcode, operands }
                    }
                    _ => {
                        return Err(ClassError::UnknownOpcode {
                            opcode: inner,
                            offset: offset + 1,
                        })
                    }
                }
            }
            _ => match plain_operand_len(opcode) {
                Some(len) => Instruction::Other {
                    opcode,
                    operands: reader.take(len)?.to_vec(),
                },
                None => return Err(ClassError::UnknownOpcode { opcode, offset }),
            },
        };

        insns.push(Insn {
            label: Some(offset),
            instruction,
        });
    }

    for (offset, target) in jumps {
        if target < 0 || !boundaries.contains(&(target as u32)) {
            return Err(ClassError::BadBranchTarget { offset, target });
        }
    }

    Ok(insns)
}

/// Number of argument slots a method descriptor consumes (long/double count twice).
pub fn argument_slots(descriptor: &str) -> usize {
    let params = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .unwrap_or("");
    let mut slots = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => slots += 2,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                slots += 1;
            }
            '[' => {
                // arrays are one reference slot regardless of element type
                let mut element = chars.next();
                while element == Some('[') {
                    element = chars.next();
                }
                if element == Some('L') {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                slots += 1;
            }
            _ => slots += 1,
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::constant_pool::MemberRef;

    fn pool_with_next_int() -> (ConstantPool, u16) {
        let mut pool = ConstantPool::new();
        let idx = pool
            .add_method_ref(&MemberRef {
                owner: "java/util/Random".to_string(),
                name: "nextInt".to_string(),
                descriptor: "(I)I".to_string(),
                interface: false,
            })
            .unwrap();
        (pool, idx)
    }

    #[test]
    fn test_decode_guard_sequence() {
        let (pool, idx) = pool_with_next_int();
        let code = [
            0x2a, // aload_0
            0x10, 0x08, // bipush 8
            0xb6, 0x00, idx as u8, // invokevirtual
            0x9a, 0x00, 0x05, // ifne +5
            0x03, // iconst_0
            0xac, // ireturn
            0x04, // iconst_1
            0xac, // ireturn
        ];
        let insns = decode_instructions(&code, &pool).unwrap();
        assert_eq!(insns.len(), 8);
        assert_eq!(
            insns[0].instruction,
            Instruction::LoadLocal {
                kind: LocalKind::Reference,
                slot: 0
            }
        );
        assert_eq!(insns[1].instruction, Instruction::PushConstant { value: 8 });
        assert!(matches!(
            &insns[2].instruction,
            Instruction::InvokeMethod { name, owner, .. } if name == "nextInt" && owner == "java/util/Random"
        ));
        assert_eq!(
            insns[3].instruction,
            Instruction::Branch {
                opcode: op::IFNE,
                target: 11
            }
        );
        assert_eq!(insns[4].instruction, Instruction::PushConstant { value: 0 });
        assert_eq!(insns[6].label, Some(11));
    }

    #[test]
    fn test_branch_into_operand_is_rejected() {
        let pool = ConstantPool::new();
        // goto +1 lands inside its own operand bytes
        let code = [0xa7, 0x00, 0x01, 0xb1];
        let err = decode_instructions(&code, &pool).unwrap_err();
        assert_eq!(err, ClassError::BadBranchTarget { offset: 0, target: 1 });
    }

    #[test]
    fn test_wide_forms() {
        let pool = ConstantPool::new();
        let code = [
            0xc4, 0x19, 0x01, 0x2c, // wide aload 300
            0xc4, 0x84, 0x01, 0x2c, 0xff, 0xff, // wide iinc 300 -1
            0xb1,
        ];
        let insns = decode_instructions(&code, &pool).unwrap();
        assert_eq!(
            insns[0].instruction,
            Instruction::LoadLocal {
                kind: LocalKind::Reference,
                slot: 300
            }
        );
        assert_eq!(
            insns[1].instruction,
            Instruction::Other {
                opcode: op::WIDE,
                operands: vec![0x84, 0x01, 0x2c, 0xff, 0xff]
            }
        );
        assert_eq!(insns[2].label, Some(10));
    }

    #[test]
    fn test_tableswitch_padding_and_targets() {
        let pool = ConstantPool::new();
        // 0: iload_0, 1: tableswitch (pad 2), default/low/high + 2 targets
        let mut code = vec![0x1a, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&23i32.to_be_bytes()); // default -> 24
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&24i32.to_be_bytes()); // -> 25
        code.push(0xb1); // 24: return
        code.push(0xb1); // 25: return
        let insns = decode_instructions(&code, &pool).unwrap();
        assert_eq!(
            insns[1].instruction,
            Instruction::Switch(Switch::Table {
                default: 24,
                low: 0,
                targets: vec![24, 25]
            })
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let pool = ConstantPool::new();
        let err = decode_instructions(&[0x00, 0xfe], &pool).unwrap_err();
        assert_eq!(
            err,
            ClassError::UnknownOpcode {
                opcode: 0xfe,
                offset: 1
            }
        );
    }

    #[test]
    fn test_push_constant_opcode_choice() {
        assert_eq!(Instruction::PushConstant { value: -1 }.opcode(), 0x02);
        assert_eq!(Instruction::PushConstant { value: 5 }.opcode(), 0x08);
        assert_eq!(Instruction::PushConstant { value: 8 }.opcode(), op::BIPUSH);
        assert_eq!(Instruction::PushConstant { value: 1000 }.opcode(), op::SIPUSH);
        assert_eq!(Instruction::PushConstant { value: 1 << 20 }.opcode(), op::LDC_W);
    }

    #[test]
    fn test_argument_slots() {
        assert_eq!(argument_slots("()V"), 0);
        assert_eq!(argument_slots("(I)I"), 1);
        assert_eq!(argument_slots("(JLjava/lang/String;D[I[[Ljava/lang/Object;Z)V"), 8);
    }
}
