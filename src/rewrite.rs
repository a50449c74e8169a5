//! Window matching and splicing over a method's instruction sequence.
//!
//! A [`WindowPattern`] is a run of predicates over consecutive instructions.
//! [`WindowRewrite::apply`] edits only the first match and leaves labels to
//! the encoder, which retargets anything that pointed at a removed
//! instruction onto its successor.

use crate::class::{Code, Insn, Instruction, LocalKind};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnPredicate {
    /// `None` matches a load of any kind.
    LoadLocal { kind: Option<LocalKind> },
    PushConstant { value: i32 },
    Invoke { name: String, owner_contains: String },
    Branch,
    Any,
}

impl InsnPredicate {
    pub fn matches(&self, instruction: &Instruction) -> bool {
        match (self, instruction) {
            (InsnPredicate::Any, _) => true,
            (InsnPredicate::LoadLocal { kind }, Instruction::LoadLocal { kind: actual, .. }) => {
                kind.map_or(true, |k| k == *actual)
            }
            (InsnPredicate::PushConstant { value }, Instruction::PushConstant { value: actual }) => {
                value == actual
            }
            (
                InsnPredicate::Invoke {
                    name,
                    owner_contains,
                },
                Instruction::InvokeMethod {
                    name: actual,
                    owner,
                    ..
                },
            ) => name == actual && owner.contains(owner_contains.as_str()),
            (InsnPredicate::Branch, Instruction::Branch { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InsnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsnPredicate::LoadLocal { kind: Some(kind) } => write!(f, "load {:?}", kind),
            InsnPredicate::LoadLocal { kind: None } => write!(f, "load"),
            InsnPredicate::PushConstant { value } => write!(f, "push {}", value),
            InsnPredicate::Invoke {
                name,
                owner_contains,
            } => write!(f, "invoke *{}*.{}", owner_contains, name),
            InsnPredicate::Branch => write!(f, "branch"),
            InsnPredicate::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPattern {
    predicates: Vec<InsnPredicate>,
}

impl WindowPattern {
    pub fn new(predicates: Vec<InsnPredicate>) -> Self {
        Self { predicates }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches_at(&self, instructions: &[Insn], start: usize) -> bool {
        let Some(window) = instructions.get(start..start + self.predicates.len()) else {
            return false;
        };
        self.predicates
            .iter()
            .zip(window)
            .all(|(predicate, insn)| predicate.matches(&insn.instruction))
    }

    /// Index of the first instruction of the leftmost match.
    pub fn find(&self, instructions: &[Insn]) -> Option<usize> {
        if self.predicates.is_empty() || instructions.len() < self.predicates.len() {
            return None;
        }
        (0..=instructions.len() - self.predicates.len())
            .find(|&start| self.matches_at(instructions, start))
    }
}

impl fmt::Display for WindowPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Index of the window's first instruction before editing.
    pub start: usize,
    pub removed: Vec<Insn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRewrite {
    pub pattern: WindowPattern,
    remove: Vec<usize>,
}

impl WindowRewrite {
    /// `remove` holds positions inside the window; positions past the
    /// window's end are ignored.
    pub fn new(pattern: WindowPattern, remove: Vec<usize>) -> Self {
        let mut remove: Vec<usize> = remove.into_iter().filter(|&i| i < pattern.len()).collect();
        remove.sort_unstable();
        remove.dedup();
        Self { pattern, remove }
    }

    /// Drops the `aload; push 8; Random.nextInt; branch` guard in front of an
    /// early return, leaving `push 8; branch` whose outcome is fixed by the
    /// constant rather than by the random draw.
    pub fn random_guard() -> Self {
        Self::new(
            WindowPattern::new(vec![
                InsnPredicate::LoadLocal {
                    kind: Some(LocalKind::Reference),
                },
                InsnPredicate::PushConstant { value: 8 },
                InsnPredicate::Invoke {
                    name: "nextInt".to_string(),
                    owner_contains: "Random".to_string(),
                },
                InsnPredicate::Branch,
            ]),
            vec![0, 2],
        )
    }

    pub fn removed_positions(&self) -> &[usize] {
        &self.remove
    }

    pub fn find(&self, code: &Code) -> Option<usize> {
        self.pattern.find(&code.instructions)
    }

    /// Edit the first match in place. `None` leaves `code` untouched.
    pub fn apply(&self, code: &mut Code) -> Option<RewriteReport> {
        let start = self.find(code)?;
        let mut removed: Vec<Insn> = self
            .remove
            .iter()
            .rev()
            .map(|&offset| code.instructions.remove(start + offset))
            .collect();
        removed.reverse();
        Some(RewriteReport { start, removed })
    }
}
