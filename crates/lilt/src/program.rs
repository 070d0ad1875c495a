//! Instruction programs and their side tables.

use std::io::{self, Write};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::instruction::{self, alt, op};
use crate::parser::Parser;
use crate::semantics::{Semantics, SyntaxView};

/// Input-position query run mid-parse; `false` propagates as failure.
pub type SemanticPredicate = Rc<dyn Fn(&mut Parser) -> bool>;
/// Deferred semantic effect, applied on committed acceptance.
pub type SemanticAction = Rc<dyn Fn(&mut Semantics)>;
/// Deferred effect receiving the captured syntax.
pub type SemanticCapture = Rc<dyn Fn(&mut Semantics, &SyntaxView)>;

/// A compiled instruction sequence plus the callables its `predicate`,
/// `action` and `end_capture` instructions index into.
#[derive(Clone)]
pub struct Program {
    pub(crate) code: Vec<u32>,
    pub(crate) predicates: Vec<SemanticPredicate>,
    pub(crate) actions: Vec<SemanticAction>,
    pub(crate) captures: Vec<SemanticCapture>,
    /// Whether this program can succeed without consuming input.
    pub(crate) matches_eps: bool,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            code: Vec::new(),
            predicates: Vec::new(),
            actions: Vec::new(),
            captures: Vec::new(),
            matches_eps: true,
        }
    }
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Append `src`, rebasing the side-table indices of its `predicate`,
    /// `action` and `end_capture` instructions onto this program's tables.
    pub(crate) fn concatenate(&mut self, src: &Program) -> Result<()> {
        if self.code.len().checked_add(src.code.len()).is_none() {
            return Err(Error::ProgramLimit);
        }
        self.code.reserve(src.code.len());
        let mut i = 0;
        while i < src.code.len() {
            let word = src.code[i];
            let len = instruction::instr_len(word);
            let rebase = match instruction::opcode(word) {
                op::PREDICATE => self.predicates.len(),
                op::ACTION => self.actions.len(),
                op::END_CAPTURE => self.captures.len(),
                _ => 0,
            };
            let word = if rebase != 0 {
                let v = instruction::val(word) as usize + rebase;
                if v > u16::MAX as usize {
                    return Err(Error::ResourceLimit);
                }
                instruction::prefix(instruction::opcode(word), instruction::aux(word), v as u16)
            } else {
                word
            };
            self.code.push(word);
            self.code.extend_from_slice(&src.code[i + 1..i + len]);
            i += len;
        }
        self.predicates.extend(src.predicates.iter().cloned());
        self.actions.extend(src.actions.iter().cloned());
        self.captures.extend(src.captures.iter().cloned());
        self.matches_eps = self.matches_eps && src.matches_eps;
        Ok(())
    }

    /// Render the program one instruction per line.
    pub fn disassemble<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut pc = 0;
        while pc < self.code.len() {
            let at = pc;
            let d = match instruction::decode(&self.code, &mut pc) {
                Ok(d) => d,
                Err(_) => {
                    writeln!(out, "  {:4}: ??? {:#010x}", at, self.code[at])?;
                    pc = at + 1;
                    continue;
                }
            };
            let name = match (d.op, d.alt) {
                (op::ACCEPT, alt::ACCEPT_FINAL) => "accept_final",
                (op::COMMIT, alt::COMMIT_BACK) => "commit_back",
                (op::COMMIT, alt::COMMIT_PARTIAL) => "commit_partial",
                _ => instruction::name(d.op),
            };
            let mut desc = format!("{:<15}", name);
            match d.op {
                op::CHOICE | op::COMMIT | op::JUMP | op::CALL => {
                    let target = (pc as isize + d.off) as usize;
                    desc.push_str(&format!("{:+} -> @{}", d.off, target));
                    if d.op == op::CALL {
                        desc.push_str(&format!(" prec={}", d.imm));
                    }
                }
                op::MATCH | op::MATCH_RANGE => {
                    if !d.data.is_empty() {
                        desc.push_str(&format!("{:?}", String::from_utf8_lossy(d.data)));
                    }
                }
                op::MATCH_CLASS | op::FAIL | op::PREDICATE | op::ACTION | op::END_CAPTURE => {
                    desc.push_str(&format!("{}", d.imm));
                }
                _ => {}
            }
            writeln!(out, "  {:4}: {}", at, desc.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{prefix, OPER_STR};

    fn noop_action() -> SemanticAction {
        Rc::new(|_s: &mut Semantics| {})
    }

    #[test]
    fn concatenate_rebases_side_tables() {
        let mut a = Program::default();
        a.code.push(prefix(op::ACTION, 0, 0));
        a.actions.push(noop_action());

        let mut b = Program::default();
        b.code.push(prefix(op::ACTION, 0, 0));
        b.code.push(prefix(op::ACTION, 0, 1));
        b.actions.push(noop_action());
        b.actions.push(noop_action());

        a.concatenate(&b).unwrap();
        assert_eq!(a.actions.len(), 3);
        assert_eq!(instruction::val(a.code[0]), 0);
        assert_eq!(instruction::val(a.code[1]), 1);
        assert_eq!(instruction::val(a.code[2]), 2);
    }

    #[test]
    fn concatenate_copies_string_words_verbatim() {
        let mut a = Program::default();
        let mut b = Program::default();
        b.code.push(prefix(op::MATCH, OPER_STR, 2)); // 3 bytes
        b.code.push(instruction::str_word(b"abc"));
        b.matches_eps = false;

        a.concatenate(&b).unwrap();
        assert_eq!(a.code, b.code);
        assert!(!a.matches_eps);
    }

    #[test]
    fn disassemble_is_total() {
        let mut p = Program::default();
        p.code.push(prefix(op::CHOICE, crate::instruction::OPER_OFF, 0));
        p.code.push(instruction::offset_word(2));
        p.code.push(prefix(op::MATCH_ANY, 0, 0));
        p.code.push(prefix(op::FAIL, 0, 1));
        let mut out = Vec::new();
        p.disassemble(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("choice"));
        assert!(text.contains("match_any"));
    }
}
