//! Incremental instruction builder driven by combinator expressions.
//!
//! An [`Encoder`] writes through a [`Sink`]: the length sink just counts
//! words (used to size forward jumps before anything is emitted), the vector
//! sink writes bare instructions for the string-expression compiler, and the
//! program/rule sinks write full programs with side tables and callee
//! records.
//!
//! The encoder also maintains the may-match-empty stack. Combinators push a
//! scope around sub-expressions, matchers clear the current scope, and rule
//! callsites read it to record whether they are left-most in the rule body.

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::instruction::{self, op, str_word, MAX_STR_LEN, OPER_OFF, OPER_STR};
use crate::program::{Program, SemanticAction, SemanticCapture, SemanticPredicate};
use crate::rule::{Callee, Grammar, ProgramRef, Rule};
use crate::utf8;

pub(crate) trait Sink {
    fn append(&mut self, word: u32) -> Result<()>;
    fn append_program(&mut self, prog: &Program) -> Result<()>;
    fn len(&self) -> isize;

    fn add_predicate(&mut self, _p: SemanticPredicate) -> Result<u16> {
        Ok(0)
    }
    fn add_action(&mut self, _a: SemanticAction) -> Result<u16> {
        Ok(0)
    }
    fn add_capture(&mut self, _c: SemanticCapture) -> Result<u16> {
        Ok(0)
    }
    fn add_callee(&mut self, _rule: Option<&Rule>, _target: ProgramRef, _off: isize, _left_most: bool) {}

    /// True while only measuring; nested length evaluations short-circuit.
    fn measuring(&self) -> bool {
        false
    }
}

/// Counts words without emitting anything.
#[derive(Default)]
pub(crate) struct LengthSink {
    len: isize,
}

impl Sink for LengthSink {
    fn append(&mut self, _word: u32) -> Result<()> {
        self.len = self.len.checked_add(1).ok_or(Error::ProgramLimit)?;
        Ok(())
    }

    fn append_program(&mut self, prog: &Program) -> Result<()> {
        let n = isize::try_from(prog.len()).map_err(|_| Error::ProgramLimit)?;
        self.len = self.len.checked_add(n).ok_or(Error::ProgramLimit)?;
        Ok(())
    }

    fn len(&self) -> isize {
        self.len
    }

    fn measuring(&self) -> bool {
        true
    }
}

/// Writes bare instruction words. No side tables, so whole-program appends
/// and semantic callables are rejected.
pub(crate) struct VecSink<'a> {
    pub code: &'a mut Vec<u32>,
}

impl Sink for VecSink<'_> {
    fn append(&mut self, word: u32) -> Result<()> {
        self.code.push(word);
        Ok(())
    }

    fn append_program(&mut self, _prog: &Program) -> Result<()> {
        Err(Error::BadGrammar)
    }

    fn len(&self) -> isize {
        self.code.len() as isize
    }
}

pub(crate) struct ProgramSink<'a> {
    pub prog: &'a mut Program,
}

impl ProgramSink<'_> {
    fn add_item<T>(items: &mut Vec<T>, item: T) -> Result<u16> {
        if items.len() >= u16::MAX as usize {
            return Err(Error::ResourceLimit);
        }
        items.push(item);
        Ok((items.len() - 1) as u16)
    }
}

impl Sink for ProgramSink<'_> {
    fn append(&mut self, word: u32) -> Result<()> {
        self.prog.code.push(word);
        Ok(())
    }

    fn append_program(&mut self, prog: &Program) -> Result<()> {
        self.prog.concatenate(prog)
    }

    fn len(&self) -> isize {
        self.prog.code.len() as isize
    }

    fn add_predicate(&mut self, p: SemanticPredicate) -> Result<u16> {
        Self::add_item(&mut self.prog.predicates, p)
    }

    fn add_action(&mut self, a: SemanticAction) -> Result<u16> {
        Self::add_item(&mut self.prog.actions, a)
    }

    fn add_capture(&mut self, c: SemanticCapture) -> Result<u16> {
        Self::add_item(&mut self.prog.captures, c)
    }
}

/// Program sink that additionally records rule callees.
pub(crate) struct RuleSink<'a> {
    pub prog: &'a mut Program,
    pub callees: &'a mut Vec<Callee>,
}

impl Sink for RuleSink<'_> {
    fn append(&mut self, word: u32) -> Result<()> {
        self.prog.code.push(word);
        Ok(())
    }

    fn append_program(&mut self, prog: &Program) -> Result<()> {
        self.prog.concatenate(prog)
    }

    fn len(&self) -> isize {
        self.prog.code.len() as isize
    }

    fn add_predicate(&mut self, p: SemanticPredicate) -> Result<u16> {
        ProgramSink::add_item(&mut self.prog.predicates, p)
    }

    fn add_action(&mut self, a: SemanticAction) -> Result<u16> {
        ProgramSink::add_item(&mut self.prog.actions, a)
    }

    fn add_capture(&mut self, c: SemanticCapture) -> Result<u16> {
        ProgramSink::add_item(&mut self.prog.captures, c)
    }

    fn add_callee(&mut self, rule: Option<&Rule>, target: ProgramRef, off: isize, left_most: bool) {
        self.callees.push(Callee { rule: rule.cloned(), target, offset: off, left_most });
    }
}

pub struct Encoder<'a> {
    sink: &'a mut dyn Sink,
    eps_stack: Vec<bool>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(sink: &'a mut dyn Sink) -> Self {
        Self { sink, eps_stack: vec![true] }
    }

    pub fn len(&self) -> isize {
        self.sink.len()
    }

    /// Whether everything encoded so far in the current scope may match
    /// empty input.
    pub(crate) fn matches_eps(&self) -> bool {
        *self.eps_stack.last().expect("empty eps scope stack")
    }

    /// Mark the current scope as consuming input.
    pub(crate) fn note_consumes(&mut self, consumes: bool) {
        if consumes {
            *self.eps_stack.last_mut().expect("empty eps scope stack") = false;
        }
    }

    /// Open a scope seeded from the state `n` scopes down.
    pub(crate) fn eps_push(&mut self, n: usize) {
        let seed = self.eps_stack[self.eps_stack.len() - n];
        self.eps_stack.push(seed);
    }

    pub(crate) fn eps_pop(&mut self) {
        self.eps_stack.pop();
    }

    /// AND the top `n` scopes together into the scope below them.
    pub(crate) fn eps_and(&mut self, n: usize) {
        let keep = self.eps_stack.len() - n;
        let all = self.eps_stack[keep..].iter().all(|&b| b);
        self.eps_stack.truncate(keep);
        *self.eps_stack.last_mut().expect("empty eps scope stack") = all;
    }

    pub(crate) fn append(&mut self, word: u32) -> Result<()> {
        self.sink.append(word)
    }

    pub(crate) fn encode(&mut self, op: u8) -> Result<()> {
        self.append(instruction::prefix(op, 0, 0))
    }

    pub(crate) fn encode_imm(&mut self, op: u8, imm: u16) -> Result<()> {
        self.append(instruction::prefix(op, 0, imm))
    }

    pub(crate) fn encode_alt(&mut self, op: u8, alt: u8) -> Result<()> {
        self.append(instruction::prefix(op, alt, 0))
    }

    pub(crate) fn encode_alt_imm(&mut self, op: u8, alt: u8, imm: u16) -> Result<()> {
        self.append(instruction::prefix(op, alt, imm))
    }

    pub(crate) fn encode_off(&mut self, op: u8, off: isize) -> Result<()> {
        self.encode_off_alt_imm(op, 0, off, 0)
    }

    pub(crate) fn encode_off_imm(&mut self, op: u8, off: isize, imm: u16) -> Result<()> {
        self.encode_off_alt_imm(op, 0, off, imm)
    }

    pub(crate) fn encode_off_alt(&mut self, op: u8, alt: u8, off: isize) -> Result<()> {
        self.encode_off_alt_imm(op, alt, off, 0)
    }

    fn encode_off_alt_imm(&mut self, op: u8, alt: u8, off: isize, imm: u16) -> Result<()> {
        self.append(instruction::prefix(op, OPER_OFF | alt, imm))?;
        let off = i32::try_from(off).map_err(|_| Error::ProgramLimit)?;
        self.append(instruction::offset_word(off))
    }

    pub(crate) fn encode_pred(&mut self, p: SemanticPredicate) -> Result<()> {
        let idx = self.sink.add_predicate(p)?;
        self.append(instruction::prefix(op::PREDICATE, 0, idx))
    }

    pub(crate) fn encode_action(&mut self, a: SemanticAction) -> Result<()> {
        let idx = self.sink.add_action(a)?;
        self.append(instruction::prefix(op::ACTION, 0, idx))
    }

    pub(crate) fn encode_capture(&mut self, c: SemanticCapture) -> Result<()> {
        let idx = self.sink.add_capture(c)?;
        self.append(instruction::prefix(op::END_CAPTURE, 0, idx))
    }

    /// Emit a string-carrying instruction. `val` is the rune count for
    /// matches, or the first-bound byte length for ranges.
    pub(crate) fn encode_str(&mut self, op: u8, val: usize, bytes: &[u8]) -> Result<()> {
        self.encode_str_alt(op, 0, val, bytes)
    }

    pub(crate) fn encode_str_alt(&mut self, op: u8, alt: u8, val: usize, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !(1..=MAX_STR_LEN).contains(&val) || bytes.len() > MAX_STR_LEN {
            return Err(Error::ResourceLimit);
        }
        let imm = (((val - 1) << 8) | (bytes.len() - 1)) as u16;
        self.append(instruction::prefix(op, OPER_STR | alt, imm))?;
        for chunk in bytes.chunks(4) {
            self.append(str_word(chunk))?;
        }
        Ok(())
    }

    /// Emit matches for a literal, splitting at UTF-8 lead boundaries when it
    /// exceeds one instruction's 256-byte capacity.
    pub(crate) fn match_lit(&mut self, text: &str) -> Result<()> {
        let mut seq = text.as_bytes();
        while seq.len() > MAX_STR_LEN {
            let mut end = MAX_STR_LEN;
            while end > 0 && !utf8::is_lead(seq[end - 1]) {
                end -= 1;
            }
            end = end.saturating_sub(1);
            let sub = &seq[..end];
            self.encode_str(op::MATCH, utf8::count_runes(sub), sub)?;
            seq = &seq[end..];
        }
        self.encode_str(op::MATCH, utf8::count_runes(seq), seq)?;
        self.note_consumes(!seq.is_empty());
        Ok(())
    }

    /// Emit a byte-lexicographic rune range match.
    pub(crate) fn match_range(&mut self, first: &str, last: &str) -> Result<()> {
        if first == last {
            return self.match_lit(first);
        }
        let mut payload = Vec::with_capacity(first.len() + last.len());
        payload.extend_from_slice(first.as_bytes());
        payload.extend_from_slice(last.as_bytes());
        self.encode_str(op::MATCH_RANGE, first.len(), &payload)?;
        self.note_consumes(true);
        Ok(())
    }

    fn register_callee(&mut self, rule: Option<&Rule>, target: ProgramRef, callee_eps: bool) {
        let left_most = self.matches_eps();
        let at = self.sink.len();
        *self.eps_stack.last_mut().expect("empty eps scope stack") = left_most && callee_eps;
        self.sink.add_callee(rule, target, at, left_most);
    }

    /// Emit a call to `r`, or inline its program when it is small, closed and
    /// not currently being encoded.
    pub(crate) fn call_rule(&mut self, r: &Rule, prec: u16, allow_inline: bool) -> Result<()> {
        if allow_inline && prec == 0 && !r.is_encoding() {
            let inlinable = r.with(|p, callees| {
                callees.is_empty()
                    && !p.code.is_empty()
                    && p.code.len() <= 8
                    && p.predicates.len() <= 1
                    && p.actions.len() <= 1
                    && p.captures.len() <= 1
            });
            if inlinable {
                return r.with(|p, _| {
                    self.note_consumes(!p.matches_eps);
                    self.sink.append_program(p)
                });
            }
        }
        let callee_eps = if r.is_encoding() { true } else { r.with(|p, _| p.matches_eps) };
        self.register_callee(Some(r), ProgramRef::Rule(r.clone()), callee_eps);
        self.encode_off_imm(op::CALL, 0, prec)
    }

    /// Emit a call into a finished grammar. The initial offset 3 skips the
    /// grammar's own `call`/`accept_final` prelude once linked.
    pub(crate) fn call_grammar(&mut self, g: &Grammar, prec: u16) -> Result<()> {
        let target = g.shared_program();
        let callee_eps = target.matches_eps;
        self.register_callee(None, ProgramRef::Shared(target), callee_eps);
        self.encode_off_imm(op::CALL, 3, prec)
    }

    pub(crate) fn evaluate(&mut self, e: &Expr) -> Result<()> {
        e.encode_into(self)
    }

    /// Length in words that `e` would occupy, without emitting it.
    pub(crate) fn evaluate_length(&mut self, e: &Expr) -> Result<isize> {
        if self.sink.measuring() {
            return Ok(0);
        }
        let mut sink = LengthSink::default();
        let mut enc = Encoder::new(&mut sink);
        enc.evaluate(e)?;
        Ok(enc.len())
    }
}
