//! The parsing virtual machine.
//!
//! A [`Parser`] interprets one linked grammar program against a growing
//! input buffer. Four payload stacks (backtrack, call, capture and
//! left-recursion memo) are sequenced by a frame-kind stack; failure
//! propagation pops frames until a backtrack point absorbs the failure or
//! the cut frame is reached. Left-recursive calls run the seed-and-grow
//! protocol: the first attempt fails, each iteration must consume strictly
//! more input, and the best answer is committed when growth stops.

use std::io::BufRead;
use std::mem;
use std::rc::Rc;

use common::{create_logger, log_detail, Logger};

use crate::error::{Error, Result};
use crate::instruction::{self, alt, op};
use crate::program::Program;
use crate::rule::Grammar;
use crate::semantics::{Semantics, SyntaxPosition, SyntaxRange};
use crate::utf8;

/// The VM registers: input byte index, column, line, response count,
/// program counter and fail count.
#[derive(Clone, Copy, Debug)]
pub struct Registers {
    pub ir: usize,
    pub cr: usize,
    pub lr: usize,
    pub rc: usize,
    pub pc: usize,
    pub fc: usize,
}

impl Default for Registers {
    fn default() -> Self {
        Self { ir: 0, cr: 1, lr: 1, rc: 0, pc: 0, fc: 0 }
    }
}

/// An input cursor: byte index, column, line.
#[derive(Clone, Copy, Debug)]
struct Subject {
    ir: usize,
    cr: usize,
    lr: usize,
}

#[derive(Clone, Copy)]
struct BacktrackFrame {
    ir: usize,
    cr: usize,
    lr: usize,
    rc: usize,
    pc: usize,
}

struct LrMemo {
    seed: Subject,
    /// Longest answer so far; `None` while seeding.
    answer: Option<Subject>,
    rcr: usize,
    pcr: usize,
    pca: usize,
    responses: Vec<crate::semantics::Response>,
    prec: u16,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum FrameKind {
    Backtrack,
    Call,
    Capture,
    LrCall,
}

type InputSource = Box<dyn FnMut(&mut String) -> bool>;

/// A parser over one grammar. Owns its input buffer, stacks and semantics;
/// the grammar program is shared and read-only.
pub struct Parser {
    program: Rc<Program>,
    semantics: Semantics,
    input: String,
    registers: Registers,
    max_input: Subject,
    parsing: bool,
    reading: bool,
    cut_deferred: bool,
    cut_frame: usize,
    sources: Vec<InputSource>,
    frames: Vec<FrameKind>,
    backtrack_stack: Vec<BacktrackFrame>,
    call_stack: Vec<usize>,
    capture_stack: Vec<Subject>,
    lrmemo_stack: Vec<LrMemo>,
    trace: bool,
    log: Logger,
}

impl Parser {
    pub fn new(grammar: &Grammar) -> Self {
        Self {
            program: grammar.shared_program(),
            semantics: Semantics::default(),
            input: String::new(),
            registers: Registers::default(),
            max_input: Subject { ir: 0, cr: 1, lr: 1 },
            parsing: false,
            reading: false,
            cut_deferred: false,
            cut_frame: 0,
            sources: Vec::new(),
            frames: Vec::new(),
            backtrack_stack: Vec::new(),
            call_stack: Vec::new(),
            capture_stack: Vec::new(),
            lrmemo_stack: Vec::new(),
            trace: false,
            log: create_logger("pegvm"),
        }
    }

    /// Append text to the input buffer.
    pub fn enqueue(&mut self, text: &str) -> &mut Self {
        self.input.push_str(text);
        self
    }

    /// Push a pull source, drained last-in-first-out when the VM needs more
    /// input. The callback returns `false` when exhausted.
    pub fn push_source(
        &mut self,
        source: impl FnMut(&mut String) -> bool + 'static,
    ) -> Result<&mut Self> {
        if self.reading {
            return Err(Error::ReentrantRead);
        }
        self.sources.push(Box::new(source));
        Ok(self)
    }

    /// The unconsumed input.
    pub fn input_view(&self) -> &str {
        &self.input[self.registers.ir..]
    }

    /// Byte index of the subject cursor.
    pub fn subject_index(&self) -> usize {
        self.registers.ir
    }

    pub fn input_position(&self) -> SyntaxPosition {
        SyntaxPosition { column: self.registers.cr, line: self.registers.lr }
    }

    /// The furthest position a failed alternative retreated from.
    pub fn max_input_position(&self) -> SyntaxPosition {
        SyntaxPosition { column: self.max_input.cr, line: self.max_input.lr }
    }

    pub fn max_subject_index(&self) -> usize {
        self.max_input.ir
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn semantics(&self) -> &Semantics {
        &self.semantics
    }

    pub fn semantics_mut(&mut self) -> &mut Semantics {
        &mut self.semantics
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    /// True once `n` bytes are available at the cursor, pulling sources as
    /// needed.
    pub fn available(&mut self, n: usize) -> Result<bool> {
        let ir = self.registers.ir;
        self.available_at(n, ir)
    }

    /// Run the grammar against the input.
    ///
    /// `Ok(false)` is an ordinary mismatch; consult
    /// [`Parser::max_input_position`] for the furthest position reached.
    pub fn parse(&mut self) -> Result<bool> {
        if self.parsing {
            return Err(Error::ReentrantParse);
        }
        self.parsing = true;
        let result = self.run();
        self.parsing = false;
        result
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    fn available_at(&mut self, n: usize, ir: usize) -> Result<bool> {
        loop {
            if n <= self.input.len() - ir {
                return Ok(true);
            }
            if ir < self.input.len() {
                return Ok(false);
            }
            if !self.read_more()? {
                return Ok(false);
            }
        }
    }

    fn read_more(&mut self) -> Result<bool> {
        if self.reading {
            return Err(Error::ReentrantRead);
        }
        self.reading = true;
        let mut got = false;
        while !self.sources.is_empty() {
            let mut text = String::new();
            let more = self.sources.last_mut().expect("sources vanished")(&mut text);
            self.input.push_str(&text);
            if !more {
                self.sources.pop();
            }
            if !text.is_empty() {
                got = true;
                break;
            }
        }
        self.reading = false;
        Ok(got)
    }

    // ------------------------------------------------------------------
    // Frame bookkeeping
    // ------------------------------------------------------------------

    fn pop_frame_common(&mut self) {
        self.frames.pop();
        self.cut_frame = self.cut_frame.min(self.frames.len());
    }

    fn pop_backtrack(&mut self) {
        self.backtrack_stack.pop();
        self.pop_frame_common();
    }

    fn pop_call(&mut self) {
        self.call_stack.pop();
        self.pop_frame_common();
    }

    fn pop_capture(&mut self, regs: &mut Registers) {
        self.capture_stack.pop();
        self.pop_frame_common();
        self.run_deferred_cut(regs);
    }

    fn pop_lrmemo(&mut self, regs: &mut Registers) {
        self.lrmemo_stack.pop();
        self.pop_frame_common();
        self.run_deferred_cut(regs);
    }

    /// A cut postponed by open capture or LR frames runs as soon as the last
    /// of them closes.
    fn run_deferred_cut(&mut self, regs: &mut Registers) {
        if self.cut_deferred && self.capture_stack.is_empty() && self.lrmemo_stack.is_empty() {
            self.do_accept(regs);
        }
    }

    /// Commit the parse: apply queued semantics, drop the consumed input
    /// prefix and fence backtracking at the current stack depth.
    fn do_accept(&mut self, regs: &mut Registers) {
        self.registers = Registers { fc: 0, ..*regs };
        let prog = Rc::clone(&self.program);
        self.semantics.accept(&prog, &self.input);
        self.input.drain(..regs.ir);
        self.registers.ir = 0;
        self.registers.rc = 0;
        self.max_input.ir = 0;
        self.cut_deferred = false;
        self.cut_frame = self.frames.len();
        regs.ir = 0;
        regs.rc = 0;
    }

    fn note_mismatch(&mut self, regs: &Registers) {
        if regs.ir > self.max_input.ir {
            self.max_input = Subject { ir: regs.ir, cr: regs.cr, lr: regs.lr };
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    fn run(&mut self) -> Result<bool> {
        let prog = Rc::clone(&self.program);
        if prog.code.is_empty() {
            return Err(Error::BadGrammar);
        }

        let mut regs = self.registers;
        regs.rc = 0;
        regs.pc = 0;
        regs.fc = 0;
        self.cut_deferred = false;
        self.cut_frame = 0;
        self.frames.clear();
        self.backtrack_stack.clear();
        self.call_stack.clear();
        self.capture_stack.clear();
        self.lrmemo_stack.clear();
        self.semantics.clear();

        let mut result = false;
        let mut done = false;
        while !done {
            let at = regs.pc;
            let d = instruction::decode(&prog.code, &mut regs.pc)?;
            if self.trace {
                eprintln!(
                    "[trace] {:4}: {:<13} ir={} cr={} lr={}",
                    at,
                    instruction::name(d.op),
                    regs.ir,
                    regs.cr,
                    regs.lr
                );
            }
            log_detail!(self.log, "{:4}: {} ir={}", at, instruction::name(d.op), regs.ir);

            let mut failed = false;
            match d.op {
                op::MATCH => {
                    if !d.data.is_empty() {
                        let have = self.available_at(d.data.len(), regs.ir)?;
                        if have && self.input.as_bytes()[regs.ir..].starts_with(d.data) {
                            regs.ir += d.data.len();
                            regs.cr += d.imm;
                        } else {
                            self.note_mismatch(&regs);
                            failed = true;
                        }
                    }
                }
                op::MATCH_ANY => {
                    if self.available_at(1, regs.ir)? {
                        regs.ir += utf8::size_of_first_rune(&self.input.as_bytes()[regs.ir..]);
                        regs.cr += 1;
                    } else {
                        self.note_mismatch(&regs);
                        failed = true;
                    }
                }
                op::MATCH_CLASS => {
                    if self.available_at(1, regs.ir)? {
                        let bytes = &self.input.as_bytes()[regs.ir..];
                        let (rune, size) = utf8::decode_rune(bytes);
                        let record = crate::unicode::query(rune);
                        let matched = match d.alt {
                            alt::CLASS_PTYPE => {
                                record.any_prop(crate::unicode::Props::from_bits_truncate(
                                    decode_class_bits(d.data)?,
                                ))
                            }
                            alt::CLASS_GCTYPE => {
                                record.any_gc(crate::unicode::GcFlags::from_bits_truncate(
                                    decode_class_bits(d.data)?,
                                ))
                            }
                            alt::CLASS_SCTYPE => {
                                record.script() == crate::unicode::Script::from_raw(d.imm as u16)
                            }
                            _ => record.is(crate::unicode::Ctype::from_bits_truncate(d.imm as u16)),
                        };
                        if matched {
                            regs.ir += size;
                            regs.cr += 1;
                        } else {
                            self.note_mismatch(&regs);
                            failed = true;
                        }
                    } else {
                        self.note_mismatch(&regs);
                        failed = true;
                    }
                }
                op::MATCH_RANGE => {
                    let first = &d.data[..d.imm.min(d.data.len())];
                    let last = &d.data[d.imm.min(d.data.len())..];
                    if self.available_at(first.len().min(last.len()), regs.ir)? {
                        let bytes = &self.input.as_bytes()[regs.ir..];
                        let size = utf8::size_of_first_rune(bytes);
                        let probe = &bytes[..size];
                        if probe >= first && probe <= last {
                            regs.ir += size;
                            regs.cr += 1;
                        } else {
                            self.note_mismatch(&regs);
                            failed = true;
                        }
                    } else {
                        self.note_mismatch(&regs);
                        failed = true;
                    }
                }
                op::CHOICE => {
                    self.frames.push(FrameKind::Backtrack);
                    self.backtrack_stack.push(BacktrackFrame {
                        ir: regs.ir.saturating_sub(d.imm & 0xFF),
                        cr: regs.cr.saturating_sub(d.imm >> 8),
                        lr: regs.lr,
                        rc: regs.rc,
                        pc: (regs.pc as isize + d.off) as usize,
                    });
                }
                op::COMMIT => {
                    if self.frames.last() != Some(&FrameKind::Backtrack) {
                        failed = true;
                    } else {
                        match d.alt {
                            alt::COMMIT_PARTIAL => {
                                let frame =
                                    self.backtrack_stack.last_mut().expect("backtrack frame missing");
                                frame.ir = regs.ir;
                                frame.cr = regs.cr;
                                frame.lr = regs.lr;
                                frame.rc = regs.rc;
                            }
                            alt::COMMIT_BACK => {
                                let frame =
                                    *self.backtrack_stack.last().expect("backtrack frame missing");
                                regs.ir = frame.ir;
                                regs.cr = frame.cr;
                                regs.lr = frame.lr;
                                self.pop_backtrack();
                            }
                            _ => self.pop_backtrack(),
                        }
                        regs.pc = (regs.pc as isize + d.off) as usize;
                    }
                }
                op::JUMP => {
                    regs.pc = (regs.pc as isize + d.off) as usize;
                }
                op::CALL => {
                    let target = (regs.pc as isize + d.off) as usize;
                    if d.imm != 0 {
                        let mut found = None;
                        for (i, memo) in self.lrmemo_stack.iter().enumerate().rev() {
                            if memo.seed.ir < regs.ir {
                                break;
                            }
                            if memo.seed.ir == regs.ir && memo.pca == target {
                                found = Some(i);
                                break;
                            }
                        }
                        if let Some(i) = found {
                            let answer = self.lrmemo_stack[i].answer;
                            let prec = self.lrmemo_stack[i].prec;
                            match answer {
                                Some(a) if (d.imm as u16) >= prec => {
                                    regs.ir = a.ir;
                                    regs.cr = a.cr;
                                    regs.lr = a.lr;
                                    let saved = self.lrmemo_stack[i].responses.clone();
                                    regs.rc =
                                        self.semantics.restore_responses_after(regs.rc, &saved);
                                }
                                _ => failed = true,
                            }
                        } else {
                            self.frames.push(FrameKind::LrCall);
                            self.lrmemo_stack.push(LrMemo {
                                seed: Subject { ir: regs.ir, cr: regs.cr, lr: regs.lr },
                                answer: None,
                                rcr: regs.rc,
                                pcr: regs.pc,
                                pca: target,
                                responses: Vec::new(),
                                prec: d.imm as u16,
                            });
                            regs.pc = target;
                        }
                    } else {
                        self.frames.push(FrameKind::Call);
                        self.call_stack.push(regs.pc);
                        regs.pc = target;
                    }
                }
                op::RET => match self.frames.last().copied() {
                    Some(FrameKind::Call) => {
                        regs.pc = *self.call_stack.last().expect("call frame without pc");
                        self.pop_call();
                    }
                    Some(FrameKind::LrCall) => {
                        let (rcr, seed, pca, pcr, answer) = {
                            let m = self.lrmemo_stack.last().expect("lr frame without memo");
                            (m.rcr, m.seed, m.pca, m.pcr, m.answer)
                        };
                        match answer {
                            Some(a) if regs.ir <= a.ir => {
                                // growth stopped: commit the best answer
                                regs.ir = a.ir;
                                regs.cr = a.cr;
                                regs.lr = a.lr;
                                regs.pc = pcr;
                                let saved = mem::take(
                                    &mut self
                                        .lrmemo_stack
                                        .last_mut()
                                        .expect("lr frame without memo")
                                        .responses,
                                );
                                regs.rc = self.semantics.restore_responses_after(rcr, &saved);
                                self.pop_lrmemo(&mut regs);
                            }
                            _ => {
                                // longer match: remember it and grow again
                                let dropped = self.semantics.drop_responses_after(rcr);
                                let memo = self
                                    .lrmemo_stack
                                    .last_mut()
                                    .expect("lr frame without memo");
                                memo.answer =
                                    Some(Subject { ir: regs.ir, cr: regs.cr, lr: regs.lr });
                                memo.responses = dropped;
                                regs.ir = seed.ir;
                                regs.cr = seed.cr;
                                regs.lr = seed.lr;
                                regs.rc = rcr;
                                regs.pc = pca;
                            }
                        }
                    }
                    _ => failed = true,
                },
                op::FAIL => {
                    regs.fc = d.imm;
                    failed = true;
                }
                op::ACCEPT => {
                    self.cut_deferred =
                        !self.capture_stack.is_empty() || !self.lrmemo_stack.is_empty();
                    if !self.cut_deferred {
                        self.do_accept(&mut regs);
                        if d.alt == alt::ACCEPT_FINAL {
                            result = true;
                            done = true;
                        }
                    }
                }
                op::NEWLINE => {
                    regs.cr = 1;
                    regs.lr += 1;
                }
                op::PREDICATE => {
                    self.registers = Registers { fc: 0, ..regs };
                    let predicate =
                        prog.predicates.get(d.imm).ok_or(Error::BadOpcode)?.clone();
                    let accepted = (&*predicate)(self);
                    regs = self.registers;
                    self.semantics.pop_responses_after(regs.rc);
                    if !accepted {
                        self.note_mismatch(&regs);
                        failed = true;
                    }
                }
                op::ACTION => {
                    let depth = self.call_stack.len() + self.lrmemo_stack.len();
                    if d.imm >= prog.actions.len() {
                        return Err(Error::BadOpcode);
                    }
                    regs.rc = self.semantics.push_response(depth, d.imm);
                }
                op::BEGIN_CAPTURE => {
                    self.frames.push(FrameKind::Capture);
                    self.capture_stack.push(Subject { ir: regs.ir, cr: regs.cr, lr: regs.lr });
                }
                op::END_CAPTURE => {
                    if self.frames.last() != Some(&FrameKind::Capture) {
                        failed = true;
                    } else {
                        if d.imm >= prog.captures.len() {
                            return Err(Error::BadOpcode);
                        }
                        let s0 = *self.capture_stack.last().expect("capture frame missing");
                        let (ir1, cr1, lr1) = (regs.ir, regs.cr, regs.lr);
                        self.pop_capture(&mut regs);
                        if s0.ir > ir1 {
                            failed = true;
                        } else {
                            let depth = self.call_stack.len() + self.lrmemo_stack.len();
                            regs.rc = self.semantics.push_capture_response(
                                depth,
                                d.imm,
                                SyntaxRange {
                                    index: s0.ir,
                                    size: ir1 - s0.ir,
                                    start: SyntaxPosition { column: s0.cr, line: s0.lr },
                                    end: SyntaxPosition { column: cr1, line: lr1 },
                                },
                            );
                        }
                    }
                }
                _ => {
                    self.registers = Registers { fc: 0, ..regs };
                    return Err(Error::BadOpcode);
                }
            }

            if failed {
                log_detail!(self.log, "fail at ir={} fc={}", regs.ir, regs.fc);
                regs.fc += 1;
                while regs.fc > 0 {
                    if self.cut_frame >= self.frames.len() {
                        done = true;
                        break;
                    }
                    match self.frames.last().copied() {
                        Some(FrameKind::Backtrack) => {
                            let frame =
                                *self.backtrack_stack.last().expect("backtrack frame missing");
                            regs.ir = frame.ir;
                            regs.cr = frame.cr;
                            regs.lr = frame.lr;
                            regs.rc = frame.rc;
                            regs.pc = frame.pc;
                            self.note_mismatch(&regs);
                            self.pop_backtrack();
                        }
                        Some(FrameKind::Call) => {
                            self.pop_call();
                            regs.fc += 1;
                        }
                        Some(FrameKind::Capture) => {
                            self.pop_capture(&mut regs);
                            regs.fc += 1;
                        }
                        Some(FrameKind::LrCall) => {
                            let (rcr, pcr, answer) = {
                                let m = self.lrmemo_stack.last().expect("lr frame without memo");
                                (m.rcr, m.pcr, m.answer)
                            };
                            if let Some(a) = answer {
                                regs.ir = a.ir;
                                regs.cr = a.cr;
                                regs.lr = a.lr;
                                regs.pc = pcr;
                                let saved = mem::take(
                                    &mut self
                                        .lrmemo_stack
                                        .last_mut()
                                        .expect("lr frame without memo")
                                        .responses,
                                );
                                regs.rc = self.semantics.restore_responses_after(rcr, &saved);
                            } else {
                                regs.fc += 1;
                            }
                            self.pop_lrmemo(&mut regs);
                        }
                        None => {
                            done = true;
                            break;
                        }
                    }
                    regs.fc -= 1;
                }
                regs.fc = 0;
                self.semantics.pop_responses_after(regs.rc);
            }
        }

        self.registers = Registers { fc: 0, ..regs };
        Ok(result)
    }
}

fn decode_class_bits(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data.get(..4).and_then(|b| b.try_into().ok()).ok_or(Error::BadOpcode)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Parse `text` with `grammar`.
pub fn parse(text: &str, grammar: &Grammar) -> Result<bool> {
    let mut parser = Parser::new(grammar);
    parser.enqueue(text);
    parser.parse()
}

/// Parse from a reader, pulling one line at a time. Every line is delivered
/// with a trailing newline, including the last.
pub fn parse_reader<R: BufRead + 'static>(reader: R, grammar: &Grammar) -> Result<bool> {
    let mut parser = Parser::new(grammar);
    let mut reader = reader;
    parser.push_source(move |text| {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => {
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                text.push_str(&line);
                true
            }
        }
    })?;
    parser.parse()
}
