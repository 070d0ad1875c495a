//! Rules, grammars and the linker.
//!
//! A [`Rule`] is a shared handle to an owned program plus the list of rules
//! it calls. Rules may reference themselves and one another freely,
//! including left-recursively; [`start`] walks the reachable graph, lays
//! every program out exactly once, resolves call offsets and marks
//! left-recursive callees so the VM runs them under the seed-and-grow
//! protocol.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::rc::Rc;

use common::{create_logger, log_detail};

use crate::encoder::{Encoder, ProgramSink, RuleSink};
use crate::error::Result;
use crate::expr::Expr;
use crate::instruction::{self, alt, op};
use crate::program::Program;

/// A named point in the grammar graph. Cloning aliases the same rule.
#[derive(Clone, Default)]
pub struct Rule {
    inner: Rc<RuleInner>,
}

#[derive(Default)]
struct RuleInner {
    program: RefCell<Program>,
    callees: RefCell<Vec<Callee>>,
    encoding: Cell<bool>,
}

/// One callsite recorded while encoding a rule body.
#[derive(Clone)]
pub(crate) struct Callee {
    pub rule: Option<Rule>,
    pub target: ProgramRef,
    pub offset: isize,
    /// No prior sibling in the rule body is guaranteed to consume input.
    pub left_most: bool,
}

/// Identity-bearing reference to a callee's program.
#[derive(Clone)]
pub(crate) enum ProgramRef {
    Rule(Rule),
    Shared(Rc<Program>),
}

impl ProgramRef {
    pub(crate) fn key(&self) -> usize {
        match self {
            ProgramRef::Rule(r) => r.key(),
            ProgramRef::Shared(p) => Rc::as_ptr(p) as usize,
        }
    }

    pub(crate) fn with_program<R>(&self, f: impl FnOnce(&Program) -> R) -> R {
        match self {
            ProgramRef::Rule(r) => {
                let p = r.inner.program.borrow();
                f(&p)
            }
            ProgramRef::Shared(p) => f(p),
        }
    }
}

impl Rule {
    /// An empty rule, to be filled in with [`Rule::define`]. Start from here
    /// when a rule must refer to itself.
    pub fn new() -> Rule {
        Rule::default()
    }

    /// Encode `e` as this rule's body, replacing any previous definition.
    pub fn define<E: Into<Expr>>(&self, e: E) -> Result<()> {
        let e = e.into();
        self.inner.encoding.set(true);
        let result = (|| {
            let mut prog = self.inner.program.borrow_mut();
            let mut callees = self.inner.callees.borrow_mut();
            *prog = Program::default();
            callees.clear();
            let mut sink = RuleSink { prog: &mut *prog, callees: &mut *callees };
            let mut enc = Encoder::new(&mut sink);
            enc.evaluate(&e)?;
            let eps = enc.matches_eps();
            prog.matches_eps = eps;
            Ok(())
        })();
        self.inner.encoding.set(false);
        result
    }

    /// An expression calling this rule.
    pub fn call(&self) -> Expr {
        let r = self.clone();
        Expr::new(move |d| d.call_rule(&r, 0, true))
    }

    /// An expression calling this rule at the given left-recursion
    /// precedence.
    pub fn prec(&self, prec: u16) -> Expr {
        let r = self.clone();
        Expr::new(move |d| d.call_rule(&r, prec, true))
    }

    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn is_encoding(&self) -> bool {
        self.inner.encoding.get()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&Program, &[Callee]) -> R) -> R {
        let p = self.inner.program.borrow();
        let c = self.inner.callees.borrow();
        f(&p, &c)
    }

    fn callees(&self) -> Vec<Callee> {
        self.inner.callees.borrow().clone()
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("instructions", &self.inner.program.borrow().len())
            .field("callees", &self.inner.callees.borrow().len())
            .finish()
    }
}

impl From<&Rule> for Expr {
    fn from(r: &Rule) -> Expr {
        r.call()
    }
}

/// Define a rule from an expression in one step.
pub fn rule<E: Into<Expr>>(e: E) -> Result<Rule> {
    let r = Rule::new();
    r.define(e)?;
    Ok(r)
}

/// A linked grammar: one fused program, shareable across parsers.
#[derive(Clone, Default)]
pub struct Grammar {
    program: Rc<Program>,
}

impl Grammar {
    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn shared_program(&self) -> Rc<Program> {
        Rc::clone(&self.program)
    }

    /// An expression calling into this grammar.
    pub fn call(&self) -> Expr {
        let g = self.clone();
        Expr::new(move |d| d.call_grammar(&g, 0))
    }

    /// Render the linked program one instruction per line.
    pub fn disassemble<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.program.disassemble(out)
    }
}

impl From<&Grammar> for Expr {
    fn from(g: &Grammar) -> Expr {
        g.call()
    }
}

/// Link the grammar reachable from `start_rule` into a single program.
pub fn start(start_rule: &Rule) -> Result<Grammar> {
    let log = create_logger("linker");
    let mut grprogram = Program::default();
    let mut addresses: HashMap<usize, isize> = HashMap::new();
    let mut calls: Vec<(ProgramRef, isize)> = Vec::new();
    let mut left_recursive: HashSet<usize> = HashSet::new();
    // (traversal callstack, program to lay out)
    type CallStack = Vec<(Option<Rule>, bool)>;
    let mut unprocessed: Vec<(CallStack, ProgramRef)> = Vec::new();

    {
        let mut sink = ProgramSink { prog: &mut grprogram };
        let mut enc = Encoder::new(&mut sink);
        enc.call_rule(start_rule, 0, false)?;
        enc.encode_alt(op::ACCEPT, alt::ACCEPT_FINAL)?;
    }
    let root = ProgramRef::Rule(start_rule.clone());
    calls.push((root.clone(), 0));
    unprocessed.push((vec![(Some(start_rule.clone()), false)], root));

    while let Some((callstack, target)) = unprocessed.pop() {
        let address = grprogram.code.len() as isize;
        if addresses.contains_key(&target.key()) {
            continue;
        }
        addresses.insert(target.key(), address);
        target.with_program(|p| grprogram.concatenate(p))?;
        grprogram.code.push(instruction::prefix(op::RET, 0, 0));
        log_detail!(log, "laid out program {:#x} at {}", target.key(), address);

        let top_rule = match callstack.last() {
            Some((Some(r), _)) => r.clone(),
            _ => continue,
        };
        for callee in top_rule.callees() {
            calls.push((callee.target.clone(), address + callee.offset));
            let mut recursive = false;
            if let (Some(callee_rule), true) = (&callee.rule, callee.left_most) {
                for (caller, caller_left) in callstack.iter().rev() {
                    if caller.as_ref().map(Rule::key) == Some(callee_rule.key()) {
                        left_recursive.insert(callee.target.key());
                        log_detail!(log, "marked {:#x} left-recursive", callee.target.key());
                        recursive = true;
                        break;
                    }
                    if !caller_left {
                        break;
                    }
                }
            }
            if !recursive {
                let mut next = callstack.clone();
                next.push((callee.rule.clone(), callee.left_most));
                unprocessed.push((next, callee.target));
            }
        }
    }

    for (target, instr_addr) in calls {
        let at = instr_addr as usize;
        let word = grprogram.code[at];
        if instruction::opcode(word) == op::CALL {
            let prec = instruction::val(word);
            let prec = if left_recursive.contains(&target.key()) {
                if prec != 0 {
                    prec
                } else {
                    1
                }
            } else {
                0
            };
            grprogram.code[at] = instruction::prefix(op::CALL, instruction::aux(word), prec);
        }
        let rel = instruction::offset(grprogram.code[at + 1]) as i64 + addresses[&target.key()] as i64
            - (instr_addr as i64 + 2);
        let rel = i32::try_from(rel).map_err(|_| crate::error::Error::ProgramLimit)?;
        grprogram.code[at + 1] = instruction::offset_word(rel);
    }

    Ok(Grammar { program: Rc::new(grprogram) })
}
