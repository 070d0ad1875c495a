//! String-expression compiler.
//!
//! `lit("…")` literals are a regex-lite mini-language: plain byte sequences,
//! `.` for any rune, and bracket expressions `[abc]`, `[a-z]`, `[^…]`,
//! `[:class:]`. The compiler is itself a grammar written in the DSL; its
//! semantic callbacks drive a generator that emits bare match instructions.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use crate::encoder::{Encoder, VecSink};
use crate::error::{Error, Result};
use crate::expr::{any, chr, eoi, eps, opt, plus, star};
use crate::instruction::op;
use crate::parser::Parser;
use crate::rule::{rule, start, Grammar};
use crate::unicode::{stoctype, Ctype};

/// A compiled string expression: bare instructions, ready to splice into any
/// program.
#[derive(Clone)]
pub(crate) struct StringExpression {
    code: Vec<u32>,
    matches_eps: bool,
}

impl StringExpression {
    pub(crate) fn compile(text: &str) -> Result<StringExpression> {
        let gen = Rc::new(RefCell::new(Generator::default()));
        let grammar = bootstrap(&gen)?;
        let mut parser = Parser::new(&grammar);
        parser.enqueue(text);
        let ok = parser.parse()?;
        let gen = gen.borrow();
        if let Some(e) = gen.error {
            return Err(e);
        }
        if !ok {
            return Err(Error::BadStringExpression);
        }
        Ok(StringExpression { code: gen.code.clone(), matches_eps: !gen.consumes })
    }

    pub(crate) fn encode_into(&self, d: &mut Encoder) -> Result<()> {
        for &w in &self.code {
            d.append(w)?;
        }
        d.note_consumes(!self.matches_eps);
        Ok(())
    }
}

/// Accumulates instructions while the bootstrap grammar walks a literal.
struct Generator {
    code: Vec<u32>,
    consumes: bool,
    ranges: Vec<(String, String)>,
    classes: Ctype,
    circumflex: bool,
    error: Option<Error>,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            code: Vec::new(),
            consumes: false,
            ranges: Vec::new(),
            classes: Ctype::empty(),
            circumflex: false,
            error: None,
        }
    }
}

impl Generator {
    fn emit(&mut self, f: impl FnOnce(&mut Encoder) -> Result<()>) {
        if self.error.is_some() {
            return;
        }
        let mut sink = VecSink { code: &mut self.code };
        let mut enc = Encoder::new(&mut sink);
        if let Err(e) = f(&mut enc) {
            self.error = Some(e);
        }
    }

    fn emit_eps(&mut self) {
        self.emit(|d| d.encode(op::MATCH));
    }

    fn emit_any(&mut self) {
        self.emit(|d| d.encode(op::MATCH_ANY));
        self.consumes = true;
    }

    fn emit_match(&mut self, text: &str) {
        let text = text.to_string();
        self.emit(|d| d.match_lit(&text));
        self.consumes = true;
    }

    fn bracket_class(&mut self, name: &str) {
        match stoctype(name) {
            Some(c) => self.classes |= c,
            None => self.error = Some(Error::BadCharacterClass),
        }
    }

    fn bracket_range_expr(&mut self, capture: &str) {
        match capture.find('-') {
            Some(i) => {
                let lo = capture[..i].to_string();
                let hi = capture[i + 1..].to_string();
                self.bracket_range(&lo, &hi);
            }
            None => self.error = Some(Error::BadStringExpression),
        }
    }

    fn bracket_range(&mut self, first: &str, last: &str) {
        let (lo, hi) = if first > last { (last, first) } else { (first, last) };
        self.ranges.push((lo.to_string(), hi.to_string()));
    }

    /// Fold the collected ranges into a right-nested alternation.
    fn encode_ranges(merged: &[(String, String)]) -> Result<Vec<u32>> {
        let mut matches: Vec<u32> = Vec::new();
        let mut iter = merged.iter().rev();
        if let Some((lo, hi)) = iter.next() {
            let mut sink = VecSink { code: &mut matches };
            let mut enc = Encoder::new(&mut sink);
            enc.match_range(lo, hi)?;
        }
        for (lo, hi) in iter {
            let mut left: Vec<u32> = Vec::new();
            {
                let mut sink = VecSink { code: &mut left };
                let mut enc = Encoder::new(&mut sink);
                enc.match_range(lo, hi)?;
            }
            let mut both: Vec<u32> = Vec::new();
            {
                let mut sink = VecSink { code: &mut both };
                let mut enc = Encoder::new(&mut sink);
                enc.encode_off(op::CHOICE, 2 + left.len() as isize)?;
                for &w in &left {
                    enc.append(w)?;
                }
                enc.encode_off(op::COMMIT, matches.len() as isize)?;
                for &w in &matches {
                    enc.append(w)?;
                }
            }
            matches = both;
        }
        Ok(matches)
    }

    fn bracket_commit(&mut self) {
        let mut ranges = mem::take(&mut self.ranges);
        let classes = self.classes;
        let circumflex = self.circumflex;
        self.classes = Ctype::empty();
        self.circumflex = false;
        if self.error.is_some() {
            return;
        }

        ranges.sort();
        let mut merged: Vec<(String, String)> = Vec::new();
        for (lo, hi) in ranges {
            match merged.last_mut() {
                Some(m) if lo <= m.1 => {
                    if hi > m.1 {
                        m.1 = hi;
                    }
                }
                _ => merged.push((lo, hi)),
            }
        }

        let matches = match Self::encode_ranges(&merged) {
            Ok(m) => m,
            Err(e) => {
                self.error = Some(e);
                return;
            }
        };

        self.emit(|d| {
            // ranges and named classes are alternatives within one bracket
            let mut content: Vec<u32> = Vec::new();
            {
                let mut sink = VecSink { code: &mut content };
                let mut enc = Encoder::new(&mut sink);
                if !matches.is_empty() && !classes.is_empty() {
                    enc.encode_off(op::CHOICE, 2 + matches.len() as isize)?;
                    for &w in &matches {
                        enc.append(w)?;
                    }
                    enc.encode_off(op::COMMIT, 1)?;
                    enc.encode_imm(op::MATCH_CLASS, classes.bits())?;
                } else if !matches.is_empty() {
                    for &w in &matches {
                        enc.append(w)?;
                    }
                } else if !classes.is_empty() {
                    enc.encode_imm(op::MATCH_CLASS, classes.bits())?;
                }
            }
            if circumflex {
                d.encode_off(op::CHOICE, content.len() as isize + 3)?;
            }
            for &w in &content {
                d.append(w)?;
            }
            if circumflex {
                d.encode_off(op::COMMIT, 0)?;
                d.encode(op::FAIL)?;
                d.encode(op::MATCH_ANY)?;
            }
            Ok(())
        });
        self.consumes = true;
    }
}

/// The bootstrap grammar over string-expression syntax, with callbacks
/// driving `gen`.
fn bootstrap(gen: &Rc<RefCell<Generator>>) -> Result<Grammar> {
    let g = gen.clone();
    let empty = rule(eps().act(move |_| g.borrow_mut().emit_eps()))?;

    let g = gen.clone();
    let dot = rule(chr('.').act(move |_| g.borrow_mut().emit_any()))?;

    let g1 = gen.clone();
    let g2 = gen.clone();
    let g3 = gen.clone();
    let element = rule(
        (any() + chr('-') + !chr(']') + any()).cap(move |_, x| g1.borrow_mut().bracket_range_expr(x.capture))
            | (chr('[') + chr(':') + plus(!chr(':') + any()) + chr(':') + chr(']')).cap(move |_, x| {
                let name = &x.capture[2..x.capture.len() - 2];
                g2.borrow_mut().bracket_class(name);
            })
            | any().cap(move |_, x| g3.borrow_mut().bracket_range(x.capture, x.capture)),
    )?;

    let g1 = gen.clone();
    let g2 = gen.clone();
    let bracket = rule(
        (chr('[')
            + opt(chr('^').act(move |_| g1.borrow_mut().circumflex = true))
            + element.call()
            + star(!chr(']') + element.call())
            + chr(']'))
        .act(move |_| g2.borrow_mut().bracket_commit()),
    )?;

    let g = gen.clone();
    let sequence =
        rule(plus(!(chr('.') | chr('[')) + any()).cap(move |_, x| g.borrow_mut().emit_match(x.capture)))?;

    let top = rule((plus(dot.call() | bracket.call() | sequence.call()) | empty.call()) + eoi())?;
    start(&top)
}
