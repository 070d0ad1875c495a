//! Combinator expressions.
//!
//! An [`Expr`] is a shared closure that drives an [`Encoder`]; every
//! combinator composes sub-expression closures and emits a fixed instruction
//! shape around them. Rust operators cover what they can (`+` sequence, `|`
//! ordered choice, `!` negative lookahead, `%` and `<<` variable binding);
//! the rest are functions and methods.
//!
//! ```ignore
//! let sum = Rule::new();
//! sum.define(sum.call() + chr('+') + chr('a') | chr('a'))?;
//! let grammar = start(&sum)?;
//! assert!(parse("a+a", &grammar)?);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Add, BitOr, Not, Rem, Shl};
use std::rc::Rc;

use crate::encoder::Encoder;
use crate::error::Result;
use crate::instruction::{alt, op};
use crate::parser::Parser;
use crate::program::{SemanticAction, SemanticCapture, SemanticPredicate};
use crate::semantics::{Semantics, SyntaxView};
use crate::strexpr::StringExpression;
use crate::unicode::{Ctype, GcFlags, Props, Script};

/// A grammar expression: composable, cloneable, encodable.
#[derive(Clone)]
pub struct Expr {
    f: Rc<dyn Fn(&mut Encoder) -> Result<()>>,
}

impl Expr {
    pub(crate) fn new(f: impl Fn(&mut Encoder) -> Result<()> + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    pub(crate) fn encode_into(&self, d: &mut Encoder) -> Result<()> {
        (&*self.f)(d)
    }

    /// Bind a semantic action, run in order on committed acceptance.
    pub fn act<F: Fn(&mut Semantics) + 'static>(self, f: F) -> Expr {
        let a: SemanticAction = Rc::new(f);
        Expr::new(move |d| {
            d.evaluate(&self)?;
            d.encode_action(a.clone())
        })
    }

    /// Bind a capture action receiving the matched syntax.
    pub fn cap<F: Fn(&mut Semantics, &SyntaxView) + 'static>(self, f: F) -> Expr {
        let c: SemanticCapture = Rc::new(f);
        Expr::new(move |d| {
            d.encode(op::BEGIN_CAPTURE)?;
            d.evaluate(&self)?;
            d.encode_capture(c.clone())
        })
    }

    /// Bind a producer whose result is pushed as an attribute.
    pub fn val<T: 'static, F: Fn() -> T + 'static>(self, f: F) -> Expr {
        self.act(move |s| s.push_attribute(f()))
    }

    pub fn star(self) -> Expr {
        star(self)
    }

    pub fn plus(self) -> Expr {
        plus(self)
    }

    pub fn opt(self) -> Expr {
        opt(self)
    }

    /// Commit everything matched so far, then parse `self`.
    pub fn cut_before(self) -> Expr {
        cut() + self
    }

    /// Parse `self`, then commit.
    pub fn cut_after(self) -> Expr {
        self + cut()
    }
}

// ============================================================================
// Primitives
// ============================================================================

/// Match any single rune.
pub fn any() -> Expr {
    Expr::new(|d| {
        d.encode(op::MATCH_ANY)?;
        d.note_consumes(true);
        Ok(())
    })
}

/// Match empty input.
pub fn eps() -> Expr {
    Expr::new(|d| d.encode(op::MATCH))
}

/// Commit the parse up to this point; backtracking will not retreat past it.
pub fn cut() -> Expr {
    Expr::new(|d| d.encode(op::ACCEPT))
}

/// Advance the line counter and reset the column. Consumes nothing.
pub fn nl() -> Expr {
    Expr::new(|d| d.encode(op::NEWLINE))
}

/// Succeed only at end of input.
pub fn eoi() -> Expr {
    Expr::new(|d| {
        d.encode_off(op::CHOICE, 2)?;
        d.encode(op::MATCH_ANY)?;
        d.encode_imm(op::FAIL, 1)
    })
}

/// Match one line ending (`\n`, `\r` or `\r\n`) and count the line.
pub fn eol() -> Expr {
    Expr::new(|d| {
        d.encode_off(op::CHOICE, 4)?;
        d.match_lit("\n")?;
        d.encode_off(op::COMMIT, 7)?;
        d.match_lit("\r")?;
        d.encode_off(op::CHOICE, 3)?;
        d.match_lit("\n")?;
        d.encode(op::COMMIT)?;
        d.encode(op::NEWLINE)
    })
}

/// Match one whitespace rune, counting lines at line endings.
pub fn space() -> Expr {
    Expr::new(|d| {
        let e = d.evaluate_length(&eol())?;
        d.encode_off(op::CHOICE, 4)?;
        d.match_lit(" ")?;
        d.encode_off(op::COMMIT, 6 + e)?;
        d.encode_off(op::CHOICE, 2 + e)?;
        d.evaluate(&eol())?;
        d.encode_off(op::COMMIT, 2)?;
        d.match_range("\t", "\r")
    })
}

/// Match one specific rune.
pub fn chr(c: char) -> Expr {
    Expr::new(move |d| {
        let mut buf = [0u8; 4];
        d.match_lit(c.encode_utf8(&mut buf))
    })
}

/// Match one rune in the inclusive range `[lo, hi]`.
pub fn chr_range(lo: char, hi: char) -> Expr {
    Expr::new(move |d| {
        let mut b0 = [0u8; 4];
        let mut b1 = [0u8; 4];
        d.match_range(lo.encode_utf8(&mut b0), hi.encode_utf8(&mut b1))
    })
}

/// Lift a string literal into a string expression: plain text with `.` as
/// any-rune and `[…]` bracket classes. Compilation happens when the
/// enclosing rule or grammar is built.
pub fn lit(text: impl Into<String>) -> Expr {
    let text = text.into();
    let cache: RefCell<Option<Result<StringExpression>>> = RefCell::new(None);
    Expr::new(move |d| {
        let mut slot = cache.borrow_mut();
        let compiled = slot.get_or_insert_with(|| StringExpression::compile(&text));
        match compiled {
            Ok(se) => se.encode_into(d),
            Err(e) => Err(*e),
        }
    })
}

/// Gate the parse on a predicate; `false` propagates as a match failure.
pub fn pred<F: Fn(&mut Parser) -> bool + 'static>(f: F) -> Expr {
    let p: SemanticPredicate = Rc::new(f);
    Expr::new(move |d| d.encode_pred(p.clone()))
}

/// Match one rune in any of the given POSIX-style classes.
pub fn class(classes: Ctype) -> Expr {
    Expr::new(move |d| {
        d.encode_imm(op::MATCH_CLASS, classes.bits())?;
        d.note_consumes(true);
        Ok(())
    })
}

/// Match one rune in any of the given general categories.
pub fn gc(flags: GcFlags) -> Expr {
    Expr::new(move |d| {
        d.encode_str_alt(op::MATCH_CLASS, alt::CLASS_GCTYPE, 1, &flags.bits().to_le_bytes())?;
        d.note_consumes(true);
        Ok(())
    })
}

/// Match one rune with any of the given properties.
pub fn prop(props: Props) -> Expr {
    Expr::new(move |d| {
        d.encode_str_alt(op::MATCH_CLASS, alt::CLASS_PTYPE, 1, &props.bits().to_le_bytes())?;
        d.note_consumes(true);
        Ok(())
    })
}

/// Match one rune of the given script.
pub fn script(s: Script) -> Expr {
    Expr::new(move |d| {
        d.encode_alt_imm(op::MATCH_CLASS, alt::CLASS_SCTYPE, s as u16)?;
        d.note_consumes(true);
        Ok(())
    })
}

// ============================================================================
// Combinators
// ============================================================================

/// Zero-or-more, greedy.
pub fn star(e: impl Into<Expr>) -> Expr {
    let x = e.into();
    Expr::new(move |d| {
        let n = d.evaluate_length(&x)?;
        d.encode_off(op::CHOICE, 2 + n)?;
        d.eps_push(1);
        d.evaluate(&x)?;
        d.eps_pop();
        d.encode_off_alt(op::COMMIT, alt::COMMIT_PARTIAL, -(2 + n))
    })
}

/// One-or-more, greedy.
pub fn plus(e: impl Into<Expr>) -> Expr {
    let x = e.into();
    x.clone() + star(x)
}

/// Zero-or-one.
pub fn opt(e: impl Into<Expr>) -> Expr {
    e.into() | eps()
}

/// Positive lookahead: succeed iff `e` matches, consuming nothing.
pub fn peek(e: impl Into<Expr>) -> Expr {
    let x = e.into();
    Expr::new(move |d| {
        let n = d.evaluate_length(&x)?;
        d.encode_off(op::CHOICE, 2 + n)?;
        d.eps_push(1);
        d.evaluate(&x)?;
        d.eps_pop();
        d.encode_off_alt(op::COMMIT, alt::COMMIT_BACK, 1)?;
        d.encode(op::FAIL)
    })
}

impl Not for Expr {
    type Output = Expr;

    /// Negative lookahead: succeed iff the operand fails, consuming nothing.
    fn not(self) -> Expr {
        let x = self;
        Expr::new(move |d| {
            let n = d.evaluate_length(&x)?;
            d.encode_off(op::CHOICE, 1 + n)?;
            d.eps_push(1);
            d.evaluate(&x)?;
            d.eps_pop();
            d.encode_imm(op::FAIL, 1)
        })
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    /// Sequence.
    fn add(self, rhs: T) -> Expr {
        let a = self;
        let b = rhs.into();
        Expr::new(move |d| {
            d.evaluate(&a)?;
            d.evaluate(&b)
        })
    }
}

impl<T: Into<Expr>> BitOr<T> for Expr {
    type Output = Expr;

    /// Ordered choice: try the left operand, fall back to the right.
    fn bitor(self, rhs: T) -> Expr {
        let a = self;
        let b = rhs.into();
        Expr::new(move |d| {
            let n1 = d.evaluate_length(&a)?;
            d.encode_off(op::CHOICE, 2 + n1)?;
            d.eps_push(1);
            d.evaluate(&a)?;
            let n2 = d.evaluate_length(&b)?;
            d.encode_off(op::COMMIT, n2)?;
            d.eps_push(2);
            d.evaluate(&b)?;
            d.eps_and(2);
            Ok(())
        })
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Expr {
        lit(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Expr {
        lit(s)
    }
}

impl From<char> for Expr {
    fn from(c: char) -> Expr {
        chr(c)
    }
}

// ============================================================================
// Variables
// ============================================================================

/// A value scoped per semantic call depth, for carrying attributes between
/// actions of the same rule application.
pub struct Variable<T> {
    state: Rc<RefCell<HashMap<u16, T>>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self { state: Rc::clone(&self.state) }
    }
}

impl<T> Default for Variable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Variable<T> {
    pub fn new() -> Self {
        Self { state: Rc::new(RefCell::new(HashMap::new())) }
    }

    pub fn set(&self, s: &Semantics, value: T) {
        self.state.borrow_mut().insert(s.call_depth(), value);
    }
}

impl<T: Clone> Variable<T> {
    /// The value bound at the current call depth, if any.
    pub fn get(&self, s: &Semantics) -> Option<T> {
        self.state.borrow().get(&s.call_depth()).cloned()
    }
}

impl<T: Clone + 'static> Rem<Expr> for &Variable<T> {
    type Output = Expr;

    /// `&v % e` parses `e` and pops the attribute it produced into `v`.
    fn rem(self, e: Expr) -> Expr {
        let v = self.clone();
        e.act(move |s| {
            let x = s.pop_attribute::<T>();
            v.set(s, x);
        })
    }
}

impl<T: From<String> + 'static> Shl<Expr> for &Variable<T> {
    type Output = Expr;

    /// `&v << e` parses `e` and stores its matched text into `v`.
    fn shl(self, e: Expr) -> Expr {
        let v = self.clone();
        e.cap(move |s, x| v.set(s, T::from(x.capture.to_string())))
    }
}
