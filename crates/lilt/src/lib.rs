//! lilt - an embedded DSL for Parsing Expression Grammars
//!
//! Grammar rules are built from operator-overloaded combinators, compiled to
//! a compact bytecode, linked into a single program and executed by a
//! backtracking virtual machine with packrat-style left-recursion support
//! and deferred semantic actions.
//!
//! # Overview
//!
//! - Combinators ([`Expr`]) compose primitives: `+` sequence, `|` ordered
//!   choice, `!` negative lookahead, [`star`]/[`plus`]/[`opt`]/[`peek`],
//!   [`chr`], [`lit`], [`any`], [`eoi`] and friends.
//! - [`Rule`]s name points in the grammar graph and may be left-recursive.
//! - [`start`] links everything reachable from the root into a [`Grammar`].
//! - [`parse`] (or a [`Parser`]) runs the grammar over UTF-8 input pulled
//!   from buffers or callback sources.
//! - Actions (`expr.act(…)`) and captures (`expr.cap(…)`) queue up during
//!   the parse and run in order once the result is committed; they
//!   communicate through the [`Semantics`] attribute stack and
//!   [`Variable`]s.
//!
//! # Example
//!
//! ```ignore
//! use lilt::{chr, eoi, parse, rule, start};
//!
//! let ab = rule((chr('a') | chr('b')).plus() + eoi())?;
//! let grammar = start(&ab)?;
//! assert!(parse("abba", &grammar)?);
//! assert!(!parse("abc", &grammar)?);
//! ```
//!
//! Execution can be traced with `DEBUG=pegvm` (and `DEBUG=linker` for
//! grammar layout), or per-parser via [`Parser::set_trace`].

mod encoder;
mod error;
mod expr;
mod instruction;
mod parser;
mod program;
mod rule;
mod semantics;
mod strexpr;
pub mod unicode;
pub mod utf8;

// Re-export from lilt-common
pub use common::{create_logger, Logger};

pub use error::{Error, Result};
pub use expr::{
    any, chr, chr_range, class, cut, eoi, eol, eps, gc, lit, nl, opt, peek, plus, pred, prop,
    script, space, star, Expr, Variable,
};
pub use parser::{parse, parse_reader, Parser, Registers};
pub use program::{Program, SemanticAction, SemanticCapture, SemanticPredicate};
pub use rule::{rule, start, Grammar, Rule};
pub use semantics::{Semantics, SyntaxPosition, SyntaxRange, SyntaxView};
