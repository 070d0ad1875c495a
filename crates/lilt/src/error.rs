//! Error conditions raised by grammar construction and parsing.

use thiserror::Error;

/// Errors raised by the library.
///
/// Everything except [`Error::BadOpcode`], [`Error::ReentrantParse`] and
/// [`Error::ReentrantRead`] is raised while a grammar is being built, never
/// during a parse. An input that simply fails to match is not an error: the
/// parse returns `Ok(false)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Instruction count or a jump/call offset exceeds the encodable range.
    #[error("length or offset of program exceeds internal limit")]
    ProgramLimit,

    /// A side-table index or inline string exceeds its 16-bit/256-byte bound.
    #[error("number of resources exceeds internal limit")]
    ResourceLimit,

    /// The grammar has no instructions.
    #[error("invalid or empty grammar")]
    BadGrammar,

    /// A corrupt instruction was decoded at runtime.
    #[error("invalid opcode")]
    BadOpcode,

    /// A string expression failed to compile.
    #[error("invalid string or bracket expression")]
    BadStringExpression,

    /// A `[:name:]` character class is not recognized.
    #[error("invalid character class")]
    BadCharacterClass,

    /// `parse` was called from inside a running parse.
    #[error("parsing is non-reentrant")]
    ReentrantParse,

    /// Input sources were modified while the parser was reading them.
    #[error("attempted to modify input sources while reading")]
    ReentrantRead,
}

pub type Result<T> = std::result::Result<T, Error>;
