//! Command-line syntax tree consumed by the execution engine.
//!
//! A physical line parses into a list of [`Command`]s separated by `;`, `&`
//! or `&&`. Each command is a pipeline of [`Subcommand`]s, and each
//! subcommand carries its argument tokens plus the redirections attached to
//! it. Fd rewirings are *not* produced here; the pipeline planner derives
//! them from the redirections at execution time.

use std::os::fd::RawFd;

mod command_parser;
mod tokenizer;

pub use command_parser::{is_complete, parse_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bare,
    SingleQuoted,
    DoubleQuoted,
    UnterminatedSingleQuoted,
    UnterminatedDoubleQuoted,
    Comment,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn bare(text: impl Into<String>) -> Self {
        Token {
            kind: TokenKind::Bare,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionKind {
    Pipe,
    FileRead,
    FileWrite,
    FileWriteAppend,
}

/// A redirection attached to one subcommand. `fd` is the descriptor in the
/// child that gets replaced; `path` is absent for `Pipe`.
#[derive(Debug, Clone)]
pub struct Redirection {
    pub kind: RedirectionKind,
    pub fd: RawFd,
    pub path: Option<Token>,
}

#[derive(Debug, Clone, Default)]
pub struct Subcommand {
    pub args: Vec<Token>,
    pub redirections: Vec<Redirection>,
}

impl Subcommand {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.redirections.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Command {
    pub subcommands: Vec<Subcommand>,
    /// Trailing `&`.
    pub in_background: bool,
    /// Trailing `&&`: a non-zero exit skips the rest of the chain.
    pub short_circuit_on_failure: bool,
}

/// Reported when the parsed line cannot execute yet and the read loop must
/// collect another physical line before re-parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationRequest {
    #[default]
    Nothing,
    Pipe,
    SingleQuotedString,
    DoubleQuotedString,
}
