//! Splits a physical line into words and operators.
//!
//! Quoting rules: single quotes are fully literal, double quotes keep
//! whitespace and operators literal but allow `\"` and `\\` escapes, and a
//! backslash outside quotes escapes the next character. A quote left open at
//! end of line yields an `Unterminated*` token so the caller can request a
//! continuation line instead of failing.

use std::os::fd::RawFd;

use super::{RedirectionKind, Token, TokenKind};

#[derive(Debug)]
pub(super) enum LexItem {
    Word(Token),
    Pipe,
    Redirect { kind: RedirectionKind, fd: RawFd },
    Background,
    AndIf,
    Separator,
}

/// Tracks how much of the current word came from a quoted run, so a word
/// that is exactly one quoted string keeps its quote kind.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WordShape {
    Empty,
    WholeQuote(TokenKind),
    Mixed,
}

struct Lexer {
    items: Vec<LexItem>,
    current: String,
    shape: WordShape,
}

impl Lexer {
    fn new() -> Self {
        Lexer {
            items: Vec::new(),
            current: String::new(),
            shape: WordShape::Empty,
        }
    }

    fn push_char(&mut self, ch: char) {
        self.current.push(ch);
        self.shape = WordShape::Mixed;
    }

    fn push_quoted_run(&mut self, text: &str, kind: TokenKind) {
        let was_empty = self.current.is_empty();
        self.current.push_str(text);
        self.shape = if was_empty && self.shape == WordShape::Empty {
            WordShape::WholeQuote(kind)
        } else {
            WordShape::Mixed
        };
    }

    fn commit_word(&mut self) {
        if self.current.is_empty() && self.shape == WordShape::Empty {
            return;
        }
        let kind = match self.shape {
            WordShape::WholeQuote(kind) => kind,
            _ => TokenKind::Bare,
        };
        let text = std::mem::take(&mut self.current);
        self.shape = WordShape::Empty;
        self.items.push(LexItem::Word(Token { kind, text }));
    }

    /// The current word, when it is all digits, names the fd of a
    /// redirection operator that immediately follows it.
    fn take_fd_prefix(&mut self) -> Option<RawFd> {
        if self.current.is_empty()
            || self.shape != WordShape::Mixed
            || !self.current.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let fd = self.current.parse::<RawFd>().ok()?;
        self.current.clear();
        self.shape = WordShape::Empty;
        Some(fd)
    }
}

pub(super) fn tokenize(input: &str) -> Vec<LexItem> {
    let mut lexer = Lexer::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' | '\n' => lexer.commit_word(),
            '#' if lexer.current.is_empty() && lexer.shape == WordShape::Empty => {
                let rest: String = chars.by_ref().collect();
                lexer.items.push(LexItem::Word(Token {
                    kind: TokenKind::Comment,
                    text: rest,
                }));
            }
            '|' => {
                lexer.commit_word();
                lexer.items.push(LexItem::Pipe);
            }
            ';' => {
                lexer.commit_word();
                lexer.items.push(LexItem::Separator);
            }
            '&' => {
                lexer.commit_word();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    lexer.items.push(LexItem::AndIf);
                } else {
                    lexer.items.push(LexItem::Background);
                }
            }
            '<' => {
                let fd = lexer.take_fd_prefix().unwrap_or(libc::STDIN_FILENO);
                lexer.commit_word();
                lexer.items.push(LexItem::Redirect {
                    kind: RedirectionKind::FileRead,
                    fd,
                });
            }
            '>' => {
                let fd = lexer.take_fd_prefix().unwrap_or(libc::STDOUT_FILENO);
                lexer.commit_word();
                let kind = if chars.peek() == Some(&'>') {
                    chars.next();
                    RedirectionKind::FileWriteAppend
                } else {
                    RedirectionKind::FileWrite
                };
                lexer.items.push(LexItem::Redirect { kind, fd });
            }
            '\'' => {
                let (text, terminated) = read_until(&mut chars, '\'', false);
                let kind = if terminated {
                    TokenKind::SingleQuoted
                } else {
                    TokenKind::UnterminatedSingleQuoted
                };
                lexer.push_quoted_run(&text, kind);
                if !terminated {
                    lexer.shape = WordShape::WholeQuote(kind);
                }
            }
            '"' => {
                let (text, terminated) = read_until(&mut chars, '"', true);
                let kind = if terminated {
                    TokenKind::DoubleQuoted
                } else {
                    TokenKind::UnterminatedDoubleQuoted
                };
                lexer.push_quoted_run(&text, kind);
                if !terminated {
                    lexer.shape = WordShape::WholeQuote(kind);
                }
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    lexer.push_char(next);
                }
            }
            _ => lexer.push_char(ch),
        }
    }

    lexer.commit_word();
    lexer.items
}

fn read_until(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    delimiter: char,
    allow_escape: bool,
) -> (String, bool) {
    let mut text = String::new();
    while let Some(ch) = chars.next() {
        if ch == delimiter {
            return (text, true);
        }
        if allow_escape && ch == '\\' {
            match chars.peek() {
                Some(&next) if next == delimiter || next == '\\' => {
                    text.push(next);
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        text.push(ch);
    }
    (text, false)
}
