//! Folds the token stream into a list of commands.

use super::tokenizer::{tokenize, LexItem};
use super::{
    Command, ContinuationRequest, Redirection, RedirectionKind, Subcommand, Token, TokenKind,
};

struct CommandBuilder {
    commands: Vec<Command>,
    command: Command,
    subcommand: Subcommand,
    pending_redirect: Option<(RedirectionKind, i32)>,
}

impl CommandBuilder {
    fn new() -> Self {
        CommandBuilder {
            commands: Vec::new(),
            command: Command::default(),
            subcommand: Subcommand::default(),
            pending_redirect: None,
        }
    }

    fn push_word(&mut self, token: Token) {
        match self.pending_redirect.take() {
            Some((kind, fd)) => self.subcommand.redirections.push(Redirection {
                kind,
                fd,
                path: Some(token),
            }),
            None => self.subcommand.args.push(token),
        }
    }

    fn finish_subcommand(&mut self) {
        self.flush_dangling_redirect();
        if !self.subcommand.is_empty() {
            self.command
                .subcommands
                .push(std::mem::take(&mut self.subcommand));
        }
    }

    fn finish_command(&mut self) {
        self.finish_subcommand();
        if !self.command.subcommands.is_empty() {
            self.commands.push(std::mem::take(&mut self.command));
        } else {
            self.command = Command::default();
        }
    }

    /// A redirection with no path keeps an empty path token; the planner's
    /// `open("")` then fails and the command yields 1.
    fn flush_dangling_redirect(&mut self) {
        if let Some((kind, fd)) = self.pending_redirect.take() {
            self.subcommand.redirections.push(Redirection {
                kind,
                fd,
                path: Some(Token::bare("")),
            });
        }
    }
}

pub fn parse_line(input: &str) -> Vec<Command> {
    let mut builder = CommandBuilder::new();
    for item in tokenize(input) {
        match item {
            LexItem::Word(token) => builder.push_word(token),
            LexItem::Redirect { kind, fd } => {
                builder.flush_dangling_redirect();
                builder.pending_redirect = Some((kind, fd));
            }
            LexItem::Pipe => {
                // The pipe redirection stays on the left-hand subcommand; a
                // trailing pipe therefore leaves it on the last subcommand,
                // which is what the completeness check looks for.
                builder.flush_dangling_redirect();
                builder.subcommand.redirections.push(Redirection {
                    kind: RedirectionKind::Pipe,
                    fd: libc::STDOUT_FILENO,
                    path: None,
                });
                builder.finish_subcommand();
            }
            LexItem::Background => {
                builder.command.in_background = true;
                builder.finish_command();
            }
            LexItem::AndIf => {
                builder.command.short_circuit_on_failure = true;
                builder.finish_command();
            }
            LexItem::Separator => builder.finish_command(),
        }
    }
    builder.finish_command();
    builder.commands
}

/// Examines only the last subcommand of the last command: a trailing pipe or
/// an unterminated quote means the line is not complete yet.
pub fn is_complete(commands: &[Command]) -> ContinuationRequest {
    let Some(last_command) = commands.last() else {
        return ContinuationRequest::Nothing;
    };
    let Some(last_subcommand) = last_command.subcommands.last() else {
        return ContinuationRequest::Nothing;
    };

    if last_subcommand
        .redirections
        .iter()
        .any(|r| r.kind == RedirectionKind::Pipe)
    {
        return ContinuationRequest::Pipe;
    }
    if last_subcommand
        .args
        .iter()
        .any(|t| t.kind == TokenKind::UnterminatedSingleQuoted)
    {
        return ContinuationRequest::SingleQuotedString;
    }
    if last_subcommand
        .args
        .iter()
        .any(|t| t.kind == TokenKind::UnterminatedDoubleQuoted)
    {
        return ContinuationRequest::DoubleQuotedString;
    }
    ContinuationRequest::Nothing
}
