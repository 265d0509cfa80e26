//! rustyline helper: executable-name and filename completion, a history
//! auto-suggest hint, and bracket highlighting.

use std::env;

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::Hinter;
use rustyline::history::{History, SearchDirection};
use rustyline::validate::{MatchingBracketValidator, Validator};
use rustyline::{Context, Helper};

use nix::unistd::{access, AccessFlags};

use crate::builtins::BUILTIN_NAMES;

/// Scans every `$PATH` entry for executables and folds in the built-in
/// names. Rebuilt whenever `export` changes `PATH`.
pub fn cache_executables() -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    if let Ok(path) = env::var("PATH") {
        for directory in path.split(':').filter(|d| !d.is_empty()) {
            let Ok(entries) = std::fs::read_dir(directory) else {
                continue;
            };
            for entry in entries.flatten() {
                let full_path = entry.path();
                if access(&full_path, AccessFlags::X_OK).is_ok()
                    && full_path.is_file()
                {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
    }
    names.extend(BUILTIN_NAMES.iter().map(|name| name.to_string()));
    names.sort();
    names.dedup();
    names
}

pub struct LineHelper {
    completer: FilenameCompleter,
    highlighter: MatchingBracketHighlighter,
    validator: MatchingBracketValidator,
    hinter: HistoryAutosuggest,
    commands: Vec<String>,
}

impl LineHelper {
    pub fn new() -> Self {
        LineHelper {
            completer: FilenameCompleter::new(),
            highlighter: MatchingBracketHighlighter::new(),
            validator: MatchingBracketValidator::new(),
            hinter: HistoryAutosuggest,
            commands: Vec::new(),
        }
    }

    pub fn set_commands(&mut self, commands: Vec<String>) {
        self.commands = commands;
    }
}

impl Default for LineHelper {
    fn default() -> Self {
        LineHelper::new()
    }
}

/// The token under the cursor and where it starts.
fn current_token(line: &str, pos: usize) -> (usize, &str) {
    let head = &line[..pos];
    let start = head
        .rfind(|ch: char| ch.is_whitespace() || matches!(ch, ';' | '|' | '&'))
        .map(|index| index + 1)
        .unwrap_or(0);
    (start, &head[start..])
}

/// True when the token starts a subcommand, i.e. only whitespace or an
/// operator precedes it.
fn is_command_position(line: &str, start: usize) -> bool {
    line[..start]
        .chars()
        .rev()
        .find(|ch| !ch.is_whitespace())
        .map(|ch| matches!(ch, ';' | '|' | '&'))
        .unwrap_or(true)
}

fn complete_from_list(prefix: &str, candidates: &[String]) -> Vec<Pair> {
    candidates
        .iter()
        .filter(|candidate| candidate.starts_with(prefix) && !prefix.is_empty())
        .map(|candidate| Pair {
            display: candidate.clone(),
            replacement: candidate.clone(),
        })
        .collect()
}

struct HistoryAutosuggest;

impl Hinter for HistoryAutosuggest {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if line.is_empty() || pos < line.len() {
            return None;
        }
        let history = ctx.history();
        let start = if ctx.history_index() == history.len() {
            ctx.history_index().saturating_sub(1)
        } else {
            ctx.history_index()
        };
        let result = history
            .starts_with(line, start, SearchDirection::Reverse)
            .ok()
            .flatten()?;
        if result.entry == line {
            return None;
        }
        let remainder = result.entry[pos..].to_string();
        if remainder.is_empty() {
            return None;
        }
        Some(remainder)
    }
}

impl Helper for LineHelper {}

impl Completer for LineHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let (start, token) = current_token(line, pos);
        let mut pairs = self.completer.complete(line, pos, ctx)?.1;
        if is_command_position(line, start) && !token.contains('/') {
            pairs.extend(complete_from_list(token, &self.commands));
        }
        Ok((start, pairs))
    }
}

impl Hinter for LineHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for LineHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> std::borrow::Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> std::borrow::Cow<'b, str> {
        self.highlighter.highlight_prompt(prompt, default)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> std::borrow::Cow<'h, str> {
        if hint.is_empty() {
            return std::borrow::Cow::Borrowed(hint);
        }
        std::borrow::Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: bool) -> bool {
        self.highlighter.highlight_char(line, pos, forced)
    }
}

impl Validator for LineHelper {
    fn validate(
        &self,
        ctx: &mut rustyline::validate::ValidationContext<'_>,
    ) -> Result<rustyline::validate::ValidationResult, ReadlineError> {
        self.validator.validate(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_token_finds_word_under_cursor() {
        assert_eq!(current_token("echo hel", 8), (5, "hel"));
        assert_eq!(current_token("echo ", 5), (5, ""));
        assert_eq!(current_token("a|gr", 4), (2, "gr"));
    }

    #[test]
    fn command_position_follows_operators() {
        assert!(is_command_position("ec", 0));
        assert!(is_command_position("a | b", 4));
        assert!(!is_command_position("echo hel", 5));
    }

    #[test]
    fn cache_contains_builtins() {
        let names = cache_executables();
        assert!(names.iter().any(|name| name == "cd"));
        assert!(names.iter().any(|name| name == "jobs"));
        assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
