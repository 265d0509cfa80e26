//! Argument expansion: parsed tokens in, final argv strings out.
//!
//! Per token the stages run in a fixed order: variable expansion first
//! (which may split one token into several fragments), then tilde expansion
//! per fragment, then glob expansion per fragment. Comments are dropped.

use std::env;

use glob::{glob_with, MatchOptions};
use nix::unistd::{Uid, User};

use crate::parse::{Token, TokenKind};

type LookupVar<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

pub struct ExpansionContext<'a> {
    pub lookup_var: LookupVar<'a>,
    pub last_status: i32,
    pub shell_pid: i32,
}

impl ExpansionContext<'_> {
    /// The production context: variables come straight from the process
    /// environment.
    pub fn from_environment(last_status: i32) -> ExpansionContext<'static> {
        ExpansionContext {
            lookup_var: Box::new(|name| env::var(name).ok()),
            last_status,
            shell_pid: std::process::id() as i32,
        }
    }
}

pub fn expand_arguments(args: &[Token], ctx: &ExpansionContext<'_>) -> Vec<String> {
    let mut argv = Vec::new();
    for arg in args {
        if arg.kind == TokenKind::Comment {
            continue;
        }
        for fragment in expand_parameters(&arg.text, ctx) {
            let fragment = if fragment.starts_with('~') {
                expand_tilde(&fragment, ctx)
            } else {
                fragment
            };
            if is_glob(&fragment) {
                let matches = expand_globs(&fragment);
                if matches.is_empty() {
                    // nullglob is off: a pattern with no matches stays
                    // literal.
                    argv.push(fragment);
                } else {
                    argv.extend(matches);
                }
            } else {
                argv.push(fragment);
            }
        }
    }
    argv
}

/// Whole-token variable expansion: `$name` tokens are replaced by the
/// variable's value split on single spaces. `$?` and `$$` are handled here;
/// anything not starting with `$` passes through as one fragment.
fn expand_parameters(text: &str, ctx: &ExpansionContext<'_>) -> Vec<String> {
    let Some(name) = text.strip_prefix('$') else {
        return vec![text.to_string()];
    };
    match name {
        "?" => vec![ctx.last_status.to_string()],
        "$" => vec![ctx.shell_pid.to_string()],
        _ => match (ctx.lookup_var)(name) {
            // Unknown variables become a single empty argument; a known but
            // empty value produces no fragments at all.
            None => vec![String::new()],
            Some(value) => value
                .split(' ')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        },
    }
}

fn expand_tilde(fragment: &str, ctx: &ExpansionContext<'_>) -> String {
    let rest = &fragment[1..];
    let (login, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };

    if login.is_empty() {
        let home = (ctx.lookup_var)("HOME").or_else(|| {
            User::from_uid(Uid::current())
                .ok()
                .flatten()
                .map(|user| user.dir.display().to_string())
        });
        return match home {
            Some(home) => format!("{home}{path}"),
            None => fragment.to_string(),
        };
    }

    match User::from_name(login) {
        Ok(Some(user)) => format!("{}{}", user.dir.display(), path),
        // Unknown users leave the fragment untouched.
        _ => fragment.to_string(),
    }
}

pub fn is_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Matches a fragment against the filesystem. Only `*` and `?` act as
/// wildcards (brackets are escaped before the pattern compiles), wildcards
/// never cross `/`, and dotfiles require a literal leading dot. Unreadable
/// directories contribute nothing.
fn expand_globs(fragment: &str) -> Vec<String> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let pattern = escape_brackets(fragment);
    let Ok(paths) = glob_with(&pattern, options) else {
        return Vec::new();
    };
    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| path.display().to_string())
        .collect();
    matches.sort();
    matches
}

fn escape_brackets(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if ch == '[' {
            out.push_str("[[]");
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Token;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn ctx_with_vars(vars: &[(&str, &str)]) -> ExpansionContext<'static> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExpansionContext {
            lookup_var: Box::new(move |name| map.get(name).cloned()),
            last_status: 7,
            shell_pid: 4242,
        }
    }

    fn expand_one(text: &str, ctx: &ExpansionContext<'_>) -> Vec<String> {
        expand_arguments(&[Token::bare(text)], ctx)
    }

    #[test]
    fn variable_value_splits_on_spaces() {
        let ctx = ctx_with_vars(&[("FOO", "a b c")]);
        assert_eq!(expand_one("$FOO", &ctx), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_variable_expands_to_one_empty_fragment() {
        let ctx = ctx_with_vars(&[]);
        assert_eq!(expand_one("$NOPE", &ctx), vec![String::new()]);
    }

    #[test]
    fn empty_variable_value_vanishes() {
        let ctx = ctx_with_vars(&[("EMPTY", "")]);
        assert!(expand_one("$EMPTY", &ctx).is_empty());
    }

    #[test]
    fn special_parameters_use_shell_state() {
        let ctx = ctx_with_vars(&[]);
        assert_eq!(expand_one("$?", &ctx), vec!["7"]);
        assert_eq!(expand_one("$$", &ctx), vec!["4242"]);
    }

    #[test]
    fn tilde_uses_home_variable() {
        let ctx = ctx_with_vars(&[("HOME", "/home/alice")]);
        assert_eq!(expand_one("~", &ctx), vec!["/home/alice"]);
        assert_eq!(expand_one("~/src", &ctx), vec!["/home/alice/src"]);
    }

    #[test]
    fn tilde_unknown_user_stays_literal() {
        let ctx = ctx_with_vars(&[("HOME", "/home/alice")]);
        assert_eq!(
            expand_one("~no_such_user_here/x", &ctx),
            vec!["~no_such_user_here/x"]
        );
    }

    #[test]
    fn glob_matches_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.rs"), "").unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();

        let ctx = ctx_with_vars(&[]);
        let pattern = format!("{}/*.rs", dir.path().display());
        let expanded = expand_one(&pattern, &ctx);
        assert_eq!(
            expanded,
            vec![
                dir.path().join("a.rs").display().to_string(),
                dir.path().join("b.rs").display().to_string(),
            ]
        );
    }

    #[test]
    fn glob_without_match_keeps_pattern() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_vars(&[]);
        let pattern = format!("{}/*.nomatch", dir.path().display());
        assert_eq!(expand_one(&pattern, &ctx), vec![pattern]);
    }

    #[test]
    fn glob_skips_dotfiles_unless_requested() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::write(dir.path().join("shown"), "").unwrap();

        let ctx = ctx_with_vars(&[]);
        let all = expand_one(&format!("{}/*", dir.path().display()), &ctx);
        assert_eq!(all, vec![dir.path().join("shown").display().to_string()]);

        let dotted = expand_one(&format!("{}/.*", dir.path().display()), &ctx);
        assert!(dotted.contains(&dir.path().join(".hidden").display().to_string()));
    }

    #[test]
    fn brackets_are_not_wildcards() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a[1]"), "").unwrap();
        let ctx = ctx_with_vars(&[]);
        let pattern = format!("{}/a[?]", dir.path().display());
        assert_eq!(
            expand_one(&pattern, &ctx),
            vec![dir.path().join("a[1]").display().to_string()]
        );
    }

    #[test]
    fn comments_are_dropped() {
        let ctx = ctx_with_vars(&[]);
        let args = [
            Token::bare("echo"),
            Token {
                kind: TokenKind::Comment,
                text: "ignored".to_string(),
            },
        ];
        assert_eq!(expand_arguments(&args, &ctx), vec!["echo"]);
    }

    proptest! {
        #[test]
        fn is_glob_detects_wildcards(prefix in "[a-z./]{0,12}", suffix in "[a-z./]{0,12}",
                                     wildcard in prop_oneof![Just('*'), Just('?')]) {
            let mut input = prefix;
            input.push(wildcard);
            input.push_str(&suffix);
            prop_assert!(is_glob(&input));
        }

        #[test]
        fn plain_words_are_not_globs(s in "[a-zA-Z0-9._/-]{0,24}") {
            prop_assert!(!is_glob(&s));
        }
    }
}
