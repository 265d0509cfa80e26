//! Prompt rendering, including `$PROMPT` template escapes and the
//! continuation prompts shown while a line is incomplete.

use std::env;

use crate::parse::ContinuationRequest;
use crate::repl::ShellState;

pub fn render_prompt(state: &ShellState) -> String {
    if !state.interactive {
        return String::new();
    }
    match state.continuation {
        ContinuationRequest::Pipe => continuation_prompt("pipe> "),
        ContinuationRequest::DoubleQuotedString => continuation_prompt("dquote> "),
        ContinuationRequest::SingleQuotedString => continuation_prompt("squote> "),
        ContinuationRequest::Nothing => build_prompt(state),
    }
}

fn continuation_prompt(text: &str) -> String {
    format!("\x1b[34m{text}\x1b[m")
}

fn build_prompt(state: &ShellState) -> String {
    let cwd = env::current_dir()
        .unwrap_or_else(|_| "/".into())
        .display()
        .to_string();

    if let Ok(template) = env::var("PROMPT") {
        return render_template(&template, state, &cwd);
    }

    if state.uid == 0 {
        return "# ".to_string();
    }
    format!(
        "\x1b]0;{user}@{host}:{cwd}\x07\
         \x1b[31;1m{user}\x1b[0m@\x1b[37;1m{host}\x1b[0m:\x1b[32;1m{cwd}\x1b[0m$> ",
        user = state.username,
        host = state.hostname,
        cwd = cwd,
    )
}

/// `$PROMPT` escapes: `\u` user, `\h` host, `\w` cwd with `~` contraction,
/// `\p` privilege sigil, `\a` bell, `\e` escape, `\X` title prefix.
fn render_template(template: &str, state: &ShellState, cwd: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            None => break,
            Some('X') => out.push_str("\x1b]0;"),
            Some('a') => out.push('\x07'),
            Some('e') => out.push('\x1b'),
            Some('u') => out.push_str(&state.username),
            Some('h') => out.push_str(&state.hostname),
            Some('w') => {
                let home = state.home.display().to_string();
                match cwd.strip_prefix(&home) {
                    Some(rest) if !home.is_empty() => {
                        out.push('~');
                        out.push_str(rest);
                    }
                    _ => out.push_str(cwd),
                }
            }
            Some('p') => out.push(if state.uid == 0 { '#' } else { '$' }),
            Some(other) => out.push(other),
        }
    }
    out
}
