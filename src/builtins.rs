//! Built-in commands. They run inside the shell process and report an
//! integer exit code, never an error.

mod dir_cmds;
mod env_cmds;
mod job_cmds;

use std::time::Instant;

use rustyline::history::{History, SearchDirection};

use crate::execution::{run_line, LineOutcome};
use crate::repl::ShellState;

use dir_cmds::{builtin_cd, builtin_cdh, builtin_dirs, builtin_popd, builtin_pushd, builtin_pwd};
use env_cmds::{builtin_export, builtin_umask, builtin_unset};
use job_cmds::{builtin_bg, builtin_disown, builtin_exit, builtin_fg, builtin_jobs};

/// Also fed to the executable-name cache so completion offers built-ins.
pub const BUILTIN_NAMES: &[&str] = &[
    "bg", "cd", "cdh", "dirs", "disown", "exit", "export", "fg", "history", "jobs", "popd",
    "pushd", "pwd", "time", "umask", "unset",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub fn run(state: &mut ShellState, argv: &[String]) -> i32 {
    match argv[0].as_str() {
        "bg" => builtin_bg(state, argv),
        "cd" => builtin_cd(state, argv),
        "cdh" => builtin_cdh(state, argv),
        "dirs" => builtin_dirs(state, argv),
        "disown" => builtin_disown(state, argv),
        "exit" => builtin_exit(state),
        "export" => builtin_export(state, argv),
        "fg" => builtin_fg(state, argv),
        "history" => builtin_history(state),
        "jobs" => builtin_jobs(state, argv),
        "popd" => builtin_popd(state, argv),
        "pushd" => builtin_pushd(state, argv),
        "pwd" => builtin_pwd(),
        "time" => builtin_time(state, argv),
        "umask" => builtin_umask(argv),
        "unset" => builtin_unset(argv),
        _ => 1,
    }
}

fn builtin_history(state: &ShellState) -> i32 {
    let history = state.editor.history();
    for index in 0..history.len() {
        if let Ok(Some(result)) = history.get(index, SearchDirection::Forward) {
            println!("{index:6}  {}", result.entry);
        }
    }
    0
}

/// Re-enters the runner with the remaining arguments as a command line and
/// reports the elapsed wall-clock time. The nested run captures and
/// restores its own termios state.
fn builtin_time(state: &mut ShellState, argv: &[String]) -> i32 {
    if argv.len() < 2 {
        eprintln!("time: no command given");
        return 1;
    }
    let command_line = argv[1..].join(" ");
    let started = Instant::now();
    let code = match run_line(state, &command_line) {
        LineOutcome::Code(code) => code,
        LineOutcome::Continuation(_) => {
            println!("Shell: Incomplete command: {command_line}");
            1
        }
    };
    println!("Time: {} ms", started.elapsed().as_millis());
    code
}
