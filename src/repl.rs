//! Shell state and the read-eval loop.
//!
//! One `run_once` call reads a physical line, runs it, and applies the
//! queued job events once execution is quiescent. Incomplete lines
//! accumulate in `line_builder` until the parser stops asking for more.

use std::collections::VecDeque;
use std::env;
use std::io::{self, BufRead};
use std::os::fd::BorrowedFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use nix::sys::termios::{tcgetattr, Termios};
use nix::unistd::{gethostname, Uid, User};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use crate::completion::{cache_executables, LineHelper};
use crate::execution::{run_line, LineOutcome};
use crate::job_control::{dispatch_events, reap_background_jobs, JobRegistry, ShellEvent};
use crate::parse::ContinuationRequest;
use crate::prompt::render_prompt;

pub struct ShellState {
    pub editor: Editor<LineHelper, DefaultHistory>,
    pub interactive: bool,
    pub shell_pgid: i32,
    pub uid: u32,
    pub username: String,
    pub hostname: String,
    pub home: PathBuf,
    /// Termios captured at startup; children reset to this before exec.
    pub default_termios: Option<Termios>,
    pub jobs: JobRegistry,
    pub events: VecDeque<ShellEvent>,
    pub sigchld_flag: Arc<AtomicBool>,
    pub last_status: i32,
    /// Armed by a first `exit` while jobs are alive; any other command
    /// disarms it.
    pub pending_exit: bool,
    pub continuation: ContinuationRequest,
    pub line_builder: String,
    pub directory_stack: Vec<String>,
    pub cd_history: VecDeque<String>,
    pub cached_path: Vec<String>,
}

pub fn init_state(interactive: bool, shell_pgid: i32) -> io::Result<ShellState> {
    let config = Config::builder().auto_add_history(false).build();
    let mut editor = Editor::with_config(config).map_err(io::Error::other)?;
    editor.set_helper(Some(LineHelper::new()));

    let uid = Uid::current();
    let (username, home) = match User::from_uid(uid) {
        Ok(Some(user)) => {
            env::set_var("HOME", &user.dir);
            (user.name, user.dir)
        }
        _ => (
            String::from("unknown"),
            env::var("HOME").map(PathBuf::from).unwrap_or_default(),
        ),
    };
    let hostname = gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cwd = env::current_dir().unwrap_or_else(|_| "/".into());
    env::set_var("PWD", &cwd);

    let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
    let default_termios = tcgetattr(stdin).ok();

    let mut state = ShellState {
        editor,
        interactive,
        shell_pgid,
        uid: uid.as_raw(),
        username,
        hostname,
        home,
        default_termios,
        jobs: JobRegistry::new(),
        events: VecDeque::new(),
        sigchld_flag: Arc::new(AtomicBool::new(false)),
        last_status: 0,
        pending_exit: false,
        continuation: ContinuationRequest::Nothing,
        line_builder: String::new(),
        directory_stack: vec![cwd.display().to_string()],
        cd_history: VecDeque::new(),
        cached_path: cache_executables(),
    };
    let _ = state.editor.load_history(&history_path(&state.home));
    debug!(
        "repl event=init interactive={} pgid={} commands={}",
        interactive,
        shell_pgid,
        state.cached_path.len()
    );
    Ok(state)
}

fn history_path(home: &std::path::Path) -> PathBuf {
    home.join(".history")
}

pub fn save_history(state: &mut ShellState) {
    let path = history_path(&state.home);
    if let Err(err) = state.editor.save_history(&path) {
        debug!("repl event=save-history error={}", err);
    }
}

enum ReadOutcome {
    Line(String),
    Eof,
    Interrupted,
}

fn read_input_line(state: &mut ShellState, prompt: &str) -> io::Result<ReadOutcome> {
    if state.interactive {
        match state.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(io::Error::other(err)),
        }
    } else {
        let mut line = String::new();
        let bytes = io::stdin().lock().read_line(&mut line)?;
        if bytes == 0 {
            return Ok(ReadOutcome::Eof);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(ReadOutcome::Line(line))
    }
}

pub fn run_once(state: &mut ShellState) -> io::Result<()> {
    if state.sigchld_flag.swap(false, Ordering::SeqCst) {
        reap_background_jobs(&mut state.jobs);
    }
    if state.interactive {
        let commands = state.cached_path.clone();
        if let Some(helper) = state.editor.helper_mut() {
            helper.set_commands(commands);
        }
    }

    let prompt = render_prompt(state);
    match read_input_line(state, &prompt)? {
        ReadOutcome::Interrupted => {
            state.line_builder.clear();
            state.continuation = ContinuationRequest::Nothing;
        }
        ReadOutcome::Eof => {
            if state.interactive {
                println!();
            }
            // End of input behaves like typing `exit`, two-step protection
            // included. With the flag already armed this does not return.
            if state.continuation == ContinuationRequest::Nothing {
                state.line_builder.clear();
                if let LineOutcome::Code(code) = run_line(state, "exit") {
                    state.last_status = code;
                }
                dispatch_events(&mut state.jobs, &mut state.events);
            } else {
                state.continuation = ContinuationRequest::Nothing;
                state.line_builder.clear();
            }
        }
        ReadOutcome::Line(line) => {
            if line.trim().is_empty() && state.line_builder.is_empty() {
                state.last_status = 0;
                return Ok(());
            }
            if !state.line_builder.is_empty() {
                state.line_builder.push('\n');
            }
            state.line_builder.push_str(&line);

            let full_line = state.line_builder.clone();
            match run_line(state, &full_line) {
                LineOutcome::Continuation(request) => {
                    state.continuation = request;
                }
                LineOutcome::Code(code) => {
                    state.last_status = code;
                    state.continuation = ContinuationRequest::Nothing;
                    state.line_builder.clear();
                    if state.interactive {
                        let _ = state.editor.add_history_entry(full_line.as_str());
                    }
                }
            }
            dispatch_events(&mut state.jobs, &mut state.events);
        }
    }
    Ok(())
}
