//! Top-level command execution: drives planning, spawning and waiting for
//! one input line at a time.

use log::debug;
use nix::unistd::Pid;

use crate::builtins;
use crate::expansion::{expand_arguments, ExpansionContext};
use crate::job_control::{
    wait_for_pid, Job, SignalMaskGuard, SpawnedProcess, TerminalGuard, TermiosGuard,
};
use crate::parse::{is_complete, parse_line, Command, ContinuationRequest};
use crate::repl::ShellState;

mod fds;
mod planner;
mod spawning;

pub use fds::FdCollector;
pub use planner::{plan_rewirings, Rewiring};
pub use spawning::spawn_subcommand;

/// What one input line produced: an exit code, or a request for more input.
pub enum LineOutcome {
    Code(i32),
    Continuation(ContinuationRequest),
}

/// Runs a complete input line: parse, check completeness, then execute each
/// command with short-circuit handling. The terminal foreground group and
/// termios settings present on entry are restored on every exit path.
pub fn run_line(state: &mut ShellState, input: &str) -> LineOutcome {
    if input.is_empty() || input.starts_with('#') {
        return LineOutcome::Code(0);
    }

    let commands = parse_line(input);
    if commands.is_empty() {
        return LineOutcome::Code(0);
    }

    match is_complete(&commands) {
        ContinuationRequest::Nothing => {}
        request => return LineOutcome::Continuation(request),
    }

    // Guards drop in reverse order: foreground is reclaimed first, then the
    // termios captured here is reinstated.
    let _termios = TermiosGuard::new();
    let _foreground = TerminalGuard::new(state.shell_pgid);

    let mut return_value = 0;
    let mut fail_short_circuits = false;
    let mut ran_exit = false;

    for command in &commands {
        if fail_short_circuits {
            if command.short_circuit_on_failure {
                continue;
            }
            // End of a short-circuit chain: skip this command too, but let
            // anything after it run.
            fail_short_circuits = false;
            continue;
        }

        if command.subcommands.is_empty() {
            continue;
        }

        run_pipeline(state, command, &mut return_value, &mut ran_exit);

        if command.short_circuit_on_failure && return_value != 0 {
            fail_short_circuits = true;
        }
    }

    if !ran_exit {
        state.pending_exit = false;
    }

    LineOutcome::Code(return_value)
}

fn run_pipeline(
    state: &mut ShellState,
    command: &Command,
    return_value: &mut i32,
    ran_exit: &mut bool,
) {
    let mut fds = FdCollector::new();
    let plans = match plan_rewirings(&command.subcommands, &mut fds) {
        Ok(plans) => plans,
        Err(err) => {
            eprintln!("Shell: {err}");
            *return_value = 1;
            return;
        }
    };

    let ctx = ExpansionContext::from_environment(state.last_status);
    let mut children: Vec<SpawnedProcess> = Vec::new();
    let mut pipeline_pgid: Option<Pid> = None;
    let mut spawn_failed = false;
    // Hold SIGINT/SIGCHLD until every child is in its process group.
    let handoff = SignalMaskGuard::new().ok();

    for (i, subcommand) in command.subcommands.iter().enumerate() {
        let argv = expand_arguments(&subcommand.args, &ctx);
        if argv.is_empty() {
            continue;
        }

        if builtins::is_builtin(&argv[0]) {
            // Built-ins run in the shell process and preempt the rest of
            // the pipeline.
            if argv[0] == "exit" {
                *ran_exit = true;
            }
            drop(handoff);
            *return_value = builtins::run(state, &argv);
            return;
        }

        match spawn_subcommand(
            &argv,
            &plans[i],
            &fds,
            pipeline_pgid,
            !command.in_background,
            state.default_termios.as_ref(),
        ) {
            Ok(process) => {
                let pgid = *pipeline_pgid.get_or_insert(process.pid);
                let job_id = state.jobs.find_last_job_id() + 1;
                debug!(
                    "job event=spawn id={} pid={} pgid={} cmd={}",
                    job_id, process.pid, pgid, argv[0]
                );
                state
                    .jobs
                    .insert(Job::new(job_id, process.pid, pgid, argv.join(" ")));
                children.push(process);
            }
            Err(err) => {
                eprintln!("Shell: fork: {err}");
                spawn_failed = true;
                break;
            }
        }
    }

    // Parent-side pipe ends and redirection fds are no longer needed once
    // every child holds its copies.
    fds.collect();
    drop(handoff);

    if command.in_background {
        for child in &children {
            state.jobs.set_running_in_background(child.pid, true);
        }
        if spawn_failed {
            *return_value = 1;
        }
        return;
    }

    for child in &children {
        debug!("job event=wait pid={} name={}", child.pid, child.name);
        wait_for_pid(&mut state.jobs, &mut state.events, child, return_value);
    }

    if spawn_failed {
        *return_value = 1;
    }
}
