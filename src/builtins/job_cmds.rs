//! Built-ins that operate on the job registry and the terminal.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgrp, getpid, setpgid};

use crate::job_control::{
    set_terminal_foreground, stop_all_jobs, wait_for_pid, SpawnedProcess,
};
use crate::repl::{save_history, ShellState};

enum JobsMode {
    Basic,
    OnlyPid,
    ListAll,
}

pub(super) fn builtin_jobs(state: &mut ShellState, args: &[String]) -> i32 {
    let mut list = false;
    let mut show_pid = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "-l" => list = true,
            "-p" => show_pid = true,
            _ => {
                eprintln!("jobs: unknown option: {arg}");
                return 1;
            }
        }
    }
    let mode = if list {
        JobsMode::ListAll
    } else if show_pid {
        JobsMode::OnlyPid
    } else {
        JobsMode::Basic
    };

    for job in state.jobs.iter_in_order() {
        let pid = job.pid();
        // A WNOHANG probe labels the job without blocking; the entry itself
        // stays registered either way.
        let status = match waitpid(pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::StillAlive) => "running",
            Ok(WaitStatus::Exited(_, _)) => "exited",
            Ok(WaitStatus::Stopped(_, _)) => "stopped",
            Ok(WaitStatus::Signaled(_, _, _)) => "signaled",
            Ok(_) => "running",
            Err(Errno::ECHILD) => "exited",
            Err(err) => {
                eprintln!("jobs: waitpid: {err}");
                return 1;
            }
        };
        let indicator = if job.is_running_in_background() {
            '+'
        } else {
            '-'
        };
        match mode {
            JobsMode::Basic => {
                println!("[{}] {} {} {}", job.job_id(), indicator, status, job.cmd());
            }
            JobsMode::OnlyPid => {
                println!(
                    "[{}] {} {} {} {}",
                    job.job_id(),
                    indicator,
                    pid,
                    status,
                    job.cmd()
                );
            }
            JobsMode::ListAll => {
                println!(
                    "[{}] {} {} {} {} {}",
                    job.job_id(),
                    indicator,
                    pid,
                    job.pgid(),
                    status,
                    job.cmd()
                );
            }
        }
    }
    0
}

fn select_job_id(state: &ShellState, args: &[String], name: &str) -> Option<u64> {
    match args.get(1) {
        Some(arg) => match arg.trim_start_matches('%').parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                eprintln!("{name}: job id must be a number");
                None
            }
        },
        None => {
            let last = state.jobs.find_last_job_id();
            if last == 0 {
                println!("{name}: no current job");
                None
            } else {
                Some(last)
            }
        }
    }
}

pub(super) fn builtin_fg(state: &mut ShellState, args: &[String]) -> i32 {
    let Some(job_id) = select_job_id(state, args, "fg") else {
        return 1;
    };
    let Some(job) = state.jobs.lookup_by_job_id_mut(job_id) else {
        println!("fg: job with id {job_id} not found");
        return 1;
    };
    job.set_running_in_background(false);
    job.set_running();
    let pid = job.pid();
    let pgid = job.pgid();
    let cmd = job.cmd().to_string();

    println!("Resuming job {job_id} - {cmd}");
    if let Err(err) = killpg(pgid, Signal::SIGCONT) {
        eprintln!("fg: killpg: {err}");
        return 1;
    }

    let shell_pgid = getpgrp();
    let _ = setpgid(pid, pgid);
    if let Err(err) = set_terminal_foreground(pgid) {
        eprintln!("fg: {err}");
        return 1;
    }

    let mut return_value = 0;
    let process = SpawnedProcess { name: cmd, pid };
    wait_for_pid(
        &mut state.jobs,
        &mut state.events,
        &process,
        &mut return_value,
    );

    let _ = setpgid(getpid(), shell_pgid);
    if let Err(err) = set_terminal_foreground(shell_pgid) {
        eprintln!("fg: {err}");
    }
    return_value
}

pub(super) fn builtin_bg(state: &mut ShellState, args: &[String]) -> i32 {
    let Some(job_id) = select_job_id(state, args, "bg") else {
        return 1;
    };
    let Some(job) = state.jobs.lookup_by_job_id_mut(job_id) else {
        println!("bg: job with id {job_id} not found");
        return 1;
    };
    job.set_running_in_background(true);
    job.set_running();
    println!("Resuming job {} - {}", job.job_id(), job.cmd());
    if let Err(err) = killpg(job.pgid(), Signal::SIGCONT) {
        eprintln!("bg: killpg: {err}");
        return 1;
    }
    0
}

pub(super) fn builtin_disown(state: &mut ShellState, args: &[String]) -> i32 {
    let mut job_ids: Vec<u64> = Vec::new();
    for arg in &args[1..] {
        match arg.trim_start_matches('%').parse::<u64>() {
            Ok(id) => job_ids.push(id),
            Err(_) => println!("Invalid job id: {arg}"),
        }
    }
    let had_args = args.len() > 1;

    if job_ids.is_empty() {
        if had_args {
            return 1;
        }
        let last = state.jobs.find_last_job_id();
        if last == 0 {
            println!("disown: no current job");
            return 1;
        }
        job_ids.push(last);
    }

    let mut pids = Vec::new();
    for id in &job_ids {
        match state.jobs.lookup_by_job_id(*id) {
            Some(job) => pids.push(job.pid()),
            None => println!("job with id {id} not found"),
        }
    }
    if pids.is_empty() {
        if !had_args {
            println!("disown: no current job");
        }
        return 1;
    }

    for pid in pids {
        if let Some(job) = state.jobs.lookup_mut(pid) {
            job.deactivate();
            if !job.is_running_in_background() {
                println!(
                    "disown warning: job {} is currently not running, 'kill -{} {}' to make it continue",
                    job.job_id(),
                    libc::SIGCONT,
                    job.pid()
                );
            }
        }
        state.jobs.remove(pid);
    }
    0
}

/// Two-step termination: a first `exit` with live jobs only arms the flag.
/// Any other command disarms it again.
pub(super) fn builtin_exit(state: &mut ShellState) -> i32 {
    if !state.jobs.is_empty() && !state.pending_exit {
        let count = state.jobs.len();
        println!(
            "Shell: You have {count} active job{}, run 'exit' again to really exit.",
            if count > 1 { "s" } else { "" }
        );
        state.pending_exit = true;
        return 1;
    }
    stop_all_jobs(&mut state.jobs);
    save_history(state);
    println!("Good-bye!");
    std::process::exit(0);
}
