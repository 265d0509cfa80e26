//! Job registry, the wait/reap state machine and terminal-ownership guards.
//!
//! The registry is an insertion-ordered map from pid to job so `jobs` output
//! is reproducible while wait dispatch stays a direct lookup. All mutation
//! happens on the main loop: the spawner inserts, the waiter posts
//! `ChildExited` events that the loop drains once it is quiescent, and the
//! SIGCHLD flag triggers a non-blocking reap pass for background jobs.

use std::collections::VecDeque;
use std::io;
use std::os::fd::BorrowedFd;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, sigprocmask, SigSet, Signal, SigmaskHow};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{tcsetpgrp, Pid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
}

#[derive(Debug)]
pub struct Job {
    job_id: u64,
    pid: Pid,
    pgid: Pid,
    cmd: String,
    background: bool,
    active: bool,
    exit_state: ExitState,
}

impl Job {
    pub fn new(job_id: u64, pid: Pid, pgid: Pid, cmd: String) -> Self {
        Job {
            job_id,
            pid,
            pgid,
            cmd,
            background: false,
            active: true,
            exit_state: ExitState::Running,
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn exit_state(&self) -> ExitState {
        self.exit_state
    }

    pub fn is_running_in_background(&self) -> bool {
        self.background
    }

    pub fn set_running_in_background(&mut self, background: bool) {
        self.background = background;
    }

    pub fn set_exit(&mut self, code: i32) {
        self.exit_state = ExitState::Exited(code);
    }

    pub fn set_signaled(&mut self, signal: i32) {
        self.exit_state = ExitState::Signaled(signal);
    }

    pub fn set_stopped(&mut self, signal: i32) {
        self.exit_state = ExitState::Stopped(signal);
    }

    pub fn set_running(&mut self) {
        self.exit_state = ExitState::Running;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// A process handed to the waiter: the exec'd name plus its pid.
pub struct SpawnedProcess {
    pub name: String,
    pub pid: Pid,
}

#[derive(Debug, Clone, Copy)]
pub enum ShellEvent {
    ChildExited(Pid),
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: IndexMap<i32, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry::default()
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.pid.as_raw(), job);
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Job> {
        self.jobs.shift_remove(&pid.as_raw())
    }

    pub fn lookup(&self, pid: Pid) -> Option<&Job> {
        self.jobs.get(&pid.as_raw())
    }

    pub fn lookup_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.get_mut(&pid.as_raw())
    }

    pub fn lookup_by_job_id(&self, job_id: u64) -> Option<&Job> {
        self.jobs.values().find(|job| job.job_id == job_id)
    }

    pub fn lookup_by_job_id_mut(&mut self, job_id: u64) -> Option<&mut Job> {
        self.jobs.values_mut().find(|job| job.job_id == job_id)
    }

    /// Insertion order, for reproducible `jobs` listings.
    pub fn iter_in_order(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// The highest job id currently present, or 0 when empty. New jobs use
    /// `find_last_job_id() + 1` so ids never collide within a session.
    pub fn find_last_job_id(&self) -> u64 {
        self.jobs.values().map(|job| job.job_id).max().unwrap_or(0)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.jobs.values().map(|job| job.pid).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn set_running_in_background(&mut self, pid: Pid, background: bool) {
        if let Some(job) = self.lookup_mut(pid) {
            job.set_running_in_background(background);
        }
    }
}

/// Blocks on one child of a foreground pipeline and classifies the status.
/// `return_value` is overwritten on normal exit, so waiting on children in
/// pipeline order leaves the rightmost subcommand's code behind. Exit events
/// are queued rather than applied: the registry drops the entry only when
/// the main loop drains the queue.
pub fn wait_for_pid(
    jobs: &mut JobRegistry,
    events: &mut VecDeque<ShellEvent>,
    process: &SpawnedProcess,
    return_value: &mut i32,
) {
    loop {
        match waitpid(process.pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                if code != 0 {
                    debug!("job event=exit pid={} code={}", pid, code);
                }
                *return_value = code;
                if let Some(job) = jobs.lookup_mut(pid) {
                    job.set_exit(code);
                    events.push_back(ShellEvent::ChildExited(pid));
                }
                return;
            }
            Ok(WaitStatus::Stopped(pid, signal)) => {
                let job_id = jobs.lookup(pid).map(|job| job.job_id()).unwrap_or(0);
                eprintln!(
                    "Shell: [{job_id}] {}({}) {}",
                    process.name,
                    pid,
                    signal.as_str()
                );
                if let Some(job) = jobs.lookup_mut(pid) {
                    job.set_stopped(signal as i32);
                }
                continue;
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                let job_id = jobs.lookup(pid).map(|job| job.job_id()).unwrap_or(0);
                println!(
                    "Shell: [{job_id}] {}({}) exited due to signal '{}'",
                    process.name,
                    pid,
                    signal.as_str()
                );
                if let Some(job) = jobs.lookup_mut(pid) {
                    job.set_signaled(signal as i32);
                    events.push_back(ShellEvent::ChildExited(pid));
                }
                return;
            }
            Ok(WaitStatus::StillAlive) | Ok(WaitStatus::Continued(_)) => continue,
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return,
            Err(err) => {
                eprintln!("Shell: waitpid: {err}");
                return;
            }
        }
    }
}

/// Applies queued exit events: background exits get announced, and the job
/// leaves the registry.
pub fn dispatch_events(jobs: &mut JobRegistry, events: &mut VecDeque<ShellEvent>) {
    while let Some(event) = events.pop_front() {
        match event {
            ShellEvent::ChildExited(pid) => {
                if let Some(job) = jobs.lookup(pid) {
                    if job.is_running_in_background() {
                        eprintln!("Shell: Job {}({}) exited", pid, job.cmd());
                    }
                }
                jobs.remove(pid);
            }
        }
    }
}

/// Non-blocking reap of background jobs, run from the main loop whenever
/// SIGCHLD was observed. Stopped jobs are recorded but stay registered.
pub fn reap_background_jobs(jobs: &mut JobRegistry) {
    for pid in jobs.pids() {
        let Some(job) = jobs.lookup(pid) else { continue };
        if !job.is_running_in_background() {
            continue;
        }
        let cmd = job.cmd().to_string();
        match waitpid(
            pid,
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => {
                debug!("job event=reap pid={}", pid);
                eprintln!("Shell: Job {}({}) exited", pid, cmd);
                jobs.remove(pid);
            }
            Ok(WaitStatus::Stopped(_, signal)) => {
                if let Some(job) = jobs.lookup_mut(pid) {
                    job.set_stopped(signal as i32);
                }
            }
            Err(Errno::ECHILD) => {
                jobs.remove(pid);
            }
            _ => {}
        }
    }
}

/// Kill sequence for shell shutdown: wake anything that is not running in
/// the background, politely signal every group, give them ~10 ms, then
/// SIGKILL whatever is still around. ESRCH means the group already died.
pub fn stop_all_jobs(jobs: &mut JobRegistry) {
    if jobs.is_empty() {
        return;
    }
    println!("Killing active jobs");

    for job in jobs.iter_in_order() {
        if !job.is_active() {
            continue;
        }
        if !job.is_running_in_background() {
            if let Err(err) = killpg(job.pgid(), Signal::SIGCONT) {
                eprintln!("Shell: killpg(CONT): {err}");
            }
        }
        if let Err(err) = killpg(job.pgid(), Signal::SIGHUP) {
            eprintln!("Shell: killpg(HUP): {err}");
        }
        if let Err(err) = killpg(job.pgid(), Signal::SIGTERM) {
            eprintln!("Shell: killpg(TERM): {err}");
        }
    }

    thread::sleep(Duration::from_millis(10));

    for job in jobs.iter_in_order() {
        if !job.is_active() {
            continue;
        }
        match killpg(job.pgid(), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => eprintln!("Shell: killpg(KILL): {err}"),
        }
    }

    jobs.clear();
}

pub fn set_terminal_foreground(pgid: Pid) -> io::Result<()> {
    let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
    match tcsetpgrp(stdin, pgid) {
        Ok(()) | Err(Errno::ENOTTY) => Ok(()),
        Err(err) => Err(io::Error::from(err)),
    }
}

/// Blocks SIGINT and SIGCHLD for the process-group handoff window around
/// fork; the previous mask comes back on drop.
pub struct SignalMaskGuard {
    old: SigSet,
}

impl SignalMaskGuard {
    pub fn new() -> io::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        set.add(Signal::SIGCHLD);
        let mut old = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old))
            .map_err(io::Error::from)?;
        Ok(SignalMaskGuard { old })
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        if let Err(err) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.old), None) {
            warn!("signal event=restore-mask error={}", err);
        }
    }
}

/// Captures the termios active at construction and reinstates it on drop,
/// so settings a child changed (echo off, raw mode) never leak into the
/// shell. Captured per command, not per session: nested execution such as
/// `time` restores its caller's state.
pub struct TermiosGuard {
    saved: Option<Termios>,
}

impl TermiosGuard {
    pub fn new() -> Self {
        let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
        TermiosGuard {
            saved: tcgetattr(stdin).ok(),
        }
    }
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        if let Some(ref termios) = self.saved {
            let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
            if let Err(err) = tcsetattr(stdin, SetArg::TCSANOW, termios) {
                warn!("termios event=restore error={}", err);
            }
        }
    }
}

/// Hands the terminal foreground back to the shell's group on drop.
pub struct TerminalGuard {
    shell_pgid: Pid,
}

impl TerminalGuard {
    pub fn new(shell_pgid: i32) -> Self {
        TerminalGuard {
            shell_pgid: Pid::from_raw(shell_pgid),
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = set_terminal_foreground(self.shell_pgid) {
            warn!("tty event=restore error={}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{spawn_subcommand, FdCollector};

    fn spawn_shell_command(script: &str, pgid: Option<Pid>) -> SpawnedProcess {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ];
        let fds = FdCollector::new();
        spawn_subcommand(&argv, &[], &fds, pgid, false, None).expect("spawn")
    }

    fn registry_with(process: &SpawnedProcess, job_id: u64) -> JobRegistry {
        let mut jobs = JobRegistry::new();
        jobs.insert(Job::new(
            job_id,
            process.pid,
            process.pid,
            process.name.clone(),
        ));
        jobs
    }

    #[test]
    fn wait_collects_exit_status_and_queues_event() {
        let process = spawn_shell_command("exit 3", None);
        let mut jobs = registry_with(&process, 1);
        let mut events = VecDeque::new();
        let mut return_value = 0;

        wait_for_pid(&mut jobs, &mut events, &process, &mut return_value);
        assert_eq!(return_value, 3);
        assert_eq!(
            jobs.lookup(process.pid).unwrap().exit_state(),
            ExitState::Exited(3)
        );
        assert_eq!(events.len(), 1);

        dispatch_events(&mut jobs, &mut events);
        assert!(jobs.is_empty());
    }

    #[test]
    fn registry_ids_grow_past_removals() {
        let mut jobs = JobRegistry::new();
        assert_eq!(jobs.find_last_job_id(), 0);
        jobs.insert(Job::new(1, Pid::from_raw(100), Pid::from_raw(100), "a".into()));
        jobs.insert(Job::new(2, Pid::from_raw(200), Pid::from_raw(200), "b".into()));
        assert_eq!(jobs.find_last_job_id(), 2);

        jobs.remove(Pid::from_raw(200));
        assert_eq!(jobs.find_last_job_id(), 1);
        jobs.insert(Job::new(5, Pid::from_raw(300), Pid::from_raw(300), "c".into()));
        assert_eq!(jobs.find_last_job_id(), 5);
        assert!(jobs.lookup_by_job_id(5).is_some());
        assert!(jobs.lookup_by_job_id(2).is_none());
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut jobs = JobRegistry::new();
        jobs.insert(Job::new(1, Pid::from_raw(30), Pid::from_raw(30), "x".into()));
        jobs.insert(Job::new(2, Pid::from_raw(10), Pid::from_raw(10), "y".into()));
        jobs.insert(Job::new(3, Pid::from_raw(20), Pid::from_raw(20), "z".into()));
        let order: Vec<u64> = jobs.iter_in_order().map(|job| job.job_id()).collect();
        assert_eq!(order, vec![1, 2, 3]);

        jobs.remove(Pid::from_raw(10));
        let order: Vec<u64> = jobs.iter_in_order().map(|job| job.job_id()).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn pipeline_children_share_leader_pgid() {
        let leader = spawn_shell_command("sleep 1", None);
        let follower = spawn_shell_command("sleep 1", Some(leader.pid));

        let leader_pgid = nix::unistd::getpgid(Some(leader.pid)).unwrap();
        let follower_pgid = nix::unistd::getpgid(Some(follower.pid)).unwrap();
        assert_eq!(leader_pgid, leader.pid);
        assert_eq!(follower_pgid, leader.pid);

        let _ = killpg(leader.pid, Signal::SIGKILL);
        let mut jobs = registry_with(&leader, 1);
        let mut events = VecDeque::new();
        let mut status = 0;
        wait_for_pid(&mut jobs, &mut events, &leader, &mut status);
        wait_for_pid(&mut jobs, &mut events, &follower, &mut status);
    }

    #[test]
    fn reap_collects_exited_background_job() {
        let process = spawn_shell_command("exit 0", None);
        let mut jobs = registry_with(&process, 1);
        jobs.set_running_in_background(process.pid, true);

        // Give the child a moment to finish, then poll without blocking.
        for _ in 0..50 {
            reap_background_jobs(&mut jobs);
            if jobs.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(jobs.is_empty());
    }

    #[test]
    fn stop_all_jobs_terminates_running_children() {
        let process = spawn_shell_command("sleep 30", None);
        let mut jobs = registry_with(&process, 1);
        jobs.set_running_in_background(process.pid, true);

        stop_all_jobs(&mut jobs);
        assert!(jobs.is_empty());

        // The child must be collectable shortly after the SIGKILL pass.
        let mut reaped = false;
        for _ in 0..100 {
            match waitpid(process.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => thread::sleep(Duration::from_millis(5)),
                _ => {
                    reaped = true;
                    break;
                }
            }
        }
        assert!(reaped);
    }
}
