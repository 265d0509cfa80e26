//! Signal dispositions and session setup.
//!
//! The shell ignores the job-control signals so a `Ctrl-C` or `Ctrl-Z` only
//! reaches the foreground process group; forked children restore the
//! defaults before exec.

use std::io;

use log::debug;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{getpid, getpgrp, getsid, setpgid, setsid, Pid};

use crate::job_control::set_terminal_foreground;

const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTSTP,
    Signal::SIGQUIT,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

pub fn install_signal_handlers() -> io::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    for signal in JOB_CONTROL_SIGNALS {
        install_action(signal, &ignore)?;
    }
    debug!("signal event=install mode=ignore");
    Ok(())
}

/// Runs in the forked child before exec: children must see the default
/// dispositions, not the shell's.
pub fn reset_child_signals() -> io::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in JOB_CONTROL_SIGNALS {
        install_action(signal, &default)?;
    }
    Ok(())
}

/// Puts the shell into its own process group and makes that group the
/// terminal's foreground group. Scripted (non-interactive) runs get a fresh
/// session instead, when the kernel permits one.
pub fn init_session(interactive: bool) -> io::Result<i32> {
    let pid = getpid();
    if !interactive {
        if getsid(None).map_err(io::Error::from)? != pid {
            match setsid() {
                Ok(_) | Err(nix::errno::Errno::EPERM) => {}
                Err(err) => return Err(io::Error::from(err)),
            }
        }
    } else if getpgrp() != pid {
        setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(io::Error::from)?;
    }
    let pgid = getpgrp();
    set_terminal_foreground(pgid)?;
    debug!("signal event=session pgid={}", pgid);
    Ok(pgid.as_raw())
}

fn install_action(signal: Signal, action: &SigAction) -> io::Result<()> {
    unsafe { sigaction(signal, action) }
        .map(|_| ())
        .map_err(io::Error::from)
}
