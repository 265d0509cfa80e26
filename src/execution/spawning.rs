//! fork/exec of one pipeline subcommand.
//!
//! The child joins the pipeline's process group (creating it when it is the
//! leader), takes the terminal for foreground pipelines, applies the
//! planner's rewirings, sheds every collector-tracked fd and execs. Nothing
//! in the child path returns: every failure ends in `_exit(126)`.

use std::ffi::CString;
use std::io::{self, Read};
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::sys::termios::{tcsetattr, SetArg, Termios};
use nix::unistd::{dup2, execvp, fork, getpid, setpgid, tcsetpgrp, ForkResult, Pid};

use super::fds::FdCollector;
use super::planner::Rewiring;
use crate::job_control::SpawnedProcess;
use crate::signals::reset_child_signals;

pub fn spawn_subcommand(
    argv: &[String],
    rewirings: &[Rewiring],
    fds: &FdCollector,
    pipeline_pgid: Option<Pid>,
    take_terminal: bool,
    default_termios: Option<&Termios>,
) -> io::Result<SpawnedProcess> {
    let c_argv: Vec<CString> = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "argument contains NUL byte"))?;

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            // Mirror the child's setpgid so the group exists no matter which
            // side runs first.
            let pgid = pipeline_pgid.unwrap_or(child);
            let _ = setpgid(child, pgid);
            Ok(SpawnedProcess {
                name: argv[0].clone(),
                pid: child,
            })
        }
        Ok(ForkResult::Child) => exec_child(
            &c_argv,
            rewirings,
            fds,
            pipeline_pgid,
            take_terminal,
            default_termios,
        ),
        Err(err) => Err(io::Error::from(err)),
    }
}

fn exec_child(
    c_argv: &[CString],
    rewirings: &[Rewiring],
    fds: &FdCollector,
    pipeline_pgid: Option<Pid>,
    take_terminal: bool,
    default_termios: Option<&Termios>,
) -> ! {
    let _ = reset_child_signals();

    // The leader creates the group; followers join it.
    let pgid = pipeline_pgid.unwrap_or(Pid::from_raw(0));
    let _ = setpgid(Pid::from_raw(0), pgid);

    if take_terminal && pipeline_pgid.is_none() {
        let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
        let _ = tcsetpgrp(stdin, getpid());
        // A previous foreground job may have left the terminal in a raw
        // state; children start from the shell's startup settings.
        if let Some(termios) = default_termios {
            let _ = tcsetattr(stdin, SetArg::TCSANOW, termios);
        }
    }

    for rewiring in rewirings {
        if let Err(err) = dup2(rewiring.src, rewiring.fd) {
            eprintln!("Shell: dup2({}, {}): {}", rewiring.src, rewiring.fd, err);
            unsafe { libc::_exit(126) }
        }
    }

    fds.close_all_in_child();

    let err = match execvp(&c_argv[0], c_argv) {
        Err(err) => err,
        Ok(infallible) => match infallible {},
    };
    report_exec_error(&c_argv[0].to_string_lossy(), err);
    unsafe { libc::_exit(126) }
}

fn report_exec_error(cmd: &str, err: Errno) {
    if err == Errno::ENOENT {
        match read_shebang(cmd) {
            Some(interpreter) => eprintln!(
                "{cmd}: Invalid interpreter \"{interpreter}\": {}",
                Errno::ENOENT.desc()
            ),
            None => eprintln!("{cmd}: Command not found."),
        }
        return;
    }
    if let Ok(metadata) = std::fs::metadata(cmd) {
        if metadata.is_dir() {
            eprintln!("Shell: {cmd}: Is a directory");
            return;
        }
    }
    eprintln!("execvp({cmd}): {}", err.desc());
}

/// When exec fails with ENOENT the file itself may exist but name a missing
/// interpreter; the first 256 bytes tell which.
fn read_shebang(path: &str) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; 256];
    let count = file.read(&mut buf).ok()?;
    if count < 2 || &buf[..2] != b"#!" {
        return None;
    }
    let rest = &buf[2..count];
    let end = rest
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .unwrap_or(rest.len());
    Some(String::from_utf8_lossy(&rest[..end]).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn shebang_probe_reads_interpreter_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#!/no/such/interpreter -x").unwrap();
        writeln!(file, "echo body").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(
            read_shebang(&path).as_deref(),
            Some("/no/such/interpreter -x")
        );
    }

    #[test]
    fn shebang_probe_rejects_plain_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "just data").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(read_shebang(&path), None);
        assert_eq!(read_shebang("/definitely/not/there"), None);
    }
}
