//! Turns one command's redirections into per-subcommand fd rewirings.

use std::io;
use std::os::fd::{IntoRawFd, RawFd};

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::pipe;

use crate::parse::{RedirectionKind, Subcommand};

/// One dup2 to perform in the child: `src` is a live fd in the parent that
/// replaces `fd` before exec.
#[derive(Debug, Clone, Copy)]
pub struct Rewiring {
    pub fd: RawFd,
    pub src: RawFd,
}

use super::fds::FdCollector;

/// Builds the rewiring plan for every subcommand. All fds opened here are
/// registered with the collector, so an error on any pipe or open unwinds
/// without leaking: the caller drops the collector and no fork happens.
pub fn plan_rewirings(
    subcommands: &[Subcommand],
    fds: &mut FdCollector,
) -> io::Result<Vec<Vec<Rewiring>>> {
    let mut plans: Vec<Vec<Rewiring>> = vec![Vec::new(); subcommands.len()];

    for (i, subcommand) in subcommands.iter().enumerate() {
        for redirection in &subcommand.redirections {
            match redirection.kind {
                RedirectionKind::Pipe => {
                    if i + 1 >= subcommands.len() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "pipe has no downstream command",
                        ));
                    }
                    let (read_end, write_end) =
                        pipe().map_err(|err| io::Error::other(format!("pipe: {err}")))?;
                    let (read_end, write_end) =
                        (read_end.into_raw_fd(), write_end.into_raw_fd());
                    plans[i].push(Rewiring {
                        fd: libc::STDOUT_FILENO,
                        src: write_end,
                    });
                    plans[i + 1].push(Rewiring {
                        fd: libc::STDIN_FILENO,
                        src: read_end,
                    });
                    fds.add(read_end);
                    fds.add(write_end);
                }
                RedirectionKind::FileRead => {
                    let fd = open_redirection_target(redirection, OFlag::O_RDONLY)?;
                    fds.add(fd);
                    plans[i].push(Rewiring {
                        fd: redirection.fd,
                        src: fd,
                    });
                }
                RedirectionKind::FileWrite => {
                    let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
                    let fd = open_redirection_target(redirection, flags)?;
                    fds.add(fd);
                    plans[i].push(Rewiring {
                        fd: redirection.fd,
                        src: fd,
                    });
                }
                RedirectionKind::FileWriteAppend => {
                    let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND;
                    let fd = open_redirection_target(redirection, flags)?;
                    fds.add(fd);
                    plans[i].push(Rewiring {
                        fd: redirection.fd,
                        src: fd,
                    });
                }
            }
        }
    }

    Ok(plans)
}

fn open_redirection_target(
    redirection: &crate::parse::Redirection,
    flags: OFlag,
) -> io::Result<RawFd> {
    let path = redirection
        .path
        .as_ref()
        .map(|token| token.text.as_str())
        .unwrap_or("");
    open(path, flags, Mode::from_bits_truncate(0o666))
        .map_err(|err| io::Error::new(io::Error::from(err).kind(), format!("{path}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_line, Redirection, Token};
    use tempfile::tempdir;

    #[test]
    fn pipe_plan_connects_adjacent_subcommands() {
        let commands = parse_line("echo a | tr a b");
        let mut fds = FdCollector::new();
        let plans = plan_rewirings(&commands[0].subcommands, &mut fds).unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].len(), 1);
        assert_eq!(plans[0][0].fd, libc::STDOUT_FILENO);
        assert_eq!(plans[1].len(), 1);
        assert_eq!(plans[1][0].fd, libc::STDIN_FILENO);
        // Both pipe ends are owned by the collector.
        assert_eq!(fds.len(), 2);
    }

    #[test]
    fn file_write_creates_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let line = format!("echo hi > {}", path.display());
        let commands = parse_line(&line);
        let mut fds = FdCollector::new();
        let plans = plan_rewirings(&commands[0].subcommands, &mut fds).unwrap();

        assert_eq!(plans[0].len(), 1);
        assert_eq!(plans[0][0].fd, libc::STDOUT_FILENO);
        assert!(path.exists());
        assert_eq!(fds.len(), 1);
    }

    #[test]
    fn missing_read_target_aborts_plan() {
        let dir = tempdir().unwrap();
        let line = format!("cat < {}/no-such-file", dir.path().display());
        let commands = parse_line(&line);
        let mut fds = FdCollector::new();
        let err = plan_rewirings(&commands[0].subcommands, &mut fds).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn open_failure_after_pipe_leaves_fds_collectable() {
        let dir = tempdir().unwrap();
        let line = format!("echo a | cat < {}/absent", dir.path().display());
        let commands = parse_line(&line);
        let mut fds = FdCollector::new();
        assert!(plan_rewirings(&commands[0].subcommands, &mut fds).is_err());
        // The pipe created before the failed open is still tracked, so the
        // collector can unwind it.
        assert_eq!(fds.len(), 2);
        fds.collect();
    }

    #[test]
    fn dangling_pipe_is_rejected() {
        let subcommands = vec![Subcommand {
            args: vec![Token::bare("echo")],
            redirections: vec![Redirection {
                kind: RedirectionKind::Pipe,
                fd: libc::STDOUT_FILENO,
                path: None,
            }],
        }];
        let mut fds = FdCollector::new();
        assert!(plan_rewirings(&subcommands, &mut fds).is_err());
    }
}
