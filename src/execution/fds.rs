//! Scoped ownership of file descriptors created while a pipeline is set up.

use std::os::fd::RawFd;

use log::warn;
use nix::unistd::close;

/// Every fd acquired during planning is registered here. Pipe ends belong to
/// exactly one process after fork, so both the parent (after spawning) and
/// the child (before exec) shed everything they did not keep.
#[derive(Default)]
pub struct FdCollector {
    fds: Vec<RawFd>,
}

impl FdCollector {
    pub fn new() -> Self {
        FdCollector::default()
    }

    pub fn add(&mut self, fd: RawFd) {
        self.fds.push(fd);
    }

    /// Closes every tracked fd exactly once. Safe to call repeatedly; the
    /// set is emptied on the first call.
    pub fn collect(&mut self) {
        for fd in self.fds.drain(..) {
            if let Err(err) = close(fd) {
                warn!("fds event=close fd={} error={}", fd, err);
            }
        }
    }

    /// Closes the tracked fds without touching the set. Only meaningful in a
    /// forked child right before exec, where the parent's copy of the
    /// collector is unaffected.
    pub fn close_all_in_child(&self) {
        for &fd in &self.fds {
            let _ = close(fd);
        }
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}

impl Drop for FdCollector {
    fn drop(&mut self) {
        self.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::{fcntl, FcntlArg};
    use nix::unistd::pipe;
    use std::os::fd::IntoRawFd;

    fn fd_is_open(fd: RawFd) -> bool {
        fcntl(fd, FcntlArg::F_GETFD).is_ok()
    }

    #[test]
    fn collect_closes_every_tracked_fd() {
        let (r, w) = pipe().unwrap();
        let (r, w) = (r.into_raw_fd(), w.into_raw_fd());
        let mut fds = FdCollector::new();
        fds.add(r);
        fds.add(w);
        assert_eq!(fds.len(), 2);

        fds.collect();
        assert!(fds.is_empty());
        assert!(!fd_is_open(r));
        assert!(!fd_is_open(w));

        // Idempotent: a second collect has nothing left to close.
        fds.collect();
    }

    #[test]
    fn drop_closes_on_scope_exit() {
        let (r, w) = pipe().unwrap();
        let (r, w) = (r.into_raw_fd(), w.into_raw_fd());
        {
            let mut fds = FdCollector::new();
            fds.add(r);
            fds.add(w);
        }
        assert!(!fd_is_open(r));
        assert!(!fd_is_open(w));
    }
}
