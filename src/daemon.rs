use nix::unistd::{fork, ForkResult};
use std::io;

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// Original process; should return immediately and let the copy run.
    Parent,
    /// Detached watcher process; carries on supervising.
    Child,
}

/// Fork the watcher itself into the background.
///
/// The parent gets `Detach::Parent` and is expected to exit right away,
/// leaving the forked copy to do the actual watching. No session or
/// process-group changes are made; the copy keeps the caller's stdio.
pub fn detach() -> io::Result<Detach> {
    // Safety: called before the tokio runtime exists, while the process
    // is still single-threaded.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => Ok(Detach::Parent),
        Ok(ForkResult::Child) => Ok(Detach::Child),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detach_forks_a_copy() {
        match detach().unwrap() {
            Detach::Parent => {}
            // The copy must not fall through into the test harness
            Detach::Child => std::process::exit(0),
        }
    }
}
