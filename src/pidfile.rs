use std::io::Write;
use std::path::Path;

/// Write the watcher's own pid to `path`, decimal and newline-terminated.
///
/// Called before the child is spawned so whoever started the watcher can
/// address it (liveness resets, graceful termination) by pid.
pub fn write(path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_own_pid_newline_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");
        write(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");
        std::fs::write(&path, "stale\n").unwrap();
        write(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        assert!(write(Path::new("/nonexistent-dir/watcher.pid")).is_err());
    }
}
