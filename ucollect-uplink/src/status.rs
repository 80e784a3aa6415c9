//! Optional status-file writer: `status\ttimestamp\n`, written atomically
//! (write to a sibling temp file, then rename) so a reader never observes a
//! half-written line.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Offline,
    Connecting,
    Online,
    BadAuth,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Offline => "offline",
            Status::Connecting => "connecting",
            Status::Online => "online",
            Status::BadAuth => "bad-auth",
        }
    }
}

pub struct StatusWriter {
    path: Option<PathBuf>,
}

impl StatusWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        StatusWriter { path }
    }

    pub fn disabled() -> Self {
        StatusWriter { path: None }
    }

    /// Write the new status, atomically. A no-op if no path is configured.
    /// `now_unix` is the caller's current unix timestamp (kept as a
    /// parameter since this crate never reads the system clock itself).
    pub fn write(&self, status: Status, now_unix: i64) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp_path = sibling_tmp_path(path);
        let mut tmp = fs::File::create(&tmp_path)?;
        write!(tmp, "{}\t{}\n", status.as_str(), now_unix)?;
        tmp.flush()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writing_with_no_path_configured_is_a_no_op() {
        let writer = StatusWriter::disabled();
        assert!(writer.write(Status::Online, 1000).is_ok());
    }

    #[test]
    fn write_produces_the_expected_line_and_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("ucollect-status-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status");
        let writer = StatusWriter::new(Some(path.clone()));
        writer.write(Status::Connecting, 12345).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "connecting\t12345\n");
        assert!(!sibling_tmp_path(&path).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn a_second_write_overwrites_the_first() {
        let dir = std::env::temp_dir().join(format!("ucollect-status-test2-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status");
        let writer = StatusWriter::new(Some(path.clone()));
        writer.write(Status::Offline, 1).unwrap();
        writer.write(Status::Online, 2).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "online\t2\n");
        fs::remove_dir_all(&dir).ok();
    }
}
