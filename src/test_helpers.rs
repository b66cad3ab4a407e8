//! Test utilities for building temporary log directories that follow the
//! stream naming convention.

#[cfg(test)]
use std::fs::{File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};

#[cfg(test)]
pub struct TempLogDir {
    dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempLogDir {
    /// Create a new empty temporary log directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Directory being "watched" by the test.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create an empty stream file named by the convention.
    pub fn create_stream(&self, timestamp: &str, stream_id: &str) -> std::io::Result<PathBuf> {
        let path = self
            .dir
            .path()
            .join(format!("{timestamp}_{stream_id}.txt"));
        File::create(&path)?;
        Ok(path)
    }

    /// Append one line (plus terminator) to an existing stream file.
    pub fn append_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_stream_uses_naming_convention() {
        let dir = TempLogDir::new().unwrap();
        let path = dir.create_stream("01-01-24_10-00-00", "chat").unwrap();

        assert!(path.exists());
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "01-01-24_10-00-00_chat.txt"
        );
    }

    #[test]
    fn test_append_line_adds_terminator() {
        let dir = TempLogDir::new().unwrap();
        let path = dir.create_stream("01-01-24_10-00-00", "chat").unwrap();

        dir.append_line(&path, "line 1").unwrap();
        dir.append_line(&path, "line 2").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "line 1\nline 2\n");
    }
}
