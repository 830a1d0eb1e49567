use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::buffer::DEFAULT_READ_CHUNK;
use crate::error::Result;

/// Tunables shared by every tube, loadable from TOML:
///
/// ```toml
/// newline = 13
/// read_chunk = 8192
/// close_grace_ms = 250
/// echo_stderr = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TubeConfig {
    /// Line terminator used by the `*line*` operations.
    pub newline: u8,
    /// Upper bound on bytes requested from the transport per read.
    pub read_chunk: usize,
    /// How long a child may take to exit on close before it is killed.
    pub close_grace_ms: u64,
    /// Copy a child's stderr to our own stderr as it arrives.
    pub echo_stderr: bool,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            newline: b'\n',
            read_chunk: DEFAULT_READ_CHUNK,
            close_grace_ms: 1_000,
            echo_stderr: true,
        }
    }
}

impl TubeConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn with_newline(mut self, newline: u8) -> Self {
        self.newline = newline;
        self
    }

    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_echo_stderr(mut self, echo_stderr: bool) -> Self {
        self.echo_stderr = echo_stderr;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_line_oriented_tubes() {
        let config = TubeConfig::default();
        assert_eq!(config.newline, b'\n');
        assert_eq!(config.close_grace(), Duration::from_secs(1));
        assert!(config.echo_stderr);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TubeConfig::from_toml("newline = 13\necho_stderr = false\n").unwrap();
        assert_eq!(config.newline, b'\r');
        assert!(!config.echo_stderr);
        assert_eq!(config.read_chunk, DEFAULT_READ_CHUNK);
        assert_eq!(config.close_grace_ms, 1_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TubeConfig::from_toml("newlines = 10\n").unwrap_err();
        assert!(matches!(err, crate::TubeError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "close_grace_ms = 250").unwrap();
        writeln!(file, "read_chunk = 16").unwrap();

        let config = TubeConfig::from_path(file.path()).unwrap();
        assert_eq!(config.close_grace(), Duration::from_millis(250));
        assert_eq!(config.read_chunk, 16);
    }

    #[test]
    fn builders_override_fields() {
        let config = TubeConfig::default()
            .with_newline(0)
            .with_read_chunk(0)
            .with_close_grace(Duration::from_millis(50))
            .with_echo_stderr(false);
        assert_eq!(config.newline, 0);
        assert_eq!(config.read_chunk, 1);
        assert_eq!(config.close_grace_ms, 50);
        assert!(!config.echo_stderr);
    }
}
