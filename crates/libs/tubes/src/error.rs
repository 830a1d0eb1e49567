use std::time::Duration;

/// Errors returned by tube, process and remote operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TubeError {
    #[error("empty delimiter")]
    EmptyDelimiter,

    #[error("invalid protocol: {0:?} (expected one of: tcp, udp)")]
    InvalidProtocol(String),

    #[error("incomplete read: wanted {expected} bytes, stream ended after {received}")]
    IncompleteRead { expected: usize, received: usize },

    #[error("stream ended before delimiter ({buffered} bytes left buffered)")]
    UnexpectedEof { buffered: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("failed to dial {addr} over {protocol}: {source}")]
    Dial {
        addr: String,
        protocol: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl TubeError {
    /// Returns `true` when the error means the peer stopped sending.
    pub fn is_eof(&self) -> bool {
        match self {
            Self::IncompleteRead { .. } | Self::UnexpectedEof { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

pub type Result<T, E = TubeError> = std::result::Result<T, E>;
