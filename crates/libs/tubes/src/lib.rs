//! Delimiter-aware byte tubes over child processes and network connections.
//!
//! A [`Tube`] puts one read buffer and one buffered writer in front of any
//! byte stream and offers the same receive/send family whatever sits behind it:
//!
//! - [`Process`]: a spawned program, stdout and stderr merged into the input
//! - [`Remote`]: a TCP or UDP connection to `host:port`
//! - [`Tube::new`]: any other `AsyncRead + AsyncWrite` stream
//!
//! ```no_run
//! use tubes::Remote;
//!
//! # async fn demo() -> tubes::Result<()> {
//! let mut remote = Remote::connect("127.0.0.1", 31337, "tcp").await?;
//! remote.send_line_after("name: ", "guest").await?;
//! let banner = remote.recv_line(false).await?;
//! println!("{}", String::from_utf8_lossy(&banner));
//! remote.interactive().await?;
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod config;
pub mod error;
pub mod payload;
pub mod process;
pub mod remote;
pub mod tube;

pub use config::TubeConfig;
pub use error::{Result, TubeError};
pub use payload::Payload;
pub use process::{Process, Termination};
pub use remote::{Protocol, Remote};
pub use tube::{Closer, Detached, Tube};
