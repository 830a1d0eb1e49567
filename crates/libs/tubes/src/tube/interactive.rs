use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;

use super::{close_parts, write_through, Closer, Sink, Tube};
use crate::buffer::InputBuffer;
use crate::error::{Result, TubeError};

const SWITCH_NOTICE: &[u8] = b"Switching to interactive mode...\n";
const EOF_NOTICE: &[u8] = b"Got EOF while reading in interactive\n";

/// Error from one forwarding direction; `first` is set if it was the one that
/// cancelled the other.
struct Failure {
    first: bool,
    error: TubeError,
}

impl Failure {
    fn raise(cancel: &CancellationToken, error: impl Into<TubeError>) -> Self {
        let first = !cancel.is_cancelled();
        cancel.cancel();
        Self { first, error: error.into() }
    }
}

impl<C: Closer> Tube<C> {
    /// Forwards everything between the tube and this process's stdin/stdout
    /// until either side closes.
    pub async fn interactive(&mut self) -> Result<()> {
        self.interactive_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Same as [`Tube::interactive`] with an explicit terminal.
    ///
    /// Terminal input is forwarded line by line with the tube's newline. When
    /// the tube reaches end of stream, or either direction fails, the other
    /// direction stops at its next step and the tube is closed. Returns the
    /// first failure.
    pub async fn interactive_with<I, O>(&mut self, terminal_in: I, terminal_out: O) -> Result<()>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut terminal_out = terminal_out;
        write_flush(&mut terminal_out, SWITCH_NOTICE).await?;
        log::info!("tube: switching to interactive mode");

        let cancel = CancellationToken::new();
        let Self { input, output, newline, closer } = self;
        let (down, up) = tokio::join!(
            to_terminal(input, &mut terminal_out, &cancel),
            from_terminal(BufReader::new(terminal_in), output, closer, *newline, &cancel),
        );

        log::info!("tube: interactive mode finished");
        match (down, up) {
            (Err(down), Err(up)) => Err(if up.first { up.error } else { down.error }),
            (Err(failure), Ok(())) | (Ok(()), Err(failure)) => Err(failure.error),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

async fn to_terminal<O>(
    input: &mut InputBuffer,
    terminal: &mut O,
    cancel: &CancellationToken,
) -> Result<(), Failure>
where
    O: AsyncWrite + Unpin,
{
    loop {
        if !input.is_empty() {
            let pending = input.take_all();
            if let Err(err) = write_flush(terminal, &pending).await {
                return Err(Failure::raise(cancel, err));
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            filled = input.fill() => match filled {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => return Err(Failure::raise(cancel, err)),
            },
        }
    }

    if let Err(err) = write_flush(terminal, EOF_NOTICE).await {
        log::debug!("tube: couldn't print end of stream notice: {err}");
    }
    cancel.cancel();
    Ok(())
}

async fn from_terminal<I, C>(
    mut terminal: BufReader<I>,
    output: &mut BufWriter<Sink>,
    closer: &mut C,
    newline: u8,
    cancel: &CancellationToken,
) -> Result<(), Failure>
where
    I: AsyncRead + Unpin,
    C: Closer,
{
    // Kept across select iterations: read_until appends partial input here.
    let mut line = Vec::new();
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = terminal.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => return Err(Failure::raise(cancel, err)),
        }
        if cancel.is_cancelled() {
            break;
        }

        strip_line_end(&mut line);
        line.push(newline);
        if let Err(err) = write_through(output, &line).await {
            return Err(Failure::raise(cancel, err));
        }
        line.clear();
    }

    log::debug!("tube: closing after interactive input ended");
    close_parts(output, closer).await.map_err(|err| Failure::raise(cancel, err))
}

fn strip_line_end(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

async fn write_flush<O: AsyncWrite + Unpin>(out: &mut O, data: &[u8]) -> std::io::Result<()> {
    out.write_all(data).await?;
    out.flush().await
}
