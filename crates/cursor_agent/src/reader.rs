use std::time::SystemTime;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::{AnnotatedEvent, RawEvent};

const READ_BUF_BYTES: usize = 64 * 1024;

/// Reads the agent's stdout line by line and emits [`AnnotatedEvent`]s on
/// `tx`, in receipt order.
///
/// The sender is dropped on EOF or cancellation, closing the channel and
/// signaling downstream completion. A fatal read error (not EOF, not
/// cancellation) is forwarded on `err_tx` before the channel closes.
/// Non-JSON lines (e.g. `T:`-prefixed banner noise) are logged and skipped.
///
/// Individual events (tool results in particular) can run past a megabyte;
/// the line buffer grows as needed.
pub async fn read_events<R>(
    reader: R,
    tx: mpsc::Sender<AnnotatedEvent>,
    err_tx: mpsc::Sender<std::io::Error>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_BUF_BYTES, reader);
    let mut buf: Vec<u8> = Vec::with_capacity(4096);

    loop {
        buf.clear();
        let n = tokio::select! {
            res = reader.read_until(b'\n', &mut buf) => match res {
                Ok(n) => n,
                Err(err) => {
                    if !cancel.is_cancelled() {
                        let _ = err_tx.try_send(err);
                    }
                    return;
                }
            },
            () = cancel.cancelled() => return,
        };
        if n == 0 {
            return; // EOF; dropping tx closes the channel
        }

        let recv_time = SystemTime::now();

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        if buf.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let line = match String::from_utf8(buf.clone()) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "skipping non-UTF-8 line");
                continue;
            }
        };

        let parsed: RawEvent = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                // Non-JSON line (e.g. "T: Named models unavailable").
                warn!(%line, error = %err, "skipping non-JSON line");
                continue;
            }
        };

        let ev = AnnotatedEvent {
            recv_time,
            raw: line,
            parsed,
        };

        tokio::select! {
            res = tx.send(ev) => {
                if res.is_err() {
                    return; // receiver gone
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}
