use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::Envelope;

#[derive(Debug)]
pub enum Event {
    Command(Envelope),
    Malformed(String),
}

/// Read newline-delimited JSON commands until the input closes.
pub async fn run_event_loop<R>(reader: R, tx: mpsc::UnboundedSender<Event>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(?err, "input stream failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => Event::Command(envelope),
            Err(err) => Event::Malformed(err.to_string()),
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}
