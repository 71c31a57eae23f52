//! Turns an `AsyncRead` (a child's stdout or stderr) into a stream of
//! complete lines delivered over a channel, the way a CLI agent's
//! newline-delimited JSON output needs to be consumed.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Spawn a background task that reads `reader` line by line and forwards
/// each line (without its trailing newline) on the returned receiver.
/// The task exits, dropping the sender, once the reader hits EOF or
/// errors.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "line reader stopped on error");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn yields_each_line() {
        let data = Cursor::new(b"one\ntwo\nthree\n".to_vec());
        let mut rx = spawn_line_reader(data);
        let mut collected = Vec::new();
        while let Some(line) = rx.recv().await {
            collected.push(line);
        }
        assert_eq!(collected, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn tolerates_missing_trailing_newline() {
        let data = Cursor::new(b"only".to_vec());
        let mut rx = spawn_line_reader(data);
        assert_eq!(rx.recv().await, Some("only".to_string()));
        assert_eq!(rx.recv().await, None);
    }
}
