//! Framed I/O over the headset socket.
//!
//! The protocol mixes text lines and fixed-size binary records on one byte
//! stream, so a single [`BufReader`] wraps the socket and serves both
//! `read_line` and `read_exact`; bytes the device sends ahead are never lost
//! between the two.  Writes pass straight through to the socket.
//!
//! Every read and write is bounded by the session's operational timeout, and
//! reply lines by [`MAX_REPLY_LINE`].

use std::future::Future;
use std::io;
use std::time::Duration;

use opi_core::{DeviceCommand, Reply};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time;
use tracing::{debug, warn};

use crate::application::opi::OpiError;

/// Longest reply line accepted from the device, newline included.
pub const MAX_REPLY_LINE: usize = 1024;

/// One established connection to the headset.
pub struct DeviceLink<S> {
    stream: BufReader<S>,
    io_timeout: Duration,
}

impl<S> DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            io_timeout,
        }
    }

    /// Writes one command line.
    pub async fn send(&mut self, command: &DeviceCommand) -> Result<(), OpiError> {
        debug!("-> {command}");
        let line = command.to_line();
        let stream = &mut self.stream;
        bounded(self.io_timeout, command.keyword(), async move {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
    }

    /// Writes raw payload bytes (image data).
    pub async fn write_payload(&mut self, bytes: &[u8]) -> Result<(), OpiError> {
        debug!("-> {} payload bytes", bytes.len());
        let stream = &mut self.stream;
        bounded(self.io_timeout, "payload upload", async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
    }

    /// Reads one text reply line of at most [`MAX_REPLY_LINE`] bytes.
    pub async fn read_reply(&mut self, operation: &'static str) -> Result<Reply, OpiError> {
        let mut line = String::new();
        let mut limited = (&mut self.stream).take(MAX_REPLY_LINE as u64);
        let n = bounded(self.io_timeout, operation, limited.read_line(&mut line)).await?;
        if n == 0 {
            return Err(OpiError::ConnectionClosed);
        }
        if n == MAX_REPLY_LINE && !line.ends_with('\n') {
            warn!("{operation}: reply line exceeds {MAX_REPLY_LINE} bytes");
            return Err(OpiError::ReplyTooLong {
                operation,
                limit: MAX_REPLY_LINE,
            });
        }
        let reply = Reply::parse(&line);
        debug!("<- {reply}");
        Ok(reply)
    }

    /// Reads one reply line and fails unless it is `wanted`.
    pub async fn expect(&mut self, command: &'static str, wanted: Reply) -> Result<(), OpiError> {
        let got = self.read_reply(command).await?;
        if got == wanted {
            return Ok(());
        }
        warn!("{command}: expected {wanted}, device replied {got}");
        Err(OpiError::UnexpectedReply {
            command,
            expected: wanted,
            got,
        })
    }

    /// Reads a fixed-size binary record.
    pub async fn read_record<const N: usize>(
        &mut self,
        operation: &'static str,
    ) -> Result<[u8; N], OpiError> {
        let mut buf = [0u8; N];
        bounded(self.io_timeout, operation, self.stream.read_exact(&mut buf)).await?;
        debug!("<- {N}-byte record for {operation}");
        Ok(buf)
    }

    /// Shuts down the write side of the socket.
    pub async fn shutdown(mut self) -> Result<(), OpiError> {
        bounded(self.io_timeout, "socket shutdown", self.stream.shutdown()).await
    }
}

/// Runs `op` under `limit`, mapping EOF to [`OpiError::ConnectionClosed`].
async fn bounded<T, F>(limit: Duration, operation: &'static str, op: F) -> Result<T, OpiError>
where
    F: Future<Output = io::Result<T>>,
{
    match time::timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(OpiError::ConnectionClosed),
        Ok(Err(e)) => Err(OpiError::Io(e)),
        Err(_) => Err(OpiError::Timeout {
            operation,
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_send_writes_command_line() {
        let mock = Builder::new().write(b"OPI_CLOSE\n").build();
        let mut link = DeviceLink::new(mock, LIMIT);

        link.send(&DeviceCommand::Close).await.expect("send");
    }

    #[tokio::test]
    async fn test_expect_accepts_matching_reply() {
        let mock = Builder::new().read(b"READY\n").build();
        let mut link = DeviceLink::new(mock, LIMIT);

        link.expect("OPI_IMAGE", Reply::Ready).await.expect("ready");
    }

    #[tokio::test]
    async fn test_expect_reports_other_reply() {
        // Arrange
        let mock = Builder::new().read(b"FULL\n").build();
        let mut link = DeviceLink::new(mock, LIMIT);

        // Act
        let result = link.expect("OPI_IMAGE", Reply::Ready).await;

        // Assert
        match result {
            Err(OpiError::UnexpectedReply { command, got, .. }) => {
                assert_eq!(command, "OPI_IMAGE");
                assert_eq!(got, Reply::Other("FULL".to_string()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_reply_on_eof_is_connection_closed() {
        let mock = Builder::new().build();
        let mut link = DeviceLink::new(mock, LIMIT);

        let result = link.read_reply("reply").await;

        assert!(matches!(result, Err(OpiError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_endless_reply_line_is_cut_off_at_limit() {
        // Arrange: more than the limit with no newline in sight
        let flood = vec![b'A'; MAX_REPLY_LINE * 2];
        let mock = Builder::new().read(&flood).build();
        let mut link = DeviceLink::new(mock, LIMIT);

        // Act
        let result = link.read_reply("OPI_IMAGE").await;

        // Assert
        assert!(matches!(
            result,
            Err(OpiError::ReplyTooLong {
                operation: "OPI_IMAGE",
                limit: MAX_REPLY_LINE,
            })
        ));
    }

    #[tokio::test]
    async fn test_reply_line_just_under_limit_is_accepted() {
        // Arrange: limit - 1 bytes of text plus the newline
        let mut line = vec![b'B'; MAX_REPLY_LINE - 1];
        line.push(b'\n');
        let mock = Builder::new().read(&line).build();
        let mut link = DeviceLink::new(mock, LIMIT);

        // Act
        let reply = link.read_reply("reply").await.expect("reply");

        // Assert
        assert!(matches!(reply, Reply::Other(text) if text.len() == MAX_REPLY_LINE - 1));
    }

    #[tokio::test]
    async fn test_read_record_spans_line_and_binary_data() {
        // Arrange: a text line and a binary record arrive in one segment
        let mock = Builder::new().read(b"OK\n\x01\x02\x03").build();
        let mut link = DeviceLink::new(mock, LIMIT);

        // Act
        link.expect("OPI_IMAGE", Reply::Ok).await.expect("ok");
        let record: [u8; 3] = link.read_record("record").await.expect("record");

        // Assert: the buffered bytes after the line were not dropped
        assert_eq!(record, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_record_on_short_stream_is_connection_closed() {
        let mock = Builder::new().read(&[1, 2]).build();
        let mut link = DeviceLink::new(mock, LIMIT);

        let result = link.read_record::<6>("present reply").await;

        assert!(matches!(result, Err(OpiError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        // Arrange: the device stays silent longer than the limit
        let mock = Builder::new().wait(Duration::from_secs(60)).build();
        let mut link = DeviceLink::new(mock, Duration::from_secs(1));

        // Act
        let result = link.read_reply("OPI_CLOSE").await;

        // Assert
        assert!(matches!(
            result,
            Err(OpiError::Timeout {
                operation: "OPI_CLOSE",
                ..
            })
        ));
    }
}
