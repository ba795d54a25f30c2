//! TCP transport
//!
//! A connection is split in two: the [`Transport`] write side, shared by
//! everyone who sends, and the [`FrameReader`], owned by the dispatcher.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of a connection
///
/// Cheap to clone. Frames from concurrent senders never interleave.
#[derive(Clone)]
pub struct Transport {
    writer: Arc<Mutex<BoxedWriter>>,
    peer: Arc<str>,
}

/// Read side of a connection
pub struct FrameReader {
    inner: BufReader<BoxedReader>,
}

impl Transport {
    /// Open a TCP connection, bounded by `connect_timeout`
    pub async fn open(
        address: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<(Transport, FrameReader)> {
        info!(address, port, "Connecting to server");

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| {
                Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out", address, port),
                ))
            })??;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Self::from_parts(
            format!("{}:{}", address, port),
            reader,
            writer,
        ))
    }

    /// Wrap an already established byte stream
    pub fn from_parts<R, W>(peer: impl Into<String>, reader: R, writer: W) -> (Transport, FrameReader)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer: String = peer.into();
        debug!(peer = %peer, "Transport ready");
        (
            Transport {
                writer: Arc::new(Mutex::new(Box::new(writer))),
                peer: peer.into(),
            },
            FrameReader {
                inner: BufReader::new(Box::new(reader)),
            },
        )
    }

    /// Send one message as a single frame
    pub async fn send_frame(&self, msg: &Message) -> Result<()> {
        trace!(peer = %self.peer, message = %msg, "Send");
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, msg).await
    }

    /// Close the write side; the reader sees end of stream shortly after
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl FrameReader {
    /// Wait for the next complete frame
    pub async fn receive_frame(&mut self) -> Result<Message> {
        read_frame(&mut self.inner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;

    #[tokio::test]
    async fn test_frames_cross_a_duplex_pipe() {
        let (near, far) = tokio::io::duplex(1024);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let (transport, _near_reader) = Transport::from_parts("near", near_read, near_write);
        let (_far_transport, mut far_reader) = Transport::from_parts("far", far_read, far_write);

        let sender = transport.clone();
        let task = tokio::spawn(async move {
            for _ in 0..3 {
                sender.send_frame(&Message::keep_alive()).await.unwrap();
            }
        });
        transport.send_frame(&Message::room_join("1234")).await.unwrap();
        task.await.unwrap();

        let mut kinds = Vec::new();
        for _ in 0..4 {
            kinds.push(far_reader.receive_frame().await.unwrap().kind());
        }
        assert_eq!(
            kinds.iter().filter(|k| **k == MessageType::KeepAlive).count(),
            3
        );
        assert!(kinds.contains(&MessageType::RoomJoin));
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Transport::open("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(e) if e.is_connection_error()));
    }

    #[tokio::test]
    async fn test_shutdown_ends_peer_stream() {
        let (near, far) = tokio::io::duplex(64);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let (transport, _near_reader) = Transport::from_parts("near", near_read, near_write);
        let (_far, mut far_reader) = Transport::from_parts("far", far_read, far_write);

        transport.shutdown().await;
        assert!(matches!(
            far_reader.receive_frame().await,
            Err(Error::ConnectionClosed)
        ));
    }
}
