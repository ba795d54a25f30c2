//! Line-delimited frame encoding/decoding
//!
//! Wire format: `TYPE|param|param\n`, with escapes kept intact until
//! [`Message::decode`] splits the frame.
//! Maximum frame size: 64KB (sanity limit)

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::{Message, ESCAPE, FRAME_DELIMITER};

/// Maximum allowed frame size (64KB)
const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Read one frame from a stream, up to the first unescaped line-feed
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Message> {
    let mut frame = Vec::new();
    let mut escape = false;

    loop {
        let buf = reader.fill_buf().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ConnectionClosed
            } else {
                Error::Io(e)
            }
        })?;
        if buf.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        let mut consumed = 0;
        let mut complete = false;
        for &b in buf {
            consumed += 1;
            if !escape && b == FRAME_DELIMITER {
                complete = true;
                break;
            }
            escape = !escape && b == ESCAPE;
            frame.push(b);
        }
        reader.consume(consumed);

        // Sanity check
        if frame.len() > MAX_FRAME_SIZE {
            return Err(Error::Protocol(format!(
                "Frame too large: over {} bytes",
                MAX_FRAME_SIZE
            )));
        }
        if complete {
            return Message::decode(&frame);
        }
    }
}

/// Write a message as one frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = msg.encode();
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Message too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer.write_all(&payload).await?;

    // Flush to ensure delivery
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let msg = Message::nickname_set("line\nfeed|pipe");

        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();

        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_consecutive_frames() {
        let mut cursor = Cursor::new(b"KEEP_ALIVE\nROOM_CREATED|0042\nACK\n".to_vec());

        assert_eq!(
            read_frame(&mut cursor).await.unwrap().kind(),
            MessageType::KeepAlive
        );
        let created = read_frame(&mut cursor).await.unwrap();
        assert_eq!(created.kind(), MessageType::RoomCreated);
        assert_eq!(created.param(0), "0042");
        assert_eq!(
            read_frame(&mut cursor).await.unwrap().kind(),
            MessageType::Ack
        );
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_closed_connection() {
        let mut cursor = Cursor::new(b"TURN_RESULT|34".to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_garbled_frame_rejected() {
        let mut cursor = Cursor::new(b"NOT_A_TYPE\n".to_vec());
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut cursor = Cursor::new(vec![b'A'; MAX_FRAME_SIZE + 10]);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
