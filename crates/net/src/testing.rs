//! Scripted server for session tests

use std::time::Duration;

use tokio::net::TcpListener;

use crate::protocol::{Message, MessageType};
use crate::transport::{FrameReader, Transport};

const STEP_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) struct FakeServer {
    listener: TcpListener,
    pub(crate) port: u16,
}

impl FakeServer {
    pub(crate) async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub(crate) async fn accept(&self) -> Peer {
        let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("no client connected")
            .unwrap();
        let (read, write) = stream.into_split();
        let (transport, reader) = Transport::from_parts("client", read, write);
        Peer { transport, reader }
    }
}

/// Server end of one client connection
pub(crate) struct Peer {
    transport: Transport,
    reader: FrameReader,
}

impl Peer {
    pub(crate) async fn send(&self, kind: MessageType, params: &[&str]) {
        let msg = Message::new(kind, params.iter().copied()).unwrap();
        self.transport.send_frame(&msg).await.unwrap();
    }

    /// Next frame from the client that is not a heartbeat
    pub(crate) async fn recv(&mut self) -> Message {
        loop {
            let msg = tokio::time::timeout(STEP_TIMEOUT, self.reader.receive_frame())
                .await
                .expect("client sent nothing")
                .unwrap();
            if msg.kind() != MessageType::KeepAlive {
                return msg;
            }
        }
    }

    /// WELCOME, then answer NICKNAME_SET with `reply`; returns the nickname
    pub(crate) async fn greet(&mut self, reply: MessageType, params: &[&str]) -> String {
        self.send(MessageType::Welcome, &["bship test server", "", "", ""])
            .await;
        let msg = self.recv().await;
        assert_eq!(msg.kind(), MessageType::NicknameSet);
        self.send(reply, params).await;
        msg.param(0).to_string()
    }
}
