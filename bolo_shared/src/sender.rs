//! Outbound half of a connection.
//!
//! `NetworkSender` writes exactly one encoded command per call: frame,
//! flush. A connection's writer worker owns one sender and feeds it from an
//! ordered queue, so outbound order matches the order `send` was called in.
//! Encoding happens before queuing (`net::encode_command_frame`), so every
//! error seen here comes from the stream.

use tokio::io::AsyncWrite;

use crate::{error::NetError, net::write_frame};

pub struct NetworkSender<W> {
    writer: W,
    max_frame: usize,
}

impl<W: AsyncWrite + Unpin> NetworkSender<W> {
    pub fn new(writer: W, max_frame: usize) -> Self {
        Self { writer, max_frame }
    }

    /// Frames and flushes one encoded command.
    ///
    /// An error means the stream is unusable. The caller marks the
    /// connection dead; there is no retry.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        write_frame(&mut self.writer, payload, self.max_frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::net::{encode_command_frame, read_message, Message, MAX_FRAME_BYTES};
    use crate::world::EntityId;

    #[tokio::test]
    async fn each_send_is_one_flushed_frame() -> anyhow::Result<()> {
        let (a, mut b) = tokio::io::duplex(4096);
        let mut sender = NetworkSender::new(a, MAX_FRAME_BYTES);
        let cmd = Command::DestroyEntity {
            id: EntityId::new_random(),
        };

        sender.send(&encode_command_frame(&cmd, MAX_FRAME_BYTES)?).await?;
        let got = read_message(&mut b, MAX_FRAME_BYTES).await?;
        assert_eq!(got, Some(Message::Command(cmd)));
        Ok(())
    }

    #[tokio::test]
    async fn send_to_closed_peer_fails() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let mut sender = NetworkSender::new(a, MAX_FRAME_BYTES);
        let payload = encode_command_frame(&Command::chat("Alice", "anyone?"), MAX_FRAME_BYTES)
            .expect("short chat encodes");
        let result = sender.send(&payload).await;
        assert!(matches!(result, Err(NetError::Io(_))));
    }
}
