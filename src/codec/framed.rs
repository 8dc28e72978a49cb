use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Reads and writes single frames over an async byte stream.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    role: Role,
    config: Config,
    validator: FrameValidator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Start with bytes already read past the handshake.
    #[must_use]
    pub fn with_buffered(io: T, role: Role, config: Config, buffered: BytesMut) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames);
        let mut read_buf = BytesMut::with_capacity(config.read_buffer_size.max(buffered.len()));
        read_buf.extend_from_slice(&buffered);
        Self {
            io,
            read_buf,
            write_buf: Vec::with_capacity(config.write_buffer_size),
            role,
            config,
            validator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next frame.
    ///
    /// The header is validated as soon as it is complete, so an oversized
    /// or wrongly masked frame is rejected before its payload is buffered.
    ///
    /// # Errors
    ///
    /// Validation errors from [`FrameValidator`] and [`Frame::validate`],
    /// `Error::ConnectionClosed(None)` on EOF, or `Error::Io`.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.validator.validate(&header)?;
                    match Frame::parse(&self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            frame.validate()?;
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.read_buf.reserve(self.config.read_buffer_size.max(1024));
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Write one frame, masking it when this side is a client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the stream fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.outgoing_mask();
        self.write_buf.clear();
        self.write_buf.reserve(frame.wire_size(mask.is_some()));
        frame.write(&mut self.write_buf, mask);
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Flush the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the stream fails.
    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the stream fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct MockStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockStream {
        fn new(data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(data),
                write_data: Vec::new(),
            }
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let pos = self.read_data.position() as usize;
            let data = self.read_data.get_ref();
            if pos >= data.len() {
                return Poll::Ready(Ok(()));
            }
            // Hand out a few bytes at a time to exercise partial reads.
            let to_copy = (data.len() - pos).min(buf.remaining()).min(3);
            buf.put_slice(&data[pos..pos + to_copy]);
            self.read_data.set_position((pos + to_copy) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_client_writes_masked_frames() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), Role::Client, Config::client());
        codec.write_frame(&Frame::text("Hi")).await.unwrap();

        let written = &codec.io.write_data;
        assert_eq!(written[0], 0x81);
        assert_eq!(written[1], 0x82);
        assert_eq!(written.len(), 8);

        let (frame, _) = Frame::parse(written).unwrap();
        assert_eq!(frame.payload(), b"Hi");
    }

    #[tokio::test]
    async fn test_server_writes_unmasked_frames() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), Role::Server, Config::server());
        codec.write_frame(&Frame::text("Hi")).await.unwrap();
        assert_eq!(codec.io.write_data, vec![0x81, 0x02, b'H', b'i']);
    }

    #[tokio::test]
    async fn test_client_reads_frames_across_partial_reads() {
        let mut data = vec![0x81, 0x05];
        data.extend_from_slice(b"Hello");
        data.extend_from_slice(&[0x82, 0x02, 0x01, 0x02]);

        let mut codec = WebSocketCodec::new(MockStream::new(data), Role::Client, Config::client());
        assert_eq!(codec.read_frame().await.unwrap().payload(), b"Hello");
        assert_eq!(codec.read_frame().await.unwrap().payload(), &[0x01, 0x02]);
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::ConnectionClosed(None))
        ));
    }

    #[tokio::test]
    async fn test_buffered_bytes_are_read_first() {
        let buffered = BytesMut::from(&[0x81, 0x02, b'o'][..]);
        let mut codec = WebSocketCodec::with_buffered(
            MockStream::new(vec![b'k']),
            Role::Client,
            Config::client(),
            buffered,
        );
        assert_eq!(codec.read_frame().await.unwrap().payload(), b"ok");
    }

    #[tokio::test]
    async fn test_server_reads_masked_frame() {
        let data = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut codec = WebSocketCodec::new(MockStream::new(data), Role::Server, Config::server());
        assert_eq!(codec.read_frame().await.unwrap().payload(), b"Hello");
    }

    #[tokio::test]
    async fn test_client_rejects_masked_frame() {
        let data = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut codec = WebSocketCodec::new(MockStream::new(data), Role::Client, Config::client());
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::MaskedServerFrame)
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_from_header() {
        // Header announces 300 bytes; no payload follows.
        let data = vec![0x82, 126, 0x01, 0x2c];
        let config = Config::client().with_limits(Limits::new(256, 1024, 4, 8192));
        let mut codec = WebSocketCodec::new(MockStream::new(data), Role::Client, config);
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::FrameTooLarge { size: 300, max: 256 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_control_frame_rejected() {
        let mut data = vec![0x89, 126, 0x00, 0x7e];
        data.extend_from_slice(&[0; 126]);
        let mut codec = WebSocketCodec::new(MockStream::new(data), Role::Client, Config::client());
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::ControlFrameTooLarge(126))
        ));
    }
}
