use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::{Frame, OpCode};

/// A message-level WebSocket connection over an already upgraded stream.
///
/// Pings are answered with a pong as soon as they are read. A close frame
/// from the peer is echoed and moves the connection to `Closed`.
///
/// ```rust,ignore
/// let mut conn = Connection::new(stream, Role::Client, Config::client());
/// conn.send(Message::text("{\"controller\":\"server\",\"action\":\"now\"}")).await?;
/// while let Some(msg) = conn.recv().await? {
///     println!("{msg:?}");
/// }
/// conn.close(CloseCode::Normal, "done").await?;
/// ```
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
}

impl<T> Connection<T> {
    /// Wrap a stream whose handshake is already complete.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Like [`Connection::new`], with bytes read past the handshake head.
    pub fn with_buffered(io: T, role: Role, config: Config, buffered: BytesMut) -> Self {
        let assembler = MessageAssembler::new(config.limits.clone());
        Self {
            codec: WebSocketCodec::with_buffered(io, role, config, buffered),
            state: ConnectionState::Open,
            assembler,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether messages can be sent.
    pub fn is_open(&self) -> bool {
        self.state.can_send()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send one message as a single frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is not open
    /// - `Error::MessageTooLarge` if the payload exceeds the limits
    /// - `Error::Io` from the underlying stream
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        let frame = Frame::from(message);
        if !frame.opcode.is_control() {
            self.codec
                .config()
                .limits
                .check_message_size(frame.payload().len())?;
        }
        frame.validate()?;
        self.codec.write_frame(&frame).await?;
        self.codec.flush().await
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` once the connection is closed or the peer hung up.
    ///
    /// # Errors
    ///
    /// Protocol violations from the codec and assembler, or `Error::Io`.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }

        loop {
            let frame = match self.codec.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match frame.opcode {
                OpCode::Ping => {
                    if self.state.can_send() {
                        let pong = Frame::pong(frame.payload().to_vec());
                        self.codec.write_frame(&pong).await?;
                        self.codec.flush().await?;
                    }
                    return Ok(Some(Message::Ping(frame.into_payload())));
                }
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    let close_frame = CloseFrame::from_payload(frame.payload());
                    if self.state.peer_closed() {
                        let response = match &close_frame {
                            Some(cf) => Frame::close(Some(cf.code.as_u16()), &cf.reason),
                            None => Frame::close(None, ""),
                        };
                        // The peer may already be gone; the close still completes.
                        let _ = self.codec.write_frame(&response).await;
                        let _ = self.codec.flush().await;
                    }
                    return Ok(Some(Message::Close(close_frame)));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    /// Start the close handshake. A no-op unless the connection is open.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCloseCode` for reserved codes
    /// - `Error::Io` from the underlying stream
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if code.is_reserved() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        if !self.state.begin_close() {
            return Ok(());
        }

        let frame = Frame::close(Some(code.as_u16()), reason);
        self.codec.write_frame(&frame).await?;
        self.codec.flush().await
    }

    /// Shut down the write half of the stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the stream fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.state = ConnectionState::Closed;
        self.codec.shutdown().await
    }
}
