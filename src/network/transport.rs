//! Point-to-point transport between router processes.
//!
//! Each protocol message travels as one line of JSON over a TCP stream, so a
//! message is delivered whole and in order on a given connection.

use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::trace;

use crate::error::{Result, RouterError};
use crate::protocol::ProtocolMessage;
use crate::types::RouterIdentity;

pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(ip: &str, port: u16) -> Result<Self> {
        let inner = TcpListener::bind((ip, port)).await?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    pub async fn accept(&self) -> Result<Connection> {
        let (stream, _) = self.inner.accept().await?;
        Connection::from_stream(stream)
    }
}

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    line: String,
}

impl Connection {
    pub async fn open(remote: &RouterIdentity) -> Result<Self> {
        let stream = TcpStream::connect((remote.process_ip.as_str(), remote.process_port)).await?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            peer,
            line: String::new(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&mut self, message: &ProtocolMessage) -> Result<()> {
        let mut encoded = message.encode()?;
        encoded.push('\n');
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        trace!("→ {} {} to {}", message.kind, message.dst_ip, self.peer);
        Ok(())
    }

    /// Next message, or `None` once the peer closed the connection.
    pub async fn receive(&mut self) -> Result<Option<ProtocolMessage>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message = ProtocolMessage::decode(trimmed)?;
            trace!("← {} from {} via {}", message.kind, message.src_ip, self.peer);
            return Ok(Some(message));
        }
    }

    /// Like `receive`, but a closed connection is an error.
    pub async fn expect(&mut self) -> Result<ProtocolMessage> {
        self.receive().await?.ok_or_else(|| {
            RouterError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.peer),
            ))
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Opens a connection, sends one message and closes.
pub async fn send_one(remote: &RouterIdentity, message: &ProtocolMessage) -> Result<()> {
    let mut connection = Connection::open(remote).await?;
    connection.send(message).await?;
    connection.close().await
}
