//! Socket I/O: one connection per command, with connect and read deadlines.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use super::protocol::WireCommand;
use crate::error::{AppError, Result};

/// Callback invoked with every command written to the terminal.
pub type MessageObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection settings for one terminal.
pub(crate) struct TerminalLink {
    addr: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    buffer_size: usize,
    observer: Option<MessageObserver>,
}

impl TerminalLink {
    pub(crate) fn new(addr: String, connect_timeout: Duration, read_timeout: Duration, buffer_size: usize) -> Self {
        Self {
            addr,
            connect_timeout,
            read_timeout,
            buffer_size,
            observer: None,
        }
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn set_timeouts(&mut self, connect_timeout: Duration, read_timeout: Duration) {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
    }

    pub(crate) fn set_observer(&mut self, observer: MessageObserver) {
        self.observer = Some(observer);
    }

    /// Open a connection, write the command, read one reply and close.
    pub(crate) fn exchange(&self, command: &WireCommand) -> Result<Vec<u8>> {
        let packet = command.to_bytes();
        let mut stream = self.connect()?;

        stream
            .set_read_timeout(Some(self.read_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.connect_timeout)))
            .map_err(|e| self.io_error("Socket setup", e))?;

        debug!(
            "TX ({} bytes): {:02X?}",
            packet.len(),
            &packet[..packet.len().min(32)]
        );
        stream.write_all(&packet).map_err(|e| self.io_error("Write", e))?;

        if let Some(observer) = &self.observer {
            observer(&command.payload);
        }

        let mut buffer = vec![0u8; self.buffer_size];
        let received = stream.read(&mut buffer).map_err(|e| self.io_error("Read", e))?;
        let _ = stream.shutdown(Shutdown::Both);

        if received == 0 {
            error!("Terminal {} closed the connection without replying", self.addr);
            return Err(AppError::TerminalConnectionFailed(format!(
                "{} closed the connection without replying",
                self.addr
            )));
        }

        buffer.truncate(received);
        debug!("RX ({received} bytes)");
        Ok(buffer)
    }

    fn connect(&self) -> Result<TcpStream> {
        let addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|e| AppError::TerminalConnectionFailed(format!("Cannot resolve {}: {e}", self.addr)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    debug!("Connected to terminal at {addr}");
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => self.io_error("Connect", e),
            None => AppError::TerminalConnectionFailed(format!("No address found for {}", self.addr)),
        })
    }

    fn io_error(&self, stage: &str, e: std::io::Error) -> AppError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                error!("{stage} timeout on {}", self.addr);
                AppError::TerminalTimeout(format!("{stage} timeout on {}", self.addr))
            }
            _ => {
                error!("{stage} failed on {}: {e}", self.addr);
                AppError::TerminalConnectionFailed(format!("{stage} failed on {}: {e}", self.addr))
            }
        }
    }
}

/// Decode reply bytes one character per byte so fixed offsets stay byte-exact.
pub fn decode_reply(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reply_keeps_offsets() {
        let reply = decode_reply(&[b'0', b'A', 0xC3, 0x93, b'0', b'0']);
        assert_eq!(reply, "0A??00");
        assert_eq!(reply.len(), 6);
    }
}
