//! Transport layer for JSON-RPC communication
//!
//! Messages are framed LSP-style with a `Content-Length` header. The same
//! framing is used over stdio and Unix domain sockets, by server and client.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use crate::config::settings::ServerConfig;

/// Upper bound on a single message body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on a single header line, terminator included
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Reads Content-Length framed messages
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read the next message body. `Ok(None)` means the peer closed cleanly between messages.
    pub async fn read_message(&mut self) -> Result<Option<String>> {
        let mut content_length = None;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            let bytes_read = (&mut self.reader)
                .take(MAX_HEADER_LINE as u64 + 1)
                .read_line(&mut line)
                .await?;
            if bytes_read > MAX_HEADER_LINE {
                return Err(anyhow!("Header line exceeds {} bytes", MAX_HEADER_LINE));
            }

            if bytes_read == 0 {
                if saw_header {
                    return Err(anyhow!("Connection closed while reading headers"));
                }
                return Ok(None);
            }

            let line = line.trim_end();
            if line.is_empty() {
                if !saw_header {
                    // tolerate stray blank lines between messages
                    continue;
                }
                break;
            }
            saw_header = true;
            trace!("Received header: {}", line);

            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = Some(
                        value
                            .trim()
                            .parse::<usize>()
                            .map_err(|e| anyhow!("Invalid Content-Length: {}", e))?,
                    );
                }
            }
        }

        let content_length = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        if content_length > MAX_MESSAGE_SIZE {
            return Err(anyhow!(
                "Message of {} bytes exceeds limit of {} bytes",
                content_length,
                MAX_MESSAGE_SIZE
            ));
        }

        let mut buffer = vec![0u8; content_length];
        self.reader.read_exact(&mut buffer).await?;

        let content = String::from_utf8(buffer)?;
        debug!("Received message: {} bytes", content_length);
        Ok(Some(content))
    }
}

/// Writes Content-Length framed messages
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message(&mut self, content: &str) -> Result<()> {
        let content_bytes = content.as_bytes();
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", content_bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(content_bytes).await?;
        self.writer.flush().await?;

        debug!("Sent message: {} bytes", content_bytes.len());
        Ok(())
    }

    pub async fn write_json<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let content = serde_json::to_string(message)?;
        self.write_message(&content).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// One client connection, split into halves
pub struct Connection {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub peer: String,
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    /// Standard input/output with LSP message framing
    Stdio,
    /// Unix domain socket with specified path
    UnixSocket { path: String },
}

impl TransportConfig {
    pub fn from_server_config(config: &ServerConfig) -> Result<Self> {
        match config.transport.as_str() {
            "stdio" => Ok(TransportConfig::Stdio),
            "socket" => {
                let path = config
                    .socket_path
                    .clone()
                    .ok_or_else(|| anyhow!("Socket path is required when using socket transport"))?;
                Ok(TransportConfig::UnixSocket { path })
            }
            other => Err(anyhow!("Unsupported transport type: {}", other)),
        }
    }

    pub fn description(&self) -> String {
        match self {
            TransportConfig::Stdio => "stdin/stdout".to_string(),
            TransportConfig::UnixSocket { path } => format!("Unix socket ({})", path),
        }
    }
}

/// Source of client connections
pub enum Listener {
    /// Yields a single stdin/stdout connection
    Stdio { taken: bool },
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    pub async fn bind(config: &TransportConfig) -> Result<Self> {
        match config {
            TransportConfig::Stdio => Ok(Listener::Stdio { taken: false }),
            TransportConfig::UnixSocket { path } => {
                let path_ref = Path::new(path);
                if path_ref.exists() {
                    std::fs::remove_file(path_ref)
                        .map_err(|e| anyhow!("Failed to remove existing socket file: {}", e))?;
                }
                if let Some(parent) = path_ref.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }

                let listener = tokio::net::UnixListener::bind(path_ref)
                    .map_err(|e| anyhow!("Failed to bind to socket {}: {}", path, e))?;
                debug!("Listening on: {}", path);

                Ok(Listener::Unix {
                    listener,
                    path: path_ref.to_path_buf(),
                })
            }
        }
    }

    /// Wait for the next connection. `Ok(None)` means no more connections will arrive.
    pub async fn accept(&mut self) -> Result<Option<Connection>> {
        match self {
            Listener::Stdio { taken } => {
                if *taken {
                    return Ok(None);
                }
                *taken = true;
                Ok(Some(Connection {
                    reader: Box::new(tokio::io::stdin()),
                    writer: Box::new(tokio::io::stdout()),
                    peer: "stdio".to_string(),
                }))
            }
            Listener::Unix { listener, path } => {
                let (stream, _addr) = listener
                    .accept()
                    .await
                    .map_err(|e| anyhow!("Failed to accept connection: {}", e))?;
                let (read_half, write_half) = stream.into_split();
                Ok(Some(Connection {
                    reader: Box::new(read_half),
                    writer: Box::new(write_half),
                    peer: path.display().to_string(),
                }))
            }
        }
    }

    /// Remove the socket file, if any
    pub fn close(&self) -> Result<()> {
        if let Listener::Unix { path, .. } = self {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            debug!("Socket closed: {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_framing() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(client);
        let mut reader = MessageReader::new(server);

        let body = r#"{"jsonrpc":"2.0","method":"incidents/meta","id":1}"#;
        writer.write_message(body).await.unwrap();
        writer.write_message("{}").await.unwrap();

        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some(body));
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_writer_emits_header_then_body() {
        let mock = tokio_test::io::Builder::new()
            .write(b"Content-Length: 2\r\n\r\n")
            .write(b"{}")
            .build();
        let mut writer = MessageWriter::new(mock);
        writer.write_message("{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_handles_split_frames() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Content-Len")
            .read(b"gth: 11\r\n\r\n{\"id\"")
            .read(b":null}")
            .build();
        let mut reader = MessageReader::new(mock);
        assert_eq!(
            reader.read_message().await.unwrap().as_deref(),
            Some(r#"{"id":null}"#)
        );
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = MessageReader::new(server);
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let mut reader = MessageReader::new(&b"Content-Type: application/json\r\n\r\n{}"[..]);
        assert!(reader.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_header_name_is_case_insensitive() {
        let mut reader = MessageReader::new(&b"content-length: 2\r\n\r\n{}"[..]);
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let raw = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1);
        let mut reader = MessageReader::new(raw.as_bytes());
        assert!(reader.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_unterminated_header_line_rejected() {
        let raw = "X".repeat(MAX_HEADER_LINE * 4);
        let mut reader = MessageReader::new(raw.as_bytes());
        let err = reader.read_message().await.unwrap_err();
        assert!(err.to_string().contains("Header line exceeds"));
    }

    #[tokio::test]
    async fn test_long_header_within_limit_accepted() {
        let padding = "a".repeat(MAX_HEADER_LINE - 64);
        let raw = format!("X-Trace: {}\r\nContent-Length: 2\r\n\r\n{{}}", padding);
        let mut reader = MessageReader::new(raw.as_bytes());
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_transport_config_from_server_config() {
        let mut config = ServerConfig::default();
        assert_eq!(TransportConfig::from_server_config(&config).unwrap(), TransportConfig::Stdio);

        config.transport = "socket".to_string();
        config.socket_path = Some("/tmp/test.sock".to_string());
        let transport = TransportConfig::from_server_config(&config).unwrap();
        assert!(transport.description().contains("/tmp/test.sock"));

        config.transport = "http".to_string();
        assert!(TransportConfig::from_server_config(&config).is_err());
    }
}
