//! TCP physical link implementation

use crate::stream::{LinkStream, PhysicalLink};
use async_trait::async_trait;
use scpi_core::{ScpiError, ScpiResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Conventional raw-socket instrument control port
pub const DEFAULT_PORT: u16 = 5025;

/// Default read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default settle delay after each write
pub const DEFAULT_INTER_SEND_DELAY: Duration = Duration::from_millis(1);

/// Physical link settings
///
/// The full configuration surface this layer consumes from the caller:
/// host, port, read timeout, inter-send delay, line terminator. There is no
/// file or CLI surface here; that belongs to the driver layer.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Bound on a single receive and on connection establishment
    pub read_timeout: Duration,
    /// Mandatory pause after every successful write (device settling time)
    pub inter_send_delay: Duration,
    /// Terminator appended to commands and delimiting text replies
    pub terminator: Vec<u8>,
}

impl LinkConfig {
    /// Create settings with the default timeouts and terminator
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout: DEFAULT_READ_TIMEOUT,
            inter_send_delay: DEFAULT_INTER_SEND_DELAY,
            terminator: b"\n".to_vec(),
        }
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the settle delay observed after each write
    pub fn with_inter_send_delay(mut self, delay: Duration) -> Self {
        self.inter_send_delay = delay;
        self
    }

    /// Set the line terminator
    pub fn with_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.terminator = terminator.into();
        self
    }
}

/// TCP implementation of the physical link
///
/// Owns the single stream socket shared by all logical connections. The
/// socket is opened lazily by the connection registry on first acquire and
/// closed either on registry teardown or as a fail-fast side effect of an
/// I/O error mid-exchange.
#[derive(Debug)]
pub struct TcpLink {
    config: LinkConfig,
    stream: Option<TcpStream>,
}

impl TcpLink {
    /// Create a new, unconnected link
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Link settings
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn stream_mut(&mut self) -> ScpiResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(ScpiError::NotConnected)
    }
}

#[async_trait]
impl LinkStream for TcpLink {
    async fn read(&mut self, buf: &mut [u8]) -> ScpiResult<usize> {
        let timeout = self.config.read_timeout;
        let stream = self.stream_mut()?;

        let result = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| ScpiError::ReadTimeout)?;

        match result {
            Ok(0) => {
                // Far end closed the connection.
                log::debug!("link EOF, dropping socket");
                self.stream = None;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                log::warn!("link read error, dropping socket: {}", e);
                self.stream = None;
                Err(ScpiError::Read(e))
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> ScpiResult<()> {
        let delay = self.config.inter_send_delay;
        let stream = self.stream_mut()?;

        if let Err(e) = stream.write_all(buf).await {
            log::warn!("link write error, dropping socket: {}", e);
            self.stream = None;
            return Err(ScpiError::Write(e));
        }

        // Device settling time before the next command may be issued.
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn flush(&mut self) -> ScpiResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await.map_err(ScpiError::Write)
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            log::debug!("closing link to {}:{}", self.config.host, self.config.port);
            let _ = stream.shutdown().await;
        }
    }

    fn terminator(&self) -> &[u8] {
        &self.config.terminator
    }
}

#[async_trait]
impl PhysicalLink for TcpLink {
    async fn open(&mut self) -> ScpiResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = (self.config.host.as_str(), self.config.port);
        let stream = tokio::time::timeout(self.config.read_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ScpiError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })?
            .map_err(ScpiError::Connect)?;

        log::debug!("link opened to {}:{}", self.config.host, self.config.port);
        self.stream = Some(stream);
        Ok(())
    }
}
