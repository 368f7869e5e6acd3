//! Stream traits for the physical link

use async_trait::async_trait;
use scpi_core::{ScpiError, ScpiResult};

/// Byte-stream interface over the physical link to an instrument
///
/// The framing codec and the transport façade operate on this trait so that
/// tests can substitute scripted streams for a real socket.
#[async_trait]
pub trait LinkStream: Send {
    /// Read data from the stream
    ///
    /// A single receive bounded by the link's read timeout. May return
    /// fewer bytes than the buffer holds.
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 on EOF. A receive window in which no
    /// data arrived at all yields [`ScpiError::ReadTimeout`].
    async fn read(&mut self, buf: &mut [u8]) -> ScpiResult<usize>;

    /// Read exact number of bytes from the stream
    ///
    /// Accumulates across partial reads; a single receive is not
    /// guaranteed to deliver everything that was requested.
    async fn read_exact(&mut self, mut buf: &mut [u8]) -> ScpiResult<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(ScpiError::Read(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended before the expected number of bytes",
                )));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Write the whole buffer to the stream
    ///
    /// Implementations must observe the configured inter-send delay after
    /// a successful write before returning, so the device has time to
    /// process the command before the next one is issued.
    async fn write_all(&mut self, buf: &[u8]) -> ScpiResult<()>;

    /// Flush any buffered data
    async fn flush(&mut self) -> ScpiResult<()>;

    /// Check if the stream is open
    fn is_open(&self) -> bool;

    /// Close the stream; safe to call when already closed
    async fn close(&mut self);

    /// The line terminator configured for this link
    fn terminator(&self) -> &[u8] {
        b"\n"
    }
}

/// Physical link trait that extends [`LinkStream`] with connection setup
#[async_trait]
pub trait PhysicalLink: LinkStream {
    /// Establish the stream connection; idempotent no-op if already open
    async fn open(&mut self) -> ScpiResult<()>;
}
