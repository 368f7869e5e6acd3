//! Device builder
//!
//! Fluent configuration for [`ScpiDevice`] over TCP. Defaults match the
//! common raw-socket instrument setup: port 5025, 10 s read timeout, 1 ms
//! inter-send delay, `"\n"` terminator, unbounded turn wait.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use scpi_client::ScpiDevice;
//! use std::time::Duration;
//!
//! let device = ScpiDevice::builder("192.168.1.40", 5025)
//!     .read_timeout(Duration::from_secs(3))
//!     .terminator("\r\n")
//!     .build();
//! ```

use crate::ScpiDevice;
use scpi_transport::{LinkConfig, TcpLink};
use std::time::Duration;

/// Builder for a TCP-backed [`ScpiDevice`]
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    config: LinkConfig,
    turn_timeout: Option<Duration>,
}

impl DeviceBuilder {
    /// Start with the default link settings for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            config: LinkConfig::new(host, port),
            turn_timeout: None,
        }
    }

    /// Bound on a single receive and on connection establishment
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Settle delay observed after every write
    pub fn inter_send_delay(mut self, delay: Duration) -> Self {
        self.config.inter_send_delay = delay;
        self
    }

    /// Line terminator appended to commands and delimiting text replies
    pub fn terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.config.terminator = terminator.into();
        self
    }

    /// Bound the wait for the link turn
    ///
    /// Unset by default: a handle that never completes its exchange
    /// starves all others indefinitely. With a bound, starved callers
    /// fail with [`scpi_core::ScpiError::TurnTimeout`] and leave the
    /// queue.
    pub fn turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Build the device; the socket opens lazily on first use
    pub fn build(self) -> ScpiDevice<TcpLink> {
        ScpiDevice::from_parts(TcpLink::new(self.config), self.turn_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_settings() {
        let builder = DeviceBuilder::new("10.0.0.5", 1080)
            .read_timeout(Duration::from_secs(3))
            .inter_send_delay(Duration::from_millis(5))
            .terminator("")
            .turn_timeout(Duration::from_secs(30));

        assert_eq!(builder.config.host, "10.0.0.5");
        assert_eq!(builder.config.port, 1080);
        assert_eq!(builder.config.read_timeout, Duration::from_secs(3));
        assert_eq!(builder.config.inter_send_delay, Duration::from_millis(5));
        assert!(builder.config.terminator.is_empty());
        assert_eq!(builder.turn_timeout, Some(Duration::from_secs(30)));

        let _device = builder.build();
    }
}
