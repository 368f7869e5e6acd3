//! Shared-link SCPI transport
//!
//! This library lets driver code issue text commands to line-oriented
//! instrumentation over TCP and receive either a text reply or a
//! definite-length binary block, while several logical sessions interleave
//! their exchanges over one physical socket.
//!
//! # Architecture
//!
//! The workspace is organized as one crate per layer:
//!
//! - `scpi-core`: error taxonomy and the logical connection handle
//! - `scpi-transport`: the physical link (stream traits, TCP)
//! - `scpi-session`: response framing codec and the connection registry
//! - `scpi-client`: the transport façade drivers call
//!
//! # Usage
//!
//! ```no_run
//! use scpi::client::ScpiDevice;
//!
//! # async fn demo() -> scpi::ScpiResult<()> {
//! let device = ScpiDevice::builder("192.168.1.40", 5025).build();
//!
//! let idn = device.query("*IDN?").await?;
//! device.write("SOUR:VOLT 1.5").await?;
//! let screen = device.query_raw("DISP:DATA?", 4096).await?;
//! # let _ = (idn, screen);
//! # Ok(())
//! # }
//! ```
//!
//! Instrument-specific semantics (units, enumerations, sequencing) belong
//! to driver crates built on top of this transport.

// Re-export core types
pub use scpi_core::{Handle, ScpiError, ScpiResult};

// Re-export transport API
pub mod transport {
    pub use scpi_transport::*;
}

// Re-export session API
pub mod session {
    pub use scpi_session::*;
}

// Re-export client API
pub mod client {
    pub use scpi_client::*;
}
