//! Transport façade for the SCPI shared-link transport
//!
//! The only entry point driver code uses: [`ScpiDevice`] composes the
//! connection registry, the physical link, and the framing codec into the
//! send / read-text / read-raw / query operations, serialized by the
//! handle turn.

pub mod builder;
pub mod device;

pub use builder::DeviceBuilder;
pub use device::ScpiDevice;
pub use scpi_core::{Handle, ScpiError, ScpiResult};
