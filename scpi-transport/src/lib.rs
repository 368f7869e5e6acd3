//! Physical link layer for the SCPI shared-link transport
//!
//! This crate provides the stream traits and the TCP implementation of the
//! single physical link shared by all logical connections.

pub mod stream;
pub mod tcp;

pub use scpi_core::{ScpiError, ScpiResult};
pub use stream::{LinkStream, PhysicalLink};
pub use tcp::{LinkConfig, TcpLink};
