//! Session layer for the SCPI shared-link transport
//!
//! This crate provides the response framing codec (text lines and
//! definite-length binary blocks) and the registry of logical connection
//! handles that arbitrates access to the single physical link.

pub mod framing;
pub mod registry;

pub use framing::{BLOCK_INTRODUCER, encode_command, read_line, read_reply, strip_terminator};
pub use registry::{ConnectionRegistry, ConnectionState, ReleaseOutcome};
pub use scpi_core::{ScpiError, ScpiResult};
