//! Adapters layer - Infrastructure implementations
//!
//! This layer contains concrete implementations of the ports,
//! providing the actual integration with upstream feeds and storage.

pub mod outbound;
