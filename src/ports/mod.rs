//! Ports module defining interfaces for hexagonal architecture
//!
//! Only driven ports exist: the pipeline is a batch/poll client and exposes
//! no inbound surface besides the CLI.

pub mod outbound;
