//! Mock service endpoints for integration tests.
//!
//! - [`memory`] - in-process transport standing in for the realtime service

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod memory;

pub use memory::{MemoryConnector, MemoryPeer};
