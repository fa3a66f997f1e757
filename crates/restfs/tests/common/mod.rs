//! Common test utilities for restfs integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod generators;
pub mod harness;
pub mod recording;

pub use assertions::*;
pub use generators::*;
pub use harness::*;
pub use recording::*;
