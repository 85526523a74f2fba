//! Shared test utilities for docpipe integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs over a temporary storage root
//! - `PipelineBuilder` for assembling pipeline configs in code
//! - Scripted stages with predictable outputs and failures

pub mod builders;
pub mod harness;
pub mod processors;

pub use builders::*;
pub use harness::TestHarness;
pub use processors::*;
