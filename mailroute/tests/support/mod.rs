//! Test support utilities for E2E testing
//!
//! Starts a complete proxy in-process, with mock LMTP backends behind it.

pub mod harness;
pub mod mock_server;

pub use harness::E2ETestHarness;
