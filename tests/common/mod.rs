//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - A scripted fake transport
//! - A store whose writes can be made to fail
//! - A wired client harness and record fixtures
//! - Custom assertion macros

#![allow(dead_code)]

pub mod assertions;
pub mod fake_transport;
pub mod fixtures;
pub mod flaky_store;

pub use fake_transport::*;
pub use fixtures::*;
pub use flaky_store::FlakyStore;
