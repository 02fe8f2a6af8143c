//! Shared test utilities for audiofetch integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated service over temp directories
//! - `FakeProcess`, a scripted stand-in for the downloader

pub mod fake_process;
pub mod harness;

pub use fake_process::*;
pub use harness::*;
