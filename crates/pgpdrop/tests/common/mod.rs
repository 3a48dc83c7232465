//! Shared test utilities for pgpdrop integration tests.
//!
//! `TestHarness` lays out an isolated base directory with an intake
//! directory, a gpg homedir and a fake decryptor script standing in for gpg.

pub mod harness;

pub use harness::TestHarness;
