//! Integration test suite for the storage engine.
//!
//! 1. End-to-end workflows through the public store API
//! 2. Concurrent access across and within owners
//! 3. Persistence across store restarts

pub mod concurrency_tests;
pub mod end_to_end_tests;
pub mod helpers;
pub mod persistence_tests;
