//! # Bitrepository Client Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── mediator_benchmarks.rs  # dispatch and conversation throughput
//! └── src/
//!     ├── simulation.rs           # scripted pillars on the in-memory bus
//!     └── integration/            # client ↔ pillar flows
//!         ├── flows.rs
//!         └── timeouts.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p br-tests
//!
//! # By category
//! cargo test -p br-tests integration::flows
//! cargo test -p br-tests integration::timeouts
//!
//! # Benchmarks
//! cargo bench -p br-tests
//! ```

pub mod simulation;
