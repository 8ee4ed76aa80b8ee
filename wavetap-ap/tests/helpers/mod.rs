//! Test helper modules for wavetap-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - FakeEngine: scripted engine that records transport calls
//! - EventCollector: bus subscriber with timeouts
//! - TestServer: router plus registry wired to fake engines
//! - write_test_wav: small WAV fixtures for metadata tests

#![allow(dead_code, unused_imports)]

pub mod event_collector;
pub mod fake_engine;
pub mod test_server;

pub use event_collector::EventCollector;
pub use fake_engine::{EngineCall, FakeEngineFactory, FakeEngineHandle};
pub use test_server::{write_test_wav, TestServer};
