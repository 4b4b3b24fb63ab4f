//! Common test utilities and infrastructure
//!
//! In-memory stand-ins for the container runtime and the proxy admin API,
//! plus a builder that wires them into a `Harness`.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{FakeRuntime, FakeToxiproxy, TestBed};
