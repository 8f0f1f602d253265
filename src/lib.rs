//! meshload - Load and behavior verification harness for an RPC proxying tier
//!
//! This crate stands up a fake upstream responder, a service-mesh style proxy
//! tier in front of it, and waves of protocol-aware clients that push bursts
//! of binary RPC frames through the proxy and render whatever comes back.
//! Its purpose is to exercise the proxy's connection handling and forwarding
//! under concurrent load for manual inspection, not to produce a pass/fail
//! verdict.

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod harness;
pub mod mesh;
pub mod protocol;
pub mod transport;
pub mod upstream;

pub use client::{ConnectionDriver, ResponseObserver};
pub use config::HarnessConfig;
pub use harness::{Harness, HarnessState};

/// Cluster name registered for the single upstream group.
pub const HARNESS_CLUSTER: &str = "harness-cluster";

/// Listener name for the mesh's public inbound listener.
pub const HARNESS_LISTENER: &str = "harness-listener";
