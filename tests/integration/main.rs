//! Integration tests for sessionbridge
//!
//! These run the real HTTP providers against a local mock server and
//! drive them through the public `AppState` wiring.

mod harness;
mod login_flow_test;
mod provider_failure_test;
