//! Scenario tests for the session manager
//!
//! Fakes for every injected service live in `test_helpers`.
