//! Object lifecycle contract tests
//!
//! Every object the host learns about is released exactly once, and a closed
//! handle never reaches the native side again.
