//! # Cross-Module Scenario Tests
//!
//! Exercises the full path from a [`Query`](crate::Query) through axis
//! resolution, field extraction and the change gate against a small
//! synthetic OSCAR snapshot.
