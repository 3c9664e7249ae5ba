//! End-to-end tests for RedDisc
//!
//! The tests under `tests/` wire the reconciliation loop to in-memory or
//! HTTP-mocked collaborators and to the real file-backed tenant store.
