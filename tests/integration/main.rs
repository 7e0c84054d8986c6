//! Integration tests for include resolution, processor operations and error
//! reporting against the in-memory store.

mod common;

mod dialects;
mod processor;
mod resolve;
