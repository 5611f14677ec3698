//! Shared foundational types used across the Zyphar incremental synthesis
//! accelerator.
//!
//! This crate provides the content-hash type used to key the module cache
//! and detect changes between synthesis runs.

#![warn(missing_docs)]

pub mod hash;

pub use hash::ContentHash;
