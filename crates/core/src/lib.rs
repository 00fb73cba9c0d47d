//! Pure building blocks for the pagesmith page editor.
//!
//! Holds the document model and the scoped, sanitizing patch engine that
//! applies untrusted edit operations to a page. Nothing in this crate does
//! I/O; the job pipeline lives in the `db`, `oracle`, `pipeline` and
//! `worker` crates.

pub mod css;
pub mod dom;
pub mod error;
pub mod patch;
pub mod sanitize;
pub mod scope;
pub mod selector;
pub mod types;
