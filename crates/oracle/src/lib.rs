//! Generation Oracle: the model backend that proposes site changes.
//!
//! A backend receives an [`OracleRequest`] and answers with JSON that is
//! either a complete file set or a list of patch operations. Nothing a
//! backend says is trusted: [`call_with_timeout`] bounds every call and
//! [`OracleOutput::from_value`] checks the shape before anything downstream
//! sees it.

mod api;
mod backend;
mod chain;
mod error;
mod output;
mod request;

pub use api::OracleApi;
pub use backend::{call_with_timeout, GenerationBackend};
pub use chain::{EmptyChainError, ModelChain};
pub use error::OracleError;
pub use output::{OracleOutput, INDEX_HTML};
pub use request::{OracleRequest, DEFAULT_SYSTEM_INSTRUCTIONS};
