//! Shared state for one pipeline run.
//!
//! Every lifecycle key has its own statically typed slot in [`StateBag`].
//! Required reads fail with [`BuildError::MissingState`](crate::errors::BuildError::MissingState)
//! when the producing step has not run, which halts the pipeline instead of
//! letting a mis-ordered step limp along.

mod bag;

pub use bag::{HttpEndpoint, StateBag, StateKey};
