//! Formwork model: the semantic value layer.
//!
//! This crate defines the closed set of types a template ever sees:
//! - `Value`: scalars inline, containers as shared trait objects
//! - `Number`, `DateValue`/`DateKind`: the terminal scalar payloads
//! - `HashModel`, `SeqModel`, `CollectionModel`, `MethodModel`, `NodeModel`:
//!   the container/callable capabilities
//! - `ModelError`: wrap, lookup, and consumption failures
//!
//! It is a pure classification space: no wrapping policy, no host types.
//! The `formwork-wrap` crate decides how host values are routed into these
//! representations.

mod date;
mod error;
mod number;
mod value;

pub use date::{DateKind, DateValue};
pub use error::ModelError;
pub use number::Number;
pub use value::{
    CollectionModel, HashModel, MethodModel, ModelCursor, NodeModel, SeqModel, Value,
};
