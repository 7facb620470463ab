//! Formwork: the object-wrapping and template-model core of a template
//! rendering engine.
//!
//! Host-language values (maps, lists, arrays, iterators, scalars, dates) are
//! mapped into a small closed set of template-visible semantic types, with
//! two container strategies (live adapters vs. eager copies), single-pass
//! iterator semantics, and process-wide sharing of expensive configuration
//! objects.

pub use formwork_config as config;
pub use formwork_model as model;
pub use formwork_wrap as wrap;

pub use formwork_config::{Engine, EngineBuilder, Version};
pub use formwork_model::Value;
pub use formwork_wrap::{Host, ObjectWrapper, ObjectWrapperBuilder};
