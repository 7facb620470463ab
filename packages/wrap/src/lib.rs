//! Object wrapping for formwork.
//!
//! This crate turns host-language values into the semantic values templates
//! consume. Host values are classified once into the closed [`Host`] shape
//! enum; the [`ObjectWrapper`] then routes each shape either to a live
//! adapter over the shared host container or to an eager copying container,
//! depending on policy.
//!
//! The two container strategies differ in what a template observes:
//!
//! - adapters ([`adapters`], [`once`]) are views - host-side mutations show
//!   up in later reads, and a host iterator is consumable exactly once;
//! - copying containers ([`copying`]) snapshot the host container at wrap
//!   time and memoize wrapped elements, so they are isolated from the host
//!   and stable under repeated reads.
//!
//! [`unwrap::deep_unwrap`] is the inverse direction, used by the copying
//! containers' exports and by collection membership tests.

pub mod adapters;
pub mod copying;
pub mod generic;
pub mod host;
pub mod once;
pub mod unwrap;
pub mod wrapper;

pub use adapters::{ArrayAdapter, ListAdapter, MapAdapter, SetAdapter, SortedMapAdapter};
pub use copying::{SimpleHash, SimpleSeq, SyncHash, SyncSeq};
pub use generic::{GenericObjectModel, NodeAdapter};
pub use host::{
    Host, HostArray, HostDate, HostKey, KeyKind, SetHost, SharedList, SharedMap, SortedMapHost,
    TemplateNode, TemplateObject,
};
pub use once::{IterAdapter, OnceHandle};
pub use unwrap::deep_unwrap;
pub use wrapper::{ObjectWrapper, ObjectWrapperBuilder, UnknownTypePolicy, WrapExtension};
