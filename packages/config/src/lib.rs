//! Configuration for formwork.
//!
//! Three pieces live here:
//!
//! - [`version`]: the `major.minor.micro` version triple used as a
//!   compatibility argument;
//! - [`singletons`]: the process-wide registry deduplicating expensive
//!   configuration objects by product type, normalized arguments, and
//!   normalized properties;
//! - [`settings`]: the string-keyed settings surface (dual naming
//!   conventions, legacy aliases, typed value parsers) and the immutable
//!   [`Engine`] a builder produces from it.

pub mod settings;
pub mod singletons;
pub mod version;

pub use settings::{Engine, EngineBuilder, SettingError, SettingsSnapshot, WrapperChoice};
pub use singletons::{
    global, ArgValue, Frozen, HoldStrength, SingletonError, SingletonRegistry, SingletonSpec,
};
pub use version::{ParseVersionError, Version};
