//! Process-wide deduplication of configuration singletons.
//!
//! Expensive configuration objects (object wrappers above all) are shared
//! across the process: two requests with the same product type, normalized
//! arguments, and normalized properties get the identical instance. The
//! registry is an explicit cache - entries can be held strongly or weakly,
//! dead weak entries are purged before every operation, and the whole thing
//! can be cleared.
//!
//! Products must be immutable after construction. That promise is the
//! [`Frozen`] marker bound on [`SingletonSpec::Product`], checked at compile
//! time rather than by a runtime read-only flag.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use crate::version::Version;

/// Marker for types that never mutate after construction.
///
/// Required of every singleton product: shared instances are handed to
/// arbitrary callers, so observable mutation would leak between them.
pub trait Frozen {}

/// A normalized constructor argument or property value.
///
/// Numeric variants widen to `Long` when used in a registry key, so a
/// request passing `Byte(5)` and one passing `Int(5)` deduplicate to the
/// same entry. `Double` hashes by bit pattern.
#[derive(Clone, Debug)]
pub enum ArgValue {
    /// A boolean.
    Bool(bool),
    /// An 8-bit integer.
    Byte(i8),
    /// A 16-bit integer.
    Short(i16),
    /// A 32-bit integer.
    Int(i32),
    /// A 64-bit integer.
    Long(i64),
    /// A double-precision float.
    Double(f64),
    /// A string.
    Str(String),
    /// A version triple.
    Version(Version),
}

impl ArgValue {
    /// The key-normal form: integer widths widen to `Long`.
    pub fn normalized(&self) -> ArgValue {
        match self {
            ArgValue::Byte(v) => ArgValue::Long(*v as i64),
            ArgValue::Short(v) => ArgValue::Long(*v as i64),
            ArgValue::Int(v) => ArgValue::Long(*v as i64),
            other => other.clone(),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArgValue::Bool(a), ArgValue::Bool(b)) => a == b,
            (ArgValue::Byte(a), ArgValue::Byte(b)) => a == b,
            (ArgValue::Short(a), ArgValue::Short(b)) => a == b,
            (ArgValue::Int(a), ArgValue::Int(b)) => a == b,
            (ArgValue::Long(a), ArgValue::Long(b)) => a == b,
            (ArgValue::Double(a), ArgValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ArgValue::Str(a), ArgValue::Str(b)) => a == b,
            (ArgValue::Version(a), ArgValue::Version(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ArgValue {}

impl Hash for ArgValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ArgValue::Bool(v) => v.hash(state),
            ArgValue::Byte(v) => v.hash(state),
            ArgValue::Short(v) => v.hash(state),
            ArgValue::Int(v) => v.hash(state),
            ArgValue::Long(v) => v.hash(state),
            ArgValue::Double(v) => v.to_bits().hash(state),
            ArgValue::Str(v) => v.hash(state),
            ArgValue::Version(v) => v.hash(state),
        }
    }
}

/// Singleton registry failures.
#[derive(thiserror::Error, Debug)]
pub enum SingletonError {
    /// The spec itself is inconsistent: a constructed product disagrees with
    /// the declared property defaults, or a declared property cannot be read
    /// back. This is a bug in the spec implementation, not in the caller.
    #[error("inconsistent singleton spec {spec}: {reason}")]
    BadSpec {
        /// The spec's declared name.
        spec: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The caller passed arguments or properties the spec does not accept.
    #[error("bad arguments for singleton spec {spec}: {reason}")]
    BadArgs {
        /// The spec's declared name.
        spec: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// Construction of the product failed.
    #[error("singleton construction failed for spec {spec}: {reason}")]
    Construction {
        /// The spec's declared name.
        spec: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// How a product describes itself to the registry.
///
/// This is the explicit replacement for reflective normalization hooks: the
/// spec names the product, normalizes arguments, declares property defaults,
/// constructs, and reads properties back for the consistency self-check.
pub trait SingletonSpec: 'static {
    /// The shared product. The [`Frozen`] bound is the immutability promise.
    type Product: Send + Sync + Frozen + 'static;

    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Canonicalize a version argument. Identity by default; specs whose
    /// behavior changes only at version milestones map each version down to
    /// its milestone here, so equivalent requests share one entry.
    fn normalize_version(version: Version) -> Version {
        version
    }

    /// Key-normalize the argument list: integer widths widen, and the first
    /// version argument is canonicalized through [`normalize_version`].
    ///
    /// [`normalize_version`]: SingletonSpec::normalize_version
    fn normalize_args(args: &[ArgValue]) -> Result<Vec<ArgValue>, SingletonError> {
        let mut version_seen = false;
        Ok(args
            .iter()
            .map(|arg| match arg {
                ArgValue::Version(v) if !version_seen => {
                    version_seen = true;
                    ArgValue::Version(Self::normalize_version(*v))
                }
                other => other.normalized(),
            })
            .collect())
    }

    /// The full property surface with its default values. Callers may only
    /// override properties declared here.
    fn property_defaults() -> Vec<(&'static str, ArgValue)>;

    /// Build the product from normalized arguments and the merged property
    /// map (defaults overlaid with the caller's overrides, sorted by name).
    fn construct(
        args: &[ArgValue],
        props: &[(String, ArgValue)],
    ) -> Result<Self::Product, SingletonError>;

    /// Read a property back off a product, for the consistency self-check.
    fn get_property(product: &Self::Product, name: &str) -> Option<ArgValue>;
}

/// How the registry holds a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldStrength {
    /// Keep the product alive as long as the registry does.
    Strong,
    /// Let the product die when the last outside reference drops. (There is
    /// no memory-pressure-sensitive middle ground; "soft" requests from the
    /// original model map here.)
    Weak,
}

#[derive(PartialEq, Eq, Hash)]
struct SingletonKey {
    product: TypeId,
    args: Vec<ArgValue>,
    props: Vec<(String, ArgValue)>,
}

enum Holder {
    Strong(Arc<dyn Any + Send + Sync>),
    Weak(Weak<dyn Any + Send + Sync>),
}

impl Holder {
    fn live(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match self {
            Holder::Strong(arc) => Some(arc.clone()),
            Holder::Weak(weak) => weak.upgrade(),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Holder::Strong(_) => false,
            Holder::Weak(weak) => weak.strong_count() == 0,
        }
    }
}

/// The keyed dedup cache.
pub struct SingletonRegistry {
    entries: Mutex<HashMap<SingletonKey, Holder>>,
}

impl SingletonRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        SingletonRegistry {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the shared product for `(spec, args, props)`, constructing and
    /// caching it on the first request.
    ///
    /// `props` overrides a subset of the spec's declared property defaults;
    /// naming an undeclared property is [`SingletonError::BadArgs`]. The
    /// constructed product is read back against the merged property map, and
    /// any disagreement is [`SingletonError::BadSpec`].
    pub fn get_or_create<S: SingletonSpec>(
        &self,
        args: &[ArgValue],
        props: &[(String, ArgValue)],
        strength: HoldStrength,
    ) -> Result<Arc<S::Product>, SingletonError> {
        let args = S::normalize_args(args)?;
        let merged = merge_properties::<S>(props)?;
        let key = SingletonKey {
            product: TypeId::of::<S::Product>(),
            args,
            props: merged.clone(),
        };

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, holder| !holder.is_dead());

        if let Some(any) = entries.get(&key).and_then(Holder::live) {
            debug!(spec = S::NAME, "singleton registry hit");
            // A strong request upgrades a weakly held entry in place.
            if strength == HoldStrength::Strong {
                entries.insert(key, Holder::Strong(any.clone()));
            }
            return any.downcast::<S::Product>().map_err(|_| {
                SingletonError::BadSpec {
                    spec: S::NAME,
                    reason: "cached entry has a different product type".to_string(),
                }
            });
        }

        debug!(spec = S::NAME, "singleton registry miss, constructing");
        let product = Arc::new(S::construct(&key.args, &merged)?);
        self_check::<S>(&product, &merged)?;

        let any: Arc<dyn Any + Send + Sync> = product.clone();
        let holder = match strength {
            HoldStrength::Strong => Holder::Strong(any),
            HoldStrength::Weak => Holder::Weak(Arc::downgrade(&any)),
        };
        entries.insert(key, holder);
        Ok(product)
    }

    /// Downgrade every strong entry to a weak one, letting unused products
    /// be reclaimed.
    pub fn weaken(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for holder in entries.values_mut() {
            if let Holder::Strong(arc) = holder {
                *holder = Holder::Weak(Arc::downgrade(arc));
            }
        }
    }

    /// Drop entries whose weakly held product has died.
    pub fn purge_stale(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, holder| !holder.is_dead());
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Number of live entries (stale ones are purged first).
    pub fn entry_count(&self) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, holder| !holder.is_dead());
        entries.len()
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        SingletonRegistry::new()
    }
}

fn merge_properties<S: SingletonSpec>(
    overrides: &[(String, ArgValue)],
) -> Result<Vec<(String, ArgValue)>, SingletonError> {
    let mut merged: Vec<(String, ArgValue)> = S::property_defaults()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.normalized()))
        .collect();
    for (name, value) in overrides {
        match merged.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.normalized(),
            None => {
                return Err(SingletonError::BadArgs {
                    spec: S::NAME,
                    reason: format!("unknown property {:?}", name),
                })
            }
        }
    }
    merged.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(merged)
}

/// Verify the constructed product reports exactly the properties it was
/// built with. A disagreement means the spec's defaults, constructor, and
/// property reader are out of sync.
fn self_check<S: SingletonSpec>(
    product: &S::Product,
    props: &[(String, ArgValue)],
) -> Result<(), SingletonError> {
    for (name, expected) in props {
        match S::get_property(product, name) {
            Some(actual) if actual.normalized() == *expected => {}
            Some(actual) => {
                return Err(SingletonError::BadSpec {
                    spec: S::NAME,
                    reason: format!(
                        "property {:?} reads back as {:?}, expected {:?}",
                        name, actual, expected
                    ),
                })
            }
            None => {
                return Err(SingletonError::BadSpec {
                    spec: S::NAME,
                    reason: format!("declared property {:?} cannot be read back", name),
                })
            }
        }
    }
    Ok(())
}

lazy_static::lazy_static! {
    static ref GLOBAL: SingletonRegistry = SingletonRegistry::new();
}

/// The process-wide registry.
pub fn global() -> &'static SingletonRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget {
        scale: i64,
        label: String,
    }

    impl Frozen for Widget {}

    struct WidgetSpec;

    impl SingletonSpec for WidgetSpec {
        type Product = Widget;

        const NAME: &'static str = "widget";

        fn normalize_version(version: Version) -> Version {
            // Behavior milestones at 1.0.0 and 1.2.0.
            if version >= Version::new(1, 2, 0) {
                Version::new(1, 2, 0)
            } else {
                Version::new(1, 0, 0)
            }
        }

        fn property_defaults() -> Vec<(&'static str, ArgValue)> {
            vec![("label", ArgValue::Str("plain".to_string()))]
        }

        fn construct(
            args: &[ArgValue],
            props: &[(String, ArgValue)],
        ) -> Result<Widget, SingletonError> {
            let scale = match args {
                [ArgValue::Long(s)] | [ArgValue::Version(_), ArgValue::Long(s)] => *s,
                _ => {
                    return Err(SingletonError::BadArgs {
                        spec: Self::NAME,
                        reason: "expected a single integer scale".to_string(),
                    })
                }
            };
            let label = props
                .iter()
                .find(|(n, _)| n == "label")
                .and_then(|(_, v)| match v {
                    ArgValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            Ok(Widget { scale, label })
        }

        fn get_property(product: &Widget, name: &str) -> Option<ArgValue> {
            match name {
                "label" => Some(ArgValue::Str(product.label.clone())),
                _ => None,
            }
        }
    }

    struct LyingSpec;

    impl SingletonSpec for LyingSpec {
        type Product = Widget;

        const NAME: &'static str = "lying";

        fn property_defaults() -> Vec<(&'static str, ArgValue)> {
            vec![("label", ArgValue::Str("declared".to_string()))]
        }

        fn construct(
            _args: &[ArgValue],
            _props: &[(String, ArgValue)],
        ) -> Result<Widget, SingletonError> {
            // Ignores the property map, so the self-check must catch it.
            Ok(Widget {
                scale: 0,
                label: "something else".to_string(),
            })
        }

        fn get_property(product: &Widget, name: &str) -> Option<ArgValue> {
            match name {
                "label" => Some(ArgValue::Str(product.label.clone())),
                _ => None,
            }
        }
    }

    #[test]
    fn identical_requests_share_one_instance() {
        let registry = SingletonRegistry::new();
        let a = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(2)], &[], HoldStrength::Strong)
            .unwrap();
        let b = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(2)], &[], HoldStrength::Strong)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.entry_count(), 1);

        let c = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(3)], &[], HoldStrength::Strong)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.scale, 3);
    }

    #[test]
    fn numeric_widths_widen_into_the_same_key() {
        let registry = SingletonRegistry::new();
        let a = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Byte(5)], &[], HoldStrength::Strong)
            .unwrap();
        let b = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Int(5)], &[], HoldStrength::Strong)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.entry_count(), 1);
    }

    #[test]
    fn version_arguments_canonicalize_to_milestones() {
        let registry = SingletonRegistry::new();
        let args_a = [ArgValue::Version(Version::new(1, 2, 5)), ArgValue::Long(1)];
        let args_b = [ArgValue::Version(Version::new(1, 3, 0)), ArgValue::Long(1)];
        let a = registry
            .get_or_create::<WidgetSpec>(&args_a, &[], HoldStrength::Strong)
            .unwrap();
        let b = registry
            .get_or_create::<WidgetSpec>(&args_b, &[], HoldStrength::Strong)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn property_overrides_split_the_key() {
        let registry = SingletonRegistry::new();
        let plain = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(1)], &[], HoldStrength::Strong)
            .unwrap();
        let fancy = registry
            .get_or_create::<WidgetSpec>(
                &[ArgValue::Long(1)],
                &[("label".to_string(), ArgValue::Str("fancy".to_string()))],
                HoldStrength::Strong,
            )
            .unwrap();
        assert!(!Arc::ptr_eq(&plain, &fancy));
        assert_eq!(fancy.label, "fancy");
    }

    #[test]
    fn unknown_properties_are_caller_errors() {
        let registry = SingletonRegistry::new();
        let err = registry
            .get_or_create::<WidgetSpec>(
                &[ArgValue::Long(1)],
                &[("nope".to_string(), ArgValue::Bool(true))],
                HoldStrength::Strong,
            )
            .unwrap_err();
        assert!(matches!(err, SingletonError::BadArgs { .. }));
    }

    #[test]
    fn inconsistent_specs_are_spec_errors() {
        let registry = SingletonRegistry::new();
        let err = registry
            .get_or_create::<LyingSpec>(&[], &[], HoldStrength::Strong)
            .unwrap_err();
        assert!(matches!(err, SingletonError::BadSpec { .. }));
    }

    #[test]
    fn weak_entries_die_with_their_last_reference() {
        let registry = SingletonRegistry::new();
        let a = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(9)], &[], HoldStrength::Weak)
            .unwrap();
        assert_eq!(registry.entry_count(), 1);

        drop(a);
        registry.purge_stale();
        assert_eq!(registry.entry_count(), 0);

        // The next request constructs a fresh instance.
        let b = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(9)], &[], HoldStrength::Weak)
            .unwrap();
        assert_eq!(b.scale, 9);
    }

    #[test]
    fn strong_requests_upgrade_weak_entries() {
        let registry = SingletonRegistry::new();
        let a = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(7)], &[], HoldStrength::Weak)
            .unwrap();
        let b = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(7)], &[], HoldStrength::Strong)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // The registry now keeps the product alive by itself.
        drop(a);
        drop(b);
        assert_eq!(registry.entry_count(), 1);
    }

    #[test]
    fn weaken_downgrades_strong_entries() {
        let registry = SingletonRegistry::new();
        let a = registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(4)], &[], HoldStrength::Strong)
            .unwrap();
        registry.weaken();
        drop(a);
        assert_eq!(registry.entry_count(), 0);
    }

    #[test]
    fn clear_empties_the_registry() {
        let registry = SingletonRegistry::new();
        registry
            .get_or_create::<WidgetSpec>(&[ArgValue::Long(1)], &[], HoldStrength::Strong)
            .unwrap();
        registry.clear();
        assert_eq!(registry.entry_count(), 0);
    }
}
