//! The object wrapper - policy-controlled routing from host values to
//! semantic values.
//!
//! A wrapper is immutable once built; all policy lives in the builder. The
//! routing itself is one exhaustive `match` over [`Host`], so the precedence
//! order is visible in a single place: already-wrapped values first, then
//! scalars, dates, containers by shape, and finally the unknown-type
//! fallback.

use std::sync::Arc;

use formwork_model::{DateKind, DateValue, ModelError, Number, Value};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::adapters::{ArrayAdapter, ListAdapter, MapAdapter, SetAdapter, SortedMapAdapter};
use crate::copying::{SimpleHash, SimpleSeq};
use crate::generic::{GenericObjectModel, NodeAdapter};
use crate::host::{Host, HostDate};
use crate::once::IterAdapter;

/// What to do with a host object no routing rule claims.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypePolicy {
    /// Expose it through the generic property/method model.
    Generic,
    /// Refuse to wrap it (the restrictive wrapper).
    Refuse,
}

/// A pluggable routing rule consulted before the unknown-type fallback.
///
/// Extensions let embedders claim host object types the core doesn't know
/// about. The first extension returning `Some` wins.
pub trait WrapExtension: Send + Sync {
    /// Try to wrap `host`. `None` passes the value to the next rule.
    fn try_wrap(&self, host: &Host, wrapper: &Arc<ObjectWrapper>)
        -> Option<Result<Value, ModelError>>;
}

/// Builder for [`ObjectWrapper`]. All policy is fixed at `build()`.
pub struct ObjectWrapperBuilder {
    use_adapters: bool,
    force_legacy_non_list_collections: bool,
    default_date_kind: DateKind,
    unknown_type_policy: UnknownTypePolicy,
    extensions: Vec<Arc<dyn WrapExtension>>,
}

impl ObjectWrapperBuilder {
    /// Defaults: adapters on, non-list collections adapted, unknown date
    /// flavor, generic fallback for opaque objects.
    pub fn new() -> Self {
        ObjectWrapperBuilder {
            use_adapters: true,
            force_legacy_non_list_collections: false,
            default_date_kind: DateKind::Unknown,
            unknown_type_policy: UnknownTypePolicy::Generic,
            extensions: Vec::new(),
        }
    }

    /// Wrap containers as live adapters (`true`) or eager copies (`false`).
    pub fn use_adapters(mut self, yes: bool) -> Self {
        self.use_adapters = yes;
        self
    }

    /// Copy non-list collections eagerly even when adapters are on.
    pub fn force_legacy_non_list_collections(mut self, yes: bool) -> Self {
        self.force_legacy_non_list_collections = yes;
        self
    }

    /// Date flavor assigned to generic instants.
    pub fn default_date_kind(mut self, kind: DateKind) -> Self {
        self.default_date_kind = kind;
        self
    }

    /// Policy for host objects no routing rule claims.
    pub fn unknown_type_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.unknown_type_policy = policy;
        self
    }

    /// Append a routing extension. Extensions run in registration order.
    pub fn extension(mut self, ext: Arc<dyn WrapExtension>) -> Self {
        self.extensions.push(ext);
        self
    }

    /// Freeze the policy into a wrapper. Callers typically `Arc::new` the
    /// result, since containers hold the wrapper for lazy element wrapping.
    pub fn build(self) -> ObjectWrapper {
        ObjectWrapper {
            use_adapters: self.use_adapters,
            force_legacy_non_list_collections: self.force_legacy_non_list_collections,
            default_date_kind: self.default_date_kind,
            unknown_type_policy: self.unknown_type_policy,
            extensions: self.extensions,
        }
    }
}

impl Default for ObjectWrapperBuilder {
    fn default() -> Self {
        ObjectWrapperBuilder::new()
    }
}

/// Maps host values into template-visible semantic values.
///
/// Immutable after construction; share it behind an `Arc`. `wrap` is total
/// except for the unknown-type fallback under the refuse policy and claim
/// failures on already-consumed iterators.
pub struct ObjectWrapper {
    use_adapters: bool,
    force_legacy_non_list_collections: bool,
    default_date_kind: DateKind,
    unknown_type_policy: UnknownTypePolicy,
    extensions: Vec<Arc<dyn WrapExtension>>,
}

impl ObjectWrapper {
    /// Whether containers wrap as live adapters.
    pub fn uses_adapters(&self) -> bool {
        self.use_adapters
    }

    /// Whether non-list collections are forced to eager copies.
    pub fn forces_legacy_non_list_collections(&self) -> bool {
        self.force_legacy_non_list_collections
    }

    /// Date flavor assigned to generic instants.
    pub fn default_date_kind(&self) -> DateKind {
        self.default_date_kind
    }

    /// Policy for unclaimed host objects.
    pub fn unknown_type_policy(&self) -> UnknownTypePolicy {
        self.unknown_type_policy
    }

    /// Map a host value to its semantic value.
    ///
    /// Wrapping an already-wrapped value is the identity. Scalars always
    /// succeed; containers follow the adapter/copy policy; opaque objects go
    /// through the extensions and then the unknown-type policy.
    ///
    /// # Errors
    ///
    /// [`ModelError::WrapFailure`] under [`UnknownTypePolicy::Refuse`],
    /// [`ModelError::AlreadyConsumed`] when eagerly draining a claimed
    /// iterator, and lock failures surfaced by copy construction.
    pub fn wrap(self: &Arc<Self>, host: Host) -> Result<Value, ModelError> {
        match host {
            Host::Model(value) => Ok(value),
            Host::Null => Ok(Value::Null),
            Host::Bool(true) => Ok(Value::TRUE),
            Host::Bool(false) => Ok(Value::FALSE),
            Host::Int(i) => Ok(Value::Number(Number::Int(i))),
            Host::Float(f) => Ok(Value::Number(Number::Float(f))),
            Host::Char(c) => Ok(Value::text(c.to_string())),
            Host::Str(s) => Ok(Value::text(s)),
            Host::Date(date) => Ok(Value::Date(match date {
                HostDate::Date(d) => DateValue::from_date(d),
                HostDate::Time(t) => DateValue::from_time(t),
                HostDate::Timestamp(ts) => DateValue::from_timestamp(ts),
                HostDate::Instant(ts) => DateValue::new(ts, self.default_date_kind),
            })),
            Host::List(list) => {
                if self.use_adapters {
                    Ok(Value::Seq(Arc::new(ListAdapter::new(list, self.clone()))))
                } else {
                    let copy = SimpleSeq::from_host_list(&list, self.clone())?;
                    Ok(Value::Seq(Arc::new(copy)))
                }
            }
            Host::Map(map) => {
                if self.use_adapters {
                    Ok(Value::Hash(Arc::new(MapAdapter::new(map, self.clone()))))
                } else {
                    let copy = SimpleHash::from_host_map(&map, self.clone())?;
                    Ok(Value::Hash(Arc::new(copy)))
                }
            }
            Host::SortedMap(map) => {
                if self.use_adapters {
                    Ok(Value::Hash(Arc::new(SortedMapAdapter::new(
                        map,
                        self.clone(),
                    ))))
                } else {
                    let copy = SimpleHash::from_sorted_host(&map, self.clone())?;
                    Ok(Value::Hash(Arc::new(copy)))
                }
            }
            Host::Set(set) => {
                if self.use_adapters && !self.force_legacy_non_list_collections {
                    Ok(Value::Collection(Arc::new(SetAdapter::new(
                        set,
                        self.clone(),
                    ))))
                } else {
                    // Legacy rendering: a non-list collection becomes an
                    // eager sequence snapshot.
                    let items = set.items_snapshot()?;
                    Ok(Value::Seq(Arc::new(SimpleSeq::from_hosts(
                        items,
                        self.clone(),
                    ))))
                }
            }
            Host::Array(array) => {
                if self.use_adapters {
                    Ok(Value::Seq(Arc::new(ArrayAdapter::new(array, self.clone()))))
                } else {
                    let items: Vec<Host> =
                        (0..array.len()).filter_map(|i| array.element_at(i)).collect();
                    Ok(Value::Seq(Arc::new(SimpleSeq::from_hosts(
                        items,
                        self.clone(),
                    ))))
                }
            }
            Host::Iter(handle) => {
                if self.use_adapters {
                    Ok(Value::Collection(Arc::new(IterAdapter::new(
                        handle,
                        self.clone(),
                    ))))
                } else {
                    let copy = SimpleSeq::from_iter_handle(&handle, self.clone())?;
                    Ok(Value::Seq(Arc::new(copy)))
                }
            }
            Host::Node(node) => Ok(Value::Node(Arc::new(NodeAdapter::new(node, self.clone())))),
            Host::Object(object) => {
                let host = Host::Object(object);
                for ext in &self.extensions {
                    if let Some(result) = ext.try_wrap(&host, self) {
                        return result;
                    }
                }
                let object = match host {
                    Host::Object(object) => object,
                    _ => unreachable!("host shape fixed above"),
                };
                match self.unknown_type_policy {
                    UnknownTypePolicy::Generic => Ok(Value::Hash(Arc::new(
                        GenericObjectModel::new(object, self.clone()),
                    ))),
                    UnknownTypePolicy::Refuse => {
                        trace!(type_name = object.type_name(), "refusing unknown host type");
                        Err(ModelError::wrap_failure(
                            object.type_name(),
                            "the wrapper is configured to refuse unknown types".to_string(),
                        ))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SetHost, TemplateObject};
    use chrono::{NaiveDate, Utc};
    use std::sync::RwLock;

    fn build(builder: ObjectWrapperBuilder) -> Arc<ObjectWrapper> {
        Arc::new(builder.build())
    }

    struct Opaque;

    impl TemplateObject for Opaque {
        fn type_name(&self) -> &'static str {
            "Opaque"
        }

        fn property_names(&self) -> Vec<String> {
            vec!["tag".to_string()]
        }

        fn get_property(&self, name: &str) -> Option<Host> {
            (name == "tag").then(|| Host::Str("opaque".to_string()))
        }
    }

    #[test]
    fn wrapping_a_wrapped_value_is_identity() {
        let wrapper = build(ObjectWrapperBuilder::new());
        let original = wrapper.wrap(Host::list(vec![Host::Int(1)])).unwrap();
        let again = wrapper.wrap(Host::Model(original.clone())).unwrap();
        // Identity, not a structural copy.
        assert_eq!(original, again);
    }

    #[test]
    fn scalars_route_directly() {
        let wrapper = build(ObjectWrapperBuilder::new());
        assert_eq!(wrapper.wrap(Host::Null).unwrap(), Value::Null);
        assert_eq!(wrapper.wrap(Host::Bool(true)).unwrap(), Value::TRUE);
        assert_eq!(wrapper.wrap(Host::Int(7)).unwrap(), Value::from(7i64));
        assert_eq!(wrapper.wrap(Host::Char('x')).unwrap(), Value::from("x"));
        assert_eq!(wrapper.wrap(Host::from("s")).unwrap(), Value::from("s"));
    }

    #[test]
    fn date_flavors_map_and_instants_take_the_default() {
        let wrapper = build(ObjectWrapperBuilder::new().default_date_kind(DateKind::DateTime));
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();

        let d = wrapper.wrap(Host::Date(HostDate::Date(day))).unwrap();
        assert_eq!(d.as_date().unwrap().kind(), DateKind::Date);

        let i = wrapper
            .wrap(Host::Date(HostDate::Instant(Utc::now())))
            .unwrap();
        assert_eq!(i.as_date().unwrap().kind(), DateKind::DateTime);
    }

    #[test]
    fn adapter_policy_keeps_container_views_live() {
        let wrapper = build(ObjectWrapperBuilder::new());
        let list = Arc::new(RwLock::new(vec![Host::Int(1)]));
        let value = wrapper.wrap(Host::List(list.clone())).unwrap();

        list.write().unwrap().push(Host::Int(2));
        assert_eq!(value.as_seq().unwrap().len().unwrap(), 2);
    }

    #[test]
    fn copy_policy_snapshots_containers() {
        let wrapper = build(ObjectWrapperBuilder::new().use_adapters(false));
        let list = Arc::new(RwLock::new(vec![Host::Int(1)]));
        let value = wrapper.wrap(Host::List(list.clone())).unwrap();

        list.write().unwrap().push(Host::Int(2));
        assert_eq!(value.as_seq().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn set_routing_follows_both_policy_flags() {
        let set = || {
            let s = SetHost::new();
            s.insert(Host::Int(1)).unwrap();
            Arc::new(s)
        };

        // Adapters on, legacy off: a true collection.
        let wrapper = build(ObjectWrapperBuilder::new());
        assert!(matches!(
            wrapper.wrap(Host::Set(set())).unwrap(),
            Value::Collection(_)
        ));

        // Legacy forced: an eager sequence even though adapters are on.
        let wrapper =
            build(ObjectWrapperBuilder::new().force_legacy_non_list_collections(true));
        assert!(matches!(
            wrapper.wrap(Host::Set(set())).unwrap(),
            Value::Seq(_)
        ));

        // Adapters off: also an eager sequence.
        let wrapper = build(ObjectWrapperBuilder::new().use_adapters(false));
        assert!(matches!(
            wrapper.wrap(Host::Set(set())).unwrap(),
            Value::Seq(_)
        ));
    }

    #[test]
    fn arrays_copy_to_sequences_without_adapters() {
        let wrapper = build(ObjectWrapperBuilder::new().use_adapters(false));
        let value = wrapper
            .wrap(Host::Array(crate::host::HostArray::I32(Arc::from(
                [1i32, 2, 3].as_slice(),
            ))))
            .unwrap();
        let seq = value.as_seq().unwrap();
        assert_eq!(seq.len().unwrap(), 3);
        assert_eq!(seq.get(2).unwrap(), Some(Value::from(3i64)));
    }

    #[test]
    fn eager_policy_drains_iterators() {
        let wrapper = build(ObjectWrapperBuilder::new().use_adapters(false));
        let value = wrapper
            .wrap(Host::iter(vec![Host::Int(1), Host::Int(2)].into_iter()))
            .unwrap();
        assert!(matches!(value, Value::Seq(_)));
        assert_eq!(value.as_seq().unwrap().len().unwrap(), 2);
    }

    #[test]
    fn unknown_objects_follow_the_policy() {
        let generic = build(ObjectWrapperBuilder::new());
        let value = generic.wrap(Host::Object(Arc::new(Opaque))).unwrap();
        assert_eq!(
            value.as_hash().unwrap().get("tag").unwrap(),
            Some(Value::from("opaque"))
        );

        let restrictive =
            build(ObjectWrapperBuilder::new().unknown_type_policy(UnknownTypePolicy::Refuse));
        let err = restrictive
            .wrap(Host::Object(Arc::new(Opaque)))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::WrapFailure {
                type_name: "Opaque",
                ..
            }
        ));
    }

    #[test]
    fn unknown_type_policy_serializes_as_token() {
        assert_eq!(
            serde_json::to_string(&UnknownTypePolicy::Refuse).unwrap(),
            "\"refuse\""
        );
        let p: UnknownTypePolicy = serde_json::from_str("\"generic\"").unwrap();
        assert_eq!(p, UnknownTypePolicy::Generic);
    }

    #[test]
    fn extensions_run_before_the_fallback() {
        struct ClaimOpaque;

        impl WrapExtension for ClaimOpaque {
            fn try_wrap(
                &self,
                host: &Host,
                _wrapper: &Arc<ObjectWrapper>,
            ) -> Option<Result<Value, ModelError>> {
                match host {
                    Host::Object(o) if o.type_name() == "Opaque" => {
                        Some(Ok(Value::from("claimed")))
                    }
                    _ => None,
                }
            }
        }

        let wrapper = build(
            ObjectWrapperBuilder::new()
                .unknown_type_policy(UnknownTypePolicy::Refuse)
                .extension(Arc::new(ClaimOpaque)),
        );
        // The extension claims the object even under the refuse policy.
        let value = wrapper.wrap(Host::Object(Arc::new(Opaque))).unwrap();
        assert_eq!(value, Value::from("claimed"));
    }
}
