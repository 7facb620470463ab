//! Host-side value classification.
//!
//! Everything the wrapper can be asked to wrap is first expressed as a
//! [`Host`] value - a closed shape classification computed once, so the
//! routing precedence in the wrapper is an exhaustive `match` instead of a
//! chain of type tests.
//!
//! Shared containers (`SharedList`, `SharedMap`, sorted maps, sets) are
//! `Arc`+`RwLock` handles: the host side keeps mutating them, and adapters
//! built over them observe those mutations. Primitive arrays are immutable
//! snapshots (`Arc<[T]>`), one variant per element kind.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use formwork_model::{ModelError, Value};

use crate::once::OnceHandle;

/// A key in a host map: either a string or a single character.
///
/// Character keys exist for hosts that index by `char`; the wrapper's
/// single-character string fallback bridges template-side string lookups to
/// them. That fallback is a compatibility behavior - see the map adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostKey {
    /// String key.
    Str(String),
    /// Character key.
    Char(char),
}

impl HostKey {
    /// The key rendered as the string a template would use to look it up.
    pub fn display_string(&self) -> String {
        match self {
            HostKey::Str(s) => s.clone(),
            HostKey::Char(c) => c.to_string(),
        }
    }

    /// Which kind of key this is.
    pub fn kind(&self) -> KeyKind {
        match self {
            HostKey::Str(_) => KeyKind::Str,
            HostKey::Char(_) => KeyKind::Char,
        }
    }
}

impl From<&str> for HostKey {
    fn from(s: &str) -> Self {
        HostKey::Str(s.to_string())
    }
}

impl From<String> for HostKey {
    fn from(s: String) -> Self {
        HostKey::Str(s)
    }
}

impl From<char> for HostKey {
    fn from(c: char) -> Self {
        HostKey::Char(c)
    }
}

/// Declared key kind of a sorted host map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Keys are strings.
    Str,
    /// Keys are single characters.
    Char,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Str => f.write_str("string"),
            KeyKind::Char => f.write_str("char"),
        }
    }
}

/// A shared, live host list. Adapters over it are views, not snapshots.
pub type SharedList = Arc<RwLock<Vec<Host>>>;

/// A shared, live host hash map.
pub type SharedMap = Arc<RwLock<HashMap<HostKey, Host>>>;

/// A sorted host map with a declared key kind.
///
/// Sorted hosts check key types strictly: probing with the wrong key kind is
/// a [`ModelError::LookupTypeMismatch`], which is why the wrapper's
/// single-character fallback is skipped for them.
pub struct SortedMapHost {
    kind: KeyKind,
    entries: RwLock<BTreeMap<HostKey, Host>>,
}

impl SortedMapHost {
    /// An empty sorted map accepting keys of `kind`.
    pub fn new(kind: KeyKind) -> Self {
        SortedMapHost {
            kind,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// The declared key kind.
    pub fn key_kind(&self) -> KeyKind {
        self.kind
    }

    /// Insert an entry. The key must match the declared kind.
    pub fn insert(&self, key: HostKey, value: Host) -> Result<(), ModelError> {
        if key.kind() != self.kind {
            return Err(ModelError::LookupTypeMismatch {
                key: key.display_string(),
                key_kind: match key.kind() {
                    KeyKind::Str => "string",
                    KeyKind::Char => "char",
                },
                container: "sorted map",
            });
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ModelError::HostPoisoned { operation: "insert" })?;
        entries.insert(key, value);
        Ok(())
    }

    /// Look up an entry. A key of the wrong kind is a type mismatch, the
    /// sorted-host analog of a failed comparison against a typed comparator.
    pub fn get(&self, key: &HostKey) -> Result<Option<Host>, ModelError> {
        if key.kind() != self.kind {
            return Err(ModelError::LookupTypeMismatch {
                key: key.display_string(),
                key_kind: match key.kind() {
                    KeyKind::Str => "string",
                    KeyKind::Char => "char",
                },
                container: "sorted map",
            });
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "get" })?;
        Ok(entries.get(key).cloned())
    }

    /// Whether the key is present. Same kind check as `get`.
    pub fn contains_key(&self, key: &HostKey) -> Result<bool, ModelError> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize, ModelError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "len" })?;
        Ok(entries.len())
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of the entries in sort order.
    pub fn entries_snapshot(&self) -> Result<Vec<(HostKey, Host)>, ModelError> {
        let entries = self.entries.read().map_err(|_| ModelError::HostPoisoned {
            operation: "entries_snapshot",
        })?;
        Ok(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Access to the raw lock, for copy construction.
    pub(crate) fn raw_entries(&self) -> &RwLock<BTreeMap<HostKey, Host>> {
        &self.entries
    }
}

/// An unordered, non-indexable host collection (set semantics).
pub struct SetHost {
    items: RwLock<Vec<Host>>,
}

impl SetHost {
    /// An empty set.
    pub fn new() -> Self {
        SetHost {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Insert an item unless an equal one is already present.
    pub fn insert(&self, item: Host) -> Result<bool, ModelError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| ModelError::HostPoisoned { operation: "insert" })?;
        if items.contains(&item) {
            return Ok(false);
        }
        items.push(item);
        Ok(true)
    }

    /// Host-level membership test.
    pub fn contains(&self, item: &Host) -> Result<bool, ModelError> {
        let items = self.items.read().map_err(|_| ModelError::HostPoisoned {
            operation: "contains",
        })?;
        Ok(items.contains(item))
    }

    /// Number of items.
    pub fn len(&self) -> Result<usize, ModelError> {
        let items = self
            .items
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "len" })?;
        Ok(items.len())
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of the items, in no guaranteed order.
    pub fn items_snapshot(&self) -> Result<Vec<Host>, ModelError> {
        let items = self.items.read().map_err(|_| ModelError::HostPoisoned {
            operation: "items_snapshot",
        })?;
        Ok(items.clone())
    }

    /// Poison the items lock by panicking a writer, for failure-path tests.
    #[cfg(test)]
    pub(crate) fn poison_items(&self) {
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = self.items.write();
                    panic!("poisoning items lock");
                })
                .join()
        });
    }
}

impl Default for SetHost {
    fn default() -> Self {
        SetHost::new()
    }
}

/// A primitive host array, one variant per element kind.
///
/// This is the closed set of element-access strategies the array adapter is
/// parameterized over: `len`/`element_at` do the per-kind dispatch once,
/// instead of one adapter type per primitive kind.
#[derive(Clone)]
pub enum HostArray {
    /// `i8` elements.
    I8(Arc<[i8]>),
    /// `i16` elements.
    I16(Arc<[i16]>),
    /// `i32` elements.
    I32(Arc<[i32]>),
    /// `i64` elements.
    I64(Arc<[i64]>),
    /// `u8` elements.
    U8(Arc<[u8]>),
    /// `f32` elements.
    F32(Arc<[f32]>),
    /// `f64` elements.
    F64(Arc<[f64]>),
    /// `bool` elements.
    Bool(Arc<[bool]>),
    /// `char` elements.
    Char(Arc<[char]>),
    /// Arbitrary host elements (the generic fallback).
    Generic(Arc<[Host]>),
}

impl HostArray {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            HostArray::I8(a) => a.len(),
            HostArray::I16(a) => a.len(),
            HostArray::I32(a) => a.len(),
            HostArray::I64(a) => a.len(),
            HostArray::U8(a) => a.len(),
            HostArray::F32(a) => a.len(),
            HostArray::F64(a) => a.len(),
            HostArray::Bool(a) => a.len(),
            HostArray::Char(a) => a.len(),
            HostArray::Generic(a) => a.len(),
        }
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index` lifted to a `Host`, or `None` out of range.
    pub fn element_at(&self, index: usize) -> Option<Host> {
        match self {
            HostArray::I8(a) => a.get(index).map(|v| Host::Int(*v as i64)),
            HostArray::I16(a) => a.get(index).map(|v| Host::Int(*v as i64)),
            HostArray::I32(a) => a.get(index).map(|v| Host::Int(*v as i64)),
            HostArray::I64(a) => a.get(index).map(|v| Host::Int(*v)),
            HostArray::U8(a) => a.get(index).map(|v| Host::Int(*v as i64)),
            HostArray::F32(a) => a.get(index).map(|v| Host::Float(*v as f64)),
            HostArray::F64(a) => a.get(index).map(|v| Host::Float(*v)),
            HostArray::Bool(a) => a.get(index).map(|v| Host::Bool(*v)),
            HostArray::Char(a) => a.get(index).map(|v| Host::Char(*v)),
            HostArray::Generic(a) => a.get(index).cloned(),
        }
    }

    fn ptr_eq(&self, other: &HostArray) -> bool {
        match (self, other) {
            (HostArray::I8(a), HostArray::I8(b)) => Arc::ptr_eq(a, b),
            (HostArray::I16(a), HostArray::I16(b)) => Arc::ptr_eq(a, b),
            (HostArray::I32(a), HostArray::I32(b)) => Arc::ptr_eq(a, b),
            (HostArray::I64(a), HostArray::I64(b)) => Arc::ptr_eq(a, b),
            (HostArray::U8(a), HostArray::U8(b)) => Arc::ptr_eq(a, b),
            (HostArray::F32(a), HostArray::F32(b)) => Arc::ptr_eq(a, b),
            (HostArray::F64(a), HostArray::F64(b)) => Arc::ptr_eq(a, b),
            (HostArray::Bool(a), HostArray::Bool(b)) => Arc::ptr_eq(a, b),
            (HostArray::Char(a), HostArray::Char(b)) => Arc::ptr_eq(a, b),
            (HostArray::Generic(a), HostArray::Generic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A host-side date/time flavor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostDate {
    /// A calendar day (maps to the DATE flavor).
    Date(NaiveDate),
    /// A wall-clock time (maps to the TIME flavor).
    Time(NaiveTime),
    /// A full timestamp (maps to the DATETIME flavor).
    Timestamp(DateTime<Utc>),
    /// A generic instant; the wrapper's configured default flavor applies.
    Instant(DateTime<Utc>),
}

/// A host object exposing named properties and methods.
///
/// There is no runtime reflection to discover properties with, so host
/// types opt in by implementing this trait; the wrapper's unknown-type
/// fallback then exposes them as a hash of properties and callable methods.
pub trait TemplateObject: Send + Sync {
    /// Host-side type description, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Names of the readable properties.
    fn property_names(&self) -> Vec<String>;

    /// Read a property by name. `None` means no such property.
    fn get_property(&self, name: &str) -> Option<Host>;

    /// Names of the callable methods. Empty by default.
    fn method_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Call a method by name. `None` means no such method.
    fn call_method(&self, name: &str, args: &[Host]) -> Option<Result<Host, ModelError>> {
        let _ = (name, args);
        None
    }
}

/// A host object that is a navigable tree node.
pub trait TemplateNode: Send + Sync {
    /// The node's name.
    fn name(&self) -> String;

    /// The node's type tag (element, text, ...), free-form.
    fn node_type(&self) -> String;

    /// The parent node, if any.
    fn parent(&self) -> Option<Arc<dyn TemplateNode>>;

    /// Child nodes in document order.
    fn children(&self) -> Vec<Arc<dyn TemplateNode>>;

    /// Named attributes, surfaced through the node's hash facet.
    fn attributes(&self) -> Vec<(String, Host)> {
        Vec::new()
    }
}

/// A host value, classified by shape.
///
/// Computed once per wrap call; the wrapper's routing is an exhaustive
/// `match` over this enum, so adding a shape without deciding its routing is
/// a compile error.
#[derive(Clone)]
pub enum Host {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer (any host width, already widened).
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A single character.
    Char(char),
    /// A string.
    Str(String),
    /// A date/time flavor.
    Date(HostDate),
    /// A shared, live, ordered and indexable container.
    List(SharedList),
    /// A shared, live hash map.
    Map(SharedMap),
    /// A shared, live sorted map with strict key typing.
    SortedMap(Arc<SortedMapHost>),
    /// A shared, live unordered collection.
    Set(Arc<SetHost>),
    /// A primitive array snapshot.
    Array(HostArray),
    /// A single-consumption iteration source.
    Iter(OnceHandle),
    /// A navigable tree node.
    Node(Arc<dyn TemplateNode>),
    /// An opaque object with named properties and methods.
    Object(Arc<dyn TemplateObject>),
    /// An already-wrapped semantic value (wrap is the identity on these).
    Model(Value),
}

impl Host {
    /// Build a shared list host from plain elements.
    pub fn list(items: Vec<Host>) -> Self {
        Host::List(Arc::new(RwLock::new(items)))
    }

    /// Build a shared hash map host from key/value pairs.
    pub fn map(entries: Vec<(HostKey, Host)>) -> Self {
        Host::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    /// Build a single-consumption iteration host.
    pub fn iter<I>(source: I) -> Self
    where
        I: Iterator<Item = Host> + Send + 'static,
    {
        Host::Iter(OnceHandle::new(source))
    }

    /// Short tag naming the shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Host::Null => "null",
            Host::Bool(_) => "bool",
            Host::Int(_) => "integer",
            Host::Float(_) => "float",
            Host::Char(_) => "char",
            Host::Str(_) => "string",
            Host::Date(_) => "date",
            Host::List(_) => "list",
            Host::Map(_) => "map",
            Host::SortedMap(_) => "sorted map",
            Host::Set(_) => "set",
            Host::Array(_) => "array",
            Host::Iter(_) => "iterator",
            Host::Node(_) => "node",
            Host::Object(_) => "object",
            Host::Model(_) => "model",
        }
    }
}

/// Scalars compare structurally; shared containers, nodes, objects, and
/// iteration handles compare by identity. Used by set membership tests.
impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Host::Null, Host::Null) => true,
            (Host::Bool(a), Host::Bool(b)) => a == b,
            (Host::Int(a), Host::Int(b)) => a == b,
            (Host::Float(a), Host::Float(b)) => a == b,
            (Host::Char(a), Host::Char(b)) => a == b,
            (Host::Str(a), Host::Str(b)) => a == b,
            (Host::Date(a), Host::Date(b)) => a == b,
            (Host::List(a), Host::List(b)) => Arc::ptr_eq(a, b),
            (Host::Map(a), Host::Map(b)) => Arc::ptr_eq(a, b),
            (Host::SortedMap(a), Host::SortedMap(b)) => Arc::ptr_eq(a, b),
            (Host::Set(a), Host::Set(b)) => Arc::ptr_eq(a, b),
            (Host::Array(a), Host::Array(b)) => a.ptr_eq(b),
            (Host::Iter(a), Host::Iter(b)) => a.same_handle(b),
            (Host::Node(a), Host::Node(b)) => Arc::ptr_eq(a, b),
            (Host::Object(a), Host::Object(b)) => Arc::ptr_eq(a, b),
            (Host::Model(a), Host::Model(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Bool(b) => write!(f, "Bool({})", b),
            Host::Int(i) => write!(f, "Int({})", i),
            Host::Float(v) => write!(f, "Float({})", v),
            Host::Char(c) => write!(f, "Char({:?})", c),
            Host::Str(s) => write!(f, "Str({:?})", s),
            Host::Date(d) => write!(f, "Date({:?})", d),
            Host::Model(v) => write!(f, "Model({:?})", v),
            other => f.write_str(other.kind_name()),
        }
    }
}

impl From<bool> for Host {
    fn from(v: bool) -> Self {
        Host::Bool(v)
    }
}

impl From<i32> for Host {
    fn from(v: i32) -> Self {
        Host::Int(v as i64)
    }
}

impl From<i64> for Host {
    fn from(v: i64) -> Self {
        Host::Int(v)
    }
}

impl From<f64> for Host {
    fn from(v: f64) -> Self {
        Host::Float(v)
    }
}

impl From<char> for Host {
    fn from(v: char) -> Self {
        Host::Char(v)
    }
}

impl From<&str> for Host {
    fn from(v: &str) -> Self {
        Host::Str(v.to_string())
    }
}

impl From<String> for Host {
    fn from(v: String) -> Self {
        Host::Str(v)
    }
}

impl From<Value> for Host {
    fn from(v: Value) -> Self {
        Host::Model(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_map_rejects_wrong_key_kind() {
        let map = SortedMapHost::new(KeyKind::Char);
        map.insert(HostKey::Char('x'), Host::Int(1)).unwrap();

        let err = map.get(&HostKey::Str("x".to_string())).unwrap_err();
        assert!(matches!(err, ModelError::LookupTypeMismatch { .. }));

        let err = map.insert(HostKey::Str("y".to_string()), Host::Int(2));
        assert!(err.is_err());
    }

    #[test]
    fn sorted_map_round_trips_matching_kind() {
        let map = SortedMapHost::new(KeyKind::Str);
        map.insert(HostKey::from("b"), Host::Int(2)).unwrap();
        map.insert(HostKey::from("a"), Host::Int(1)).unwrap();

        assert_eq!(map.get(&HostKey::from("a")).unwrap(), Some(Host::Int(1)));
        assert_eq!(map.get(&HostKey::from("c")).unwrap(), None);

        // Snapshot preserves sort order.
        let snap = map.entries_snapshot().unwrap();
        assert_eq!(snap[0].0, HostKey::from("a"));
        assert_eq!(snap[1].0, HostKey::from("b"));
    }

    #[test]
    fn set_deduplicates_on_insert() {
        let set = SetHost::new();
        assert!(set.insert(Host::Int(1)).unwrap());
        assert!(!set.insert(Host::Int(1)).unwrap());
        assert_eq!(set.len().unwrap(), 1);
        assert!(set.contains(&Host::Int(1)).unwrap());
        assert!(!set.contains(&Host::Str("1".to_string())).unwrap());
    }

    #[test]
    fn array_access_lifts_primitive_kinds() {
        let a = HostArray::I8(Arc::from([1i8, 2, 3].as_slice()));
        assert_eq!(a.len(), 3);
        assert_eq!(a.element_at(1), Some(Host::Int(2)));
        assert_eq!(a.element_at(9), None);

        let b = HostArray::Bool(Arc::from([true].as_slice()));
        assert_eq!(b.element_at(0), Some(Host::Bool(true)));

        let f = HostArray::F32(Arc::from([0.5f32].as_slice()));
        assert_eq!(f.element_at(0), Some(Host::Float(0.5)));
    }

    #[test]
    fn host_equality_is_identity_for_containers() {
        let list = Arc::new(RwLock::new(vec![Host::Int(1)]));
        let a = Host::List(list.clone());
        let b = Host::List(list);
        let c = Host::list(vec![Host::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Host::from("x"), Host::Str("x".to_string()));
    }

    #[test]
    fn host_key_display_matches_template_lookup() {
        assert_eq!(HostKey::from('x').display_string(), "x");
        assert_eq!(HostKey::from("abc").display_string(), "abc");
        assert_eq!(HostKey::from('x').kind(), KeyKind::Char);
    }
}
