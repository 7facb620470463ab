//! Adapters - live views over host containers.
//!
//! An adapter borrows the host container (through its shared handle) and
//! wraps elements on demand; it never copies. Reads always reflect the host
//! container's current state, and the adapter itself is stateless beyond
//! the two references it was constructed with: the host container and the
//! wrapper used for elements.

use std::sync::Arc;

use formwork_model::{
    CollectionModel, HashModel, ModelCursor, ModelError, SeqModel, Value,
};

use crate::host::{Host, HostArray, HostKey, KeyKind, SetHost, SharedList, SharedMap, SortedMapHost};
use crate::unwrap::unwrap_scalar;
use crate::wrapper::ObjectWrapper;

/// Sequence view over a shared host list.
pub struct ListAdapter {
    list: SharedList,
    wrapper: Arc<ObjectWrapper>,
}

impl ListAdapter {
    /// Adapt a shared list; elements are wrapped lazily with `wrapper`.
    pub fn new(list: SharedList, wrapper: Arc<ObjectWrapper>) -> Self {
        ListAdapter { list, wrapper }
    }
}

impl SeqModel for ListAdapter {
    fn get(&self, index: usize) -> Result<Option<Value>, ModelError> {
        let items = self
            .list
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "get" })?;
        match items.get(index) {
            // Out-of-range reads are "absent", not an error.
            None => Ok(None),
            Some(item) => {
                let item = item.clone();
                drop(items);
                self.wrapper.wrap(item).map(Some)
            }
        }
    }

    fn len(&self) -> Result<usize, ModelError> {
        let items = self
            .list
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "len" })?;
        Ok(items.len())
    }
}

/// Hash view over a shared host hash map.
pub struct MapAdapter {
    map: SharedMap,
    wrapper: Arc<ObjectWrapper>,
}

impl MapAdapter {
    /// Adapt a shared hash map; values are wrapped lazily with `wrapper`.
    pub fn new(map: SharedMap, wrapper: Arc<ObjectWrapper>) -> Self {
        MapAdapter { map, wrapper }
    }
}

impl HashModel for MapAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        let entries = self
            .map
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "get" })?;

        let found = match entries.get(&HostKey::Str(key.to_string())) {
            Some(v) => Some(v.clone()),
            // Single-character fallback: the host may index by char rather
            // than string. Compatibility behavior; see DESIGN.md.
            None => match single_char(key) {
                Some(c) => entries.get(&HostKey::Char(c)).cloned(),
                None => None,
            },
        };
        drop(entries);

        match found {
            Some(host) => self.wrapper.wrap(host).map(Some),
            None => Ok(None),
        }
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        let entries = self.map.read().map_err(|_| ModelError::HostPoisoned {
            operation: "contains_key",
        })?;
        if entries.contains_key(&HostKey::Str(key.to_string())) {
            return Ok(true);
        }
        Ok(match single_char(key) {
            Some(c) => entries.contains_key(&HostKey::Char(c)),
            None => false,
        })
    }

    fn len(&self) -> Result<usize, ModelError> {
        let entries = self
            .map
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "len" })?;
        Ok(entries.len())
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        let entries = self
            .map
            .read()
            .map_err(|_| ModelError::HostPoisoned { operation: "keys" })?;
        Ok(entries
            .keys()
            .map(|k| Value::text(k.display_string()))
            .collect())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        let snapshot: Vec<Host> = {
            let entries = self
                .map
                .read()
                .map_err(|_| ModelError::HostPoisoned { operation: "values" })?;
            entries.values().cloned().collect()
        };
        snapshot
            .into_iter()
            .map(|host| self.wrapper.wrap(host))
            .collect()
    }
}

/// Hash view over a sorted host map.
///
/// Sorted hosts check key types strictly, so the single-character fallback
/// is skipped here: a string probe against a char-keyed sorted host returns
/// "not found" instead of risking a type-incompatible comparison.
pub struct SortedMapAdapter {
    map: Arc<SortedMapHost>,
    wrapper: Arc<ObjectWrapper>,
}

impl SortedMapAdapter {
    /// Adapt a sorted host map.
    pub fn new(map: Arc<SortedMapHost>, wrapper: Arc<ObjectWrapper>) -> Self {
        SortedMapAdapter { map, wrapper }
    }
}

impl HashModel for SortedMapAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        // No char retry: only probe with the key kind the host declares.
        let found = match self.map.key_kind() {
            KeyKind::Str => self.map.get(&HostKey::Str(key.to_string()))?,
            KeyKind::Char => None,
        };
        match found {
            Some(host) => self.wrapper.wrap(host).map(Some),
            None => Ok(None),
        }
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        match self.map.key_kind() {
            KeyKind::Str => self.map.contains_key(&HostKey::Str(key.to_string())),
            KeyKind::Char => Ok(false),
        }
    }

    fn len(&self) -> Result<usize, ModelError> {
        self.map.len()
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        Ok(self
            .map
            .entries_snapshot()?
            .into_iter()
            .map(|(k, _)| Value::text(k.display_string()))
            .collect())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        self.map
            .entries_snapshot()?
            .into_iter()
            .map(|(_, v)| self.wrapper.wrap(v))
            .collect()
    }
}

/// Sequence view over a primitive array.
///
/// One adapter type for all element kinds: the [`HostArray`] it holds is
/// the element-access strategy, selected when the host value was
/// classified.
pub struct ArrayAdapter {
    array: HostArray,
    wrapper: Arc<ObjectWrapper>,
}

impl ArrayAdapter {
    /// Adapt a primitive array.
    pub fn new(array: HostArray, wrapper: Arc<ObjectWrapper>) -> Self {
        ArrayAdapter { array, wrapper }
    }
}

impl SeqModel for ArrayAdapter {
    fn get(&self, index: usize) -> Result<Option<Value>, ModelError> {
        match self.array.element_at(index) {
            Some(host) => self.wrapper.wrap(host).map(Some),
            None => Ok(None),
        }
    }

    fn len(&self) -> Result<usize, ModelError> {
        Ok(self.array.len())
    }
}

/// Collection view over a non-list host collection.
pub struct SetAdapter {
    set: Arc<SetHost>,
    wrapper: Arc<ObjectWrapper>,
}

impl SetAdapter {
    /// Adapt a host set.
    pub fn new(set: Arc<SetHost>, wrapper: Arc<ObjectWrapper>) -> Self {
        SetAdapter { set, wrapper }
    }
}

impl CollectionModel for SetAdapter {
    fn cursor(&self) -> Box<dyn ModelCursor> {
        // Ordering is whatever the host yields; the snapshot is taken at
        // cursor creation. A snapshot failure is carried into the cursor
        // and surfaced on first use, never flattened into an empty
        // iteration.
        let items = self.set.items_snapshot().map(Vec::into_iter);
        Box::new(SetCursor {
            items,
            wrapper: self.wrapper.clone(),
        })
    }

    fn contains(&self, value: &Value) -> Result<bool, ModelError> {
        // Relate the template value back to the host element space first; a
        // value with no host form is an error, not a silent false.
        let host = unwrap_scalar(value)?;
        self.set.contains(&host)
    }

    fn len(&self) -> Result<usize, ModelError> {
        self.set.len()
    }
}

struct SetCursor {
    items: Result<std::vec::IntoIter<Host>, ModelError>,
    wrapper: Arc<ObjectWrapper>,
}

impl SetCursor {
    fn items(&mut self) -> Result<&mut std::vec::IntoIter<Host>, ModelError> {
        match &mut self.items {
            Ok(iter) => Ok(iter),
            Err(ModelError::HostPoisoned { operation }) => {
                Err(ModelError::HostPoisoned {
                    operation: *operation,
                })
            }
            Err(_) => Err(ModelError::HostPoisoned {
                operation: "set snapshot",
            }),
        }
    }
}

impl ModelCursor for SetCursor {
    fn has_next(&mut self) -> Result<bool, ModelError> {
        Ok(!self.items()?.as_slice().is_empty())
    }

    fn next(&mut self) -> Result<Option<Value>, ModelError> {
        match self.items()?.next() {
            Some(host) => self.wrapper.wrap(host).map(Some),
            None => Ok(None),
        }
    }
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::ObjectWrapperBuilder;
    use std::sync::RwLock;

    fn wrapper() -> Arc<ObjectWrapper> {
        Arc::new(ObjectWrapperBuilder::new().build())
    }

    #[test]
    fn list_adapter_is_a_live_view() {
        let list: SharedList = Arc::new(RwLock::new(vec![Host::Int(1)]));
        let adapter = ListAdapter::new(list.clone(), wrapper());

        assert_eq!(adapter.len().unwrap(), 1);
        list.write().unwrap().push(Host::Int(2));
        assert_eq!(adapter.len().unwrap(), 2);
        assert_eq!(adapter.get(1).unwrap(), Some(Value::from(2i64)));
    }

    #[test]
    fn list_adapter_tolerates_out_of_range_reads() {
        let list: SharedList = Arc::new(RwLock::new(vec![Host::Int(1)]));
        let adapter = ListAdapter::new(list, wrapper());
        assert_eq!(adapter.get(99).unwrap(), None);
    }

    #[test]
    fn map_adapter_retries_single_char_keys() {
        let map: SharedMap = Arc::new(RwLock::new(
            [(HostKey::Char('x'), Host::Int(1))].into_iter().collect(),
        ));
        let adapter = MapAdapter::new(map, wrapper());

        assert_eq!(adapter.get("x").unwrap(), Some(Value::from(1i64)));
        assert!(adapter.contains_key("x").unwrap());
        assert_eq!(adapter.get("xy").unwrap(), None);
    }

    #[test]
    fn map_adapter_distinguishes_null_from_absent() {
        let map: SharedMap = Arc::new(RwLock::new(
            [(HostKey::from("present"), Host::Null)].into_iter().collect(),
        ));
        let adapter = MapAdapter::new(map, wrapper());

        assert_eq!(adapter.get("present").unwrap(), Some(Value::Null));
        assert_eq!(adapter.get("absent").unwrap(), None);
        assert!(adapter.contains_key("present").unwrap());
    }

    #[test]
    fn sorted_adapter_skips_char_retry() {
        let host = SortedMapHost::new(KeyKind::Char);
        host.insert(HostKey::Char('x'), Host::Int(1)).unwrap();
        let adapter = SortedMapAdapter::new(Arc::new(host), wrapper());

        // No error, no char retry: simply not found.
        assert_eq!(adapter.get("x").unwrap(), None);
        assert!(!adapter.contains_key("x").unwrap());
    }

    #[test]
    fn sorted_adapter_reads_string_keys_in_order() {
        let host = SortedMapHost::new(KeyKind::Str);
        host.insert(HostKey::from("b"), Host::Int(2)).unwrap();
        host.insert(HostKey::from("a"), Host::Int(1)).unwrap();
        let adapter = SortedMapAdapter::new(Arc::new(host), wrapper());

        assert_eq!(adapter.get("a").unwrap(), Some(Value::from(1i64)));
        let keys = adapter.keys().unwrap();
        assert_eq!(keys[0].as_str(), Some("a"));
        assert_eq!(keys[1].as_str(), Some("b"));
    }

    #[test]
    fn array_adapter_wraps_each_kind() {
        let adapter = ArrayAdapter::new(
            HostArray::F64(Arc::from([1.5f64, 2.5].as_slice())),
            wrapper(),
        );
        assert_eq!(adapter.len().unwrap(), 2);
        assert_eq!(adapter.get(0).unwrap(), Some(Value::from(1.5f64)));
        assert_eq!(adapter.get(5).unwrap(), None);
    }

    #[test]
    fn set_adapter_contains_unwraps_first() {
        let set = Arc::new(SetHost::new());
        set.insert(Host::Int(3)).unwrap();
        let adapter = SetAdapter::new(set, wrapper());

        assert!(adapter.contains(&Value::from(3i64)).unwrap());
        assert!(!adapter.contains(&Value::from("3")).unwrap());
    }

    #[test]
    fn set_adapter_contains_rejects_unrelatable_values() {
        let set = Arc::new(SetHost::new());
        let adapter = SetAdapter::new(set.clone(), wrapper());

        let seq = SetAdapter::new(set, wrapper());
        let err = adapter
            .contains(&Value::Collection(Arc::new(seq)))
            .unwrap_err();
        assert!(matches!(err, ModelError::LookupTypeMismatch { .. }));
    }

    #[test]
    fn set_cursor_surfaces_poisoned_hosts() {
        let set = Arc::new(SetHost::new());
        set.insert(Host::Int(1)).unwrap();
        set.poison_items();
        let adapter = SetAdapter::new(set, wrapper());

        // A failed snapshot is an error on first use, not an empty
        // iteration.
        let mut cursor = adapter.cursor();
        assert!(matches!(
            cursor.has_next().unwrap_err(),
            ModelError::HostPoisoned { .. }
        ));
        assert!(matches!(
            cursor.next().unwrap_err(),
            ModelError::HostPoisoned { .. }
        ));
    }

    #[test]
    fn set_cursor_yields_wrapped_items() {
        let set = Arc::new(SetHost::new());
        set.insert(Host::Str("a".to_string())).unwrap();
        let adapter = SetAdapter::new(set, wrapper());

        let mut cursor = adapter.cursor();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap(), Some(Value::from("a")));
        assert!(!cursor.has_next().unwrap());
    }
}
