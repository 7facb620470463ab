//! Copying containers - eager snapshots with lazy element wrapping.
//!
//! Where adapters stay views, [`SimpleHash`] and [`SimpleSeq`] copy the host
//! container once at construction and own the copy. Elements stay in host
//! form until first read, at which point the wrapped form is memoized in
//! place, so repeated reads of the same entry return the identical value.
//!
//! Copy construction races against host-side writers: it first tries a
//! non-blocking read of the host lock, and on contention backs off briefly
//! and retries once with a blocking read before giving up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, TryLockError};
use std::thread;
use std::time::Duration;

use formwork_model::{HashModel, ModelError, SeqModel, Value};
use tracing::debug;

use crate::host::{Host, HostKey, SharedList, SharedMap, SortedMapHost};
use crate::once::OnceHandle;
use crate::unwrap::deep_unwrap;
use crate::wrapper::ObjectWrapper;

const COPY_RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Take a read guard on a host lock, tolerating one moment of contention.
fn read_with_retry<'a, T>(
    lock: &'a RwLock<T>,
    operation: &'static str,
) -> Result<RwLockReadGuard<'a, T>, ModelError> {
    match lock.try_read() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(_)) => Err(ModelError::HostPoisoned { operation }),
        Err(TryLockError::WouldBlock) => {
            debug!(operation, "host container contended, retrying copy once");
            thread::sleep(COPY_RETRY_BACKOFF);
            lock.read()
                .map_err(|_| ModelError::HostPoisoned { operation })
        }
    }
}

/// An element of a copying container: host form until first read.
#[derive(Clone)]
enum Slot {
    Raw(Host),
    Wrapped(Value),
}

enum Backing {
    Hash(HashMap<HostKey, Slot>),
    Sorted(BTreeMap<HostKey, Slot>),
}

impl Backing {
    fn get(&self, key: &HostKey) -> Option<&Slot> {
        match self {
            Backing::Hash(m) => m.get(key),
            Backing::Sorted(m) => m.get(key),
        }
    }

    fn insert(&mut self, key: HostKey, slot: Slot) {
        match self {
            Backing::Hash(m) => {
                m.insert(key, slot);
            }
            Backing::Sorted(m) => {
                m.insert(key, slot);
            }
        }
    }

    fn remove(&mut self, key: &HostKey) -> Option<Slot> {
        match self {
            Backing::Hash(m) => m.remove(key),
            Backing::Sorted(m) => m.remove(key),
        }
    }

    fn contains(&self, key: &HostKey) -> bool {
        match self {
            Backing::Hash(m) => m.contains_key(key),
            Backing::Sorted(m) => m.contains_key(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            Backing::Hash(m) => m.len(),
            Backing::Sorted(m) => m.len(),
        }
    }

    fn keys(&self) -> Vec<HostKey> {
        match self {
            Backing::Hash(m) => m.keys().cloned().collect(),
            Backing::Sorted(m) => m.keys().cloned().collect(),
        }
    }
}

/// An eager-copy hash with lazy, memoizing element wrapping.
///
/// Mutations (`put`, `remove`) affect only this copy, never the host
/// container it was built from. The memoization write-back is best effort:
/// if the backing lock is poisoned when writing back, a latch permanently
/// disables memoization for this instance and reads continue unmemoized.
pub struct SimpleHash {
    wrapper: Arc<ObjectWrapper>,
    entries: RwLock<Backing>,
    put_failed: AtomicBool,
    /// Deep-unwrapped export, invalidated by every mutation.
    unwrapped: RwLock<Option<Arc<HashMap<HostKey, Host>>>>,
    /// Lock the synchronized wrapper serializes through.
    op_lock: Mutex<()>,
}

impl SimpleHash {
    /// An empty hash backed by an unordered map.
    pub fn new(wrapper: Arc<ObjectWrapper>) -> Self {
        SimpleHash {
            wrapper,
            entries: RwLock::new(Backing::Hash(HashMap::new())),
            put_failed: AtomicBool::new(false),
            unwrapped: RwLock::new(None),
            op_lock: Mutex::new(()),
        }
    }

    /// Copy a shared host map. The copy is taken under the host's read lock
    /// with the retry-once discipline.
    pub fn from_host_map(map: &SharedMap, wrapper: Arc<ObjectWrapper>) -> Result<Self, ModelError> {
        let entries = read_with_retry(map, "hash copy construction")?;
        let backing = Backing::Hash(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), Slot::Raw(v.clone())))
                .collect(),
        );
        drop(entries);
        Ok(SimpleHash {
            wrapper,
            entries: RwLock::new(backing),
            put_failed: AtomicBool::new(false),
            unwrapped: RwLock::new(None),
            op_lock: Mutex::new(()),
        })
    }

    /// Copy a sorted host map, preserving key order in the copy.
    pub fn from_sorted_host(
        map: &SortedMapHost,
        wrapper: Arc<ObjectWrapper>,
    ) -> Result<Self, ModelError> {
        let entries = read_with_retry(map.raw_entries(), "hash copy construction")?;
        let backing = Backing::Sorted(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), Slot::Raw(v.clone())))
                .collect(),
        );
        drop(entries);
        Ok(SimpleHash {
            wrapper,
            entries: RwLock::new(backing),
            put_failed: AtomicBool::new(false),
            unwrapped: RwLock::new(None),
            op_lock: Mutex::new(()),
        })
    }

    /// Insert or replace an entry, in host form.
    pub fn put(&self, key: impl Into<HostKey>, value: Host) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), Slot::Raw(value));
        drop(entries);
        self.invalidate_unwrapped();
    }

    /// Insert or replace an entry with an already-wrapped value.
    pub fn put_value(&self, key: impl Into<HostKey>, value: Value) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), Slot::Wrapped(value));
        drop(entries);
        self.invalidate_unwrapped();
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove(&self, key: &HostKey) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(key).is_some();
        drop(entries);
        if removed {
            self.invalidate_unwrapped();
        }
        removed
    }

    /// Export the entries in host form, deep-unwrapping wrapped slots.
    ///
    /// The export is cached and shared until the next mutation.
    pub fn to_map(&self) -> Result<Arc<HashMap<HostKey, Host>>, ModelError> {
        {
            let cached = self
                .unwrapped
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(map) = cached.as_ref() {
                return Ok(map.clone());
            }
        }
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut out = HashMap::with_capacity(entries.len());
        for key in entries.keys() {
            let host = match entries.get(&key) {
                Some(Slot::Raw(host)) => host.clone(),
                Some(Slot::Wrapped(value)) => deep_unwrap(value)?,
                None => continue,
            };
            out.insert(key, host);
        }
        drop(entries);
        let out = Arc::new(out);
        let mut cached = self
            .unwrapped
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cached = Some(out.clone());
        Ok(out)
    }

    /// A view over the same entries that serializes every operation through
    /// a lock owned by this instance, so independent synchronized views of
    /// one hash serialize against each other.
    pub fn synchronized(self: &Arc<Self>) -> SyncHash {
        SyncHash {
            inner: self.clone(),
        }
    }

    fn invalidate_unwrapped(&self) {
        let mut cached = self
            .unwrapped
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cached = None;
    }

    /// Find the slot for a template-side string key, with the
    /// single-character fallback, and report the key it was found under.
    fn find_slot(&self, key: &str) -> Result<Option<(HostKey, Slot)>, ModelError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let str_key = HostKey::Str(key.to_string());
        if let Some(slot) = entries.get(&str_key) {
            return Ok(Some((str_key, slot.clone())));
        }
        // Sorted backings type-check keys strictly, so the char retry is
        // skipped for them, same as the sorted-map adapter.
        if matches!(*entries, Backing::Sorted(_)) {
            return Ok(None);
        }
        let mut chars = key.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            let char_key = HostKey::Char(c);
            if let Some(slot) = entries.get(&char_key) {
                return Ok(Some((char_key, slot.clone())));
            }
        }
        Ok(None)
    }

    /// Write the wrapped form back under the key the raw slot was found at.
    /// Best effort only: contention skips, poison latches `put_failed`.
    fn memoize(&self, put_key: HostKey, value: &Value) {
        if self.put_failed.load(Ordering::Relaxed) {
            return;
        }
        match self.entries.try_write() {
            Ok(mut entries) => {
                // Replace only if the slot is still raw; a concurrent `put`
                // must not be undone.
                if matches!(entries.get(&put_key), Some(Slot::Raw(_))) {
                    entries.insert(put_key, Slot::Wrapped(value.clone()));
                }
            }
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Poisoned(_)) => {
                debug!("hash memoization write-back failed, disabling memoization");
                self.put_failed.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl HashModel for SimpleHash {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        match self.find_slot(key)? {
            None => Ok(None),
            Some((_, Slot::Wrapped(value))) => Ok(Some(value)),
            Some((put_key, Slot::Raw(host))) => {
                let value = self.wrapper.wrap(host)?;
                self.memoize(put_key, &value);
                Ok(Some(value))
            }
        }
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.contains(&HostKey::Str(key.to_string())) {
            return Ok(true);
        }
        if matches!(*entries, Backing::Sorted(_)) {
            return Ok(false);
        }
        let mut chars = key.chars();
        Ok(match (chars.next(), chars.next()) {
            (Some(c), None) => entries.contains(&HostKey::Char(c)),
            _ => false,
        })
    }

    fn len(&self) -> Result<usize, ModelError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries.len())
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .keys()
            .into_iter()
            .map(|k| Value::text(k.display_string()))
            .collect())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        let keys = {
            let entries = self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            entries.keys()
        };
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&key.display_string())? {
                out.push(value);
            } else {
                out.push(Value::Null);
            }
        }
        Ok(out)
    }
}

/// Synchronized view over a [`SimpleHash`].
pub struct SyncHash {
    inner: Arc<SimpleHash>,
}

impl SyncHash {
    fn locked<R>(&self, f: impl FnOnce(&SimpleHash) -> R) -> R {
        let _guard = self
            .inner
            .op_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&self.inner)
    }

    /// Insert or replace an entry under the operation lock.
    pub fn put(&self, key: impl Into<HostKey>, value: Host) {
        self.locked(|h| h.put(key, value))
    }

    /// Remove an entry under the operation lock.
    pub fn remove(&self, key: &HostKey) -> bool {
        self.locked(|h| h.remove(key))
    }
}

impl HashModel for SyncHash {
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError> {
        self.locked(|h| h.get(key))
    }

    fn contains_key(&self, key: &str) -> Result<bool, ModelError> {
        self.locked(|h| h.contains_key(key))
    }

    fn len(&self) -> Result<usize, ModelError> {
        self.locked(|h| HashModel::len(h))
    }

    fn keys(&self) -> Result<Vec<Value>, ModelError> {
        self.locked(|h| h.keys())
    }

    fn values(&self) -> Result<Vec<Value>, ModelError> {
        self.locked(|h| h.values())
    }
}

/// An eager-copy sequence with lazy, memoizing element wrapping.
pub struct SimpleSeq {
    wrapper: Arc<ObjectWrapper>,
    items: RwLock<Vec<Slot>>,
    put_failed: AtomicBool,
    unwrapped: RwLock<Option<Arc<Vec<Host>>>>,
    op_lock: Mutex<()>,
}

impl SimpleSeq {
    /// An empty sequence.
    pub fn new(wrapper: Arc<ObjectWrapper>) -> Self {
        SimpleSeq::from_hosts(Vec::new(), wrapper)
    }

    /// A sequence over the given host elements.
    pub fn from_hosts(items: Vec<Host>, wrapper: Arc<ObjectWrapper>) -> Self {
        SimpleSeq {
            wrapper,
            items: RwLock::new(items.into_iter().map(Slot::Raw).collect()),
            put_failed: AtomicBool::new(false),
            unwrapped: RwLock::new(None),
            op_lock: Mutex::new(()),
        }
    }

    /// Copy a shared host list, with the retry-once discipline.
    pub fn from_host_list(
        list: &SharedList,
        wrapper: Arc<ObjectWrapper>,
    ) -> Result<Self, ModelError> {
        let items = read_with_retry(list, "sequence copy construction")?;
        let copied = items.clone();
        drop(items);
        Ok(SimpleSeq::from_hosts(copied, wrapper))
    }

    /// Drain a single-consumption iteration source into a sequence.
    ///
    /// This claims the iterator, so it fails with
    /// [`ModelError::AlreadyConsumed`] if something else got there first.
    pub fn from_iter_handle(
        handle: &OnceHandle,
        wrapper: Arc<ObjectWrapper>,
    ) -> Result<Self, ModelError> {
        let iter = handle.claim()?;
        Ok(SimpleSeq::from_hosts(iter.collect(), wrapper))
    }

    /// Append an element in host form.
    pub fn add(&self, value: Host) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.push(Slot::Raw(value));
        drop(items);
        self.invalidate_unwrapped();
    }

    /// Append an already-wrapped value.
    pub fn add_value(&self, value: Value) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.push(Slot::Wrapped(value));
        drop(items);
        self.invalidate_unwrapped();
    }

    /// Export the elements in host form. Cached until the next mutation.
    pub fn to_list(&self) -> Result<Arc<Vec<Host>>, ModelError> {
        {
            let cached = self
                .unwrapped
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(list) = cached.as_ref() {
                return Ok(list.clone());
            }
        }
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(items.len());
        for slot in items.iter() {
            out.push(match slot {
                Slot::Raw(host) => host.clone(),
                Slot::Wrapped(value) => deep_unwrap(value)?,
            });
        }
        drop(items);
        let out = Arc::new(out);
        let mut cached = self
            .unwrapped
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cached = Some(out.clone());
        Ok(out)
    }

    /// A view serializing every operation through this instance's lock.
    pub fn synchronized(self: &Arc<Self>) -> SyncSeq {
        SyncSeq {
            inner: self.clone(),
        }
    }

    fn invalidate_unwrapped(&self) {
        let mut cached = self
            .unwrapped
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cached = None;
    }

    fn memoize(&self, index: usize, value: &Value) {
        if self.put_failed.load(Ordering::Relaxed) {
            return;
        }
        match self.items.try_write() {
            Ok(mut items) => {
                if matches!(items.get(index), Some(Slot::Raw(_))) {
                    items[index] = Slot::Wrapped(value.clone());
                }
            }
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Poisoned(_)) => {
                debug!("sequence memoization write-back failed, disabling memoization");
                self.put_failed.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl SeqModel for SimpleSeq {
    fn get(&self, index: usize) -> Result<Option<Value>, ModelError> {
        let slot = {
            let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
            items.get(index).cloned()
        };
        match slot {
            None => Ok(None),
            Some(Slot::Wrapped(value)) => Ok(Some(value)),
            Some(Slot::Raw(host)) => {
                let value = self.wrapper.wrap(host)?;
                self.memoize(index, &value);
                Ok(Some(value))
            }
        }
    }

    fn len(&self) -> Result<usize, ModelError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.len())
    }
}

/// Synchronized view over a [`SimpleSeq`].
pub struct SyncSeq {
    inner: Arc<SimpleSeq>,
}

impl SyncSeq {
    fn locked<R>(&self, f: impl FnOnce(&SimpleSeq) -> R) -> R {
        let _guard = self
            .inner
            .op_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&self.inner)
    }

    /// Append an element under the operation lock.
    pub fn add(&self, value: Host) {
        self.locked(|s| s.add(value))
    }
}

impl SeqModel for SyncSeq {
    fn get(&self, index: usize) -> Result<Option<Value>, ModelError> {
        self.locked(|s| s.get(index))
    }

    fn len(&self) -> Result<usize, ModelError> {
        self.locked(|s| SeqModel::len(s))
    }
}
