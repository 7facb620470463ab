//! Single-consumption iteration.
//!
//! A host iterator is a resource with exactly one valid consumer. The
//! [`OnceHandle`] holds it; any number of cursors can be derived, but the
//! underlying iterator is claimed by whichever cursor touches it first
//! (`next` or `has_next`, not cursor creation). Every other cursor fails
//! with [`ModelError::AlreadyConsumed`] from its first use on, even after
//! the winning cursor has finished.

use std::sync::{Arc, Mutex};

use formwork_model::{CollectionModel, ModelCursor, ModelError, Value};

use crate::host::Host;
use crate::wrapper::ObjectWrapper;

type HostIter = Box<dyn Iterator<Item = Host> + Send>;

enum OnceState {
    Fresh(HostIter),
    Claimed,
}

/// A shared handle over a host iterator, consumable exactly once.
#[derive(Clone)]
pub struct OnceHandle {
    inner: Arc<Mutex<OnceState>>,
}

impl OnceHandle {
    /// Wrap a host iterator.
    pub fn new<I>(source: I) -> Self
    where
        I: Iterator<Item = Host> + Send + 'static,
    {
        OnceHandle {
            inner: Arc::new(Mutex::new(OnceState::Fresh(Box::new(source)))),
        }
    }

    /// Claim ownership of the underlying iterator.
    ///
    /// First caller wins; everyone after gets [`ModelError::AlreadyConsumed`].
    /// There is no queueing or blocking - concurrent consumption is a caller
    /// bug this surfaces, not a scheduling problem this solves.
    pub fn claim(&self) -> Result<HostIter, ModelError> {
        let mut state = self.inner.lock().map_err(|_| ModelError::HostPoisoned {
            operation: "claim iterator",
        })?;
        match std::mem::replace(&mut *state, OnceState::Claimed) {
            OnceState::Fresh(iter) => Ok(iter),
            OnceState::Claimed => Err(ModelError::AlreadyConsumed),
        }
    }

    /// Whether the iterator has already been claimed.
    pub fn is_claimed(&self) -> bool {
        match self.inner.lock() {
            Ok(state) => matches!(*state, OnceState::Claimed),
            Err(_) => true,
        }
    }

    /// Identity comparison for host equality.
    pub(crate) fn same_handle(&self, other: &OnceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Collection model over a [`OnceHandle`], wrapping elements on demand.
pub struct IterAdapter {
    handle: OnceHandle,
    wrapper: Arc<ObjectWrapper>,
}

impl IterAdapter {
    /// Adapt a handle; elements are wrapped lazily with `wrapper`.
    pub fn new(handle: OnceHandle, wrapper: Arc<ObjectWrapper>) -> Self {
        IterAdapter { handle, wrapper }
    }
}

impl CollectionModel for IterAdapter {
    fn cursor(&self) -> Box<dyn ModelCursor> {
        Box::new(OnceCursor {
            handle: self.handle.clone(),
            wrapper: self.wrapper.clone(),
            state: CursorState::Unclaimed,
        })
    }
}

enum CursorState {
    Unclaimed,
    Owned {
        iter: HostIter,
        /// Lookahead element buffered by `has_next`.
        peeked: Option<Option<Host>>,
    },
}

/// A cursor derived from an [`IterAdapter`].
struct OnceCursor {
    handle: OnceHandle,
    wrapper: Arc<ObjectWrapper>,
    state: CursorState,
}

impl OnceCursor {
    fn ensure_claimed(&mut self) -> Result<(), ModelError> {
        if matches!(self.state, CursorState::Unclaimed) {
            let iter = self.handle.claim()?;
            self.state = CursorState::Owned { iter, peeked: None };
        }
        Ok(())
    }
}

impl ModelCursor for OnceCursor {
    fn has_next(&mut self) -> Result<bool, ModelError> {
        self.ensure_claimed()?;
        match &mut self.state {
            CursorState::Owned { iter, peeked } => {
                if peeked.is_none() {
                    *peeked = Some(iter.next());
                }
                Ok(matches!(peeked, Some(Some(_))))
            }
            CursorState::Unclaimed => unreachable!("claimed above"),
        }
    }

    fn next(&mut self) -> Result<Option<Value>, ModelError> {
        self.ensure_claimed()?;
        let item = match &mut self.state {
            CursorState::Owned { iter, peeked } => match peeked.take() {
                Some(buffered) => buffered,
                None => iter.next(),
            },
            CursorState::Unclaimed => unreachable!("claimed above"),
        };
        match item {
            Some(host) => self.wrapper.wrap(host).map(Some),
            None => Ok(None),
        }
    }
}
