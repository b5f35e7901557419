//! Pooled-resource registry.
//!
//! Transient effect visuals are expensive to create, so finished instances go
//! back into per-key buckets instead of being destroyed. A handle is only
//! ever in one of three states: `Free` (parked in its bucket), `InUse`
//! (handed to a caller), or `Invalid` (the underlying resource was destroyed
//! by an external actor). Invalidation is detected by asking the provider,
//! never by catching a missing-reference failure, and invalid entries are
//! purged lazily the next time their bucket is touched.
//!
//! The registry is a rebuildable cache: it is never serialized into saves,
//! and `clear` drops bookkeeping without destroying provider resources.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};

use crate::error::RuntimeError;
use crate::provider::{ResourceId, ResourceProvider};

/// Identifies a loadable resource (path plus variant). Doubles as the bucket
/// key; ordered so bucket iteration stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        ResourceKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        ResourceKey::new(value)
    }
}

/// Caller-side reference to a pooled handle. The registry keeps ownership of
/// the handle itself; callers only carry the id while the handle is `InUse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleId(u64);

impl HandleId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Free,
    InUse,
    Invalid,
}

#[derive(Debug)]
pub struct PooledHandle {
    id: HandleId,
    resource: ResourceId,
    state: HandleState,
}

impl PooledHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn state(&self) -> HandleState {
        self.state
    }
}

#[derive(Debug, Default)]
pub struct PoolRegistry {
    buckets: BTreeMap<ResourceKey, Vec<PooledHandle>>,
    next_handle: u64,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the first `Free` handle under `key`, marking it `InUse`.
    ///
    /// Entries whose resource the provider no longer recognizes are purged
    /// before the scan. `None` means the caller must go through the loader
    /// and [`PoolRegistry::insert`] a fresh instance; it is never an error.
    pub fn acquire(
        &mut self,
        key: &ResourceKey,
        provider: &dyn ResourceProvider,
    ) -> Option<HandleId> {
        let bucket = self.buckets.get_mut(key)?;
        purge_invalid(key, bucket, provider);
        let handle = bucket
            .iter_mut()
            .find(|handle| handle.state == HandleState::Free)?;
        handle.state = HandleState::InUse;
        Some(handle.id)
    }

    /// Registers a freshly loaded resource and hands it straight to the
    /// caller as `InUse`. Creates the bucket on first use.
    pub fn insert(&mut self, key: &ResourceKey, resource: ResourceId) -> HandleId {
        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        self.buckets.entry(key.clone()).or_default().push(PooledHandle {
            id,
            resource,
            state: HandleState::InUse,
        });
        id
    }

    /// Returns an `InUse` handle to its bucket as `Free`, hiding the resource
    /// through the provider on the way in.
    ///
    /// Releasing a handle whose resource has been destroyed externally is an
    /// expected no-op: the entry is purged with a warning, never an error,
    /// because playback must survive external invalidation.
    pub fn release(
        &mut self,
        key: &ResourceKey,
        id: HandleId,
        provider: &dyn ResourceProvider,
    ) {
        let Some(bucket) = self.buckets.get_mut(key) else {
            debug!("release for unknown bucket {key}, ignoring");
            return;
        };
        let Some(index) = bucket.iter().position(|handle| handle.id == id) else {
            debug!("release for unknown handle {} in {key}, ignoring", id.raw());
            return;
        };
        let handle = &mut bucket[index];
        if !provider.is_valid(handle.resource) {
            handle.state = HandleState::Invalid;
        }
        match handle.state {
            HandleState::InUse => {
                provider.hide(handle.resource);
                handle.state = HandleState::Free;
            }
            HandleState::Free => {
                debug!("handle {} in {key} already free", id.raw());
            }
            HandleState::Invalid => {
                warn!(
                    "{}",
                    RuntimeError::StaleHandle {
                        key: key.to_string(),
                        handle: id.raw(),
                    }
                );
                bucket.remove(index);
            }
        }
    }

    /// Marks one handle `Invalid` without purging it; the next acquire or
    /// release against the bucket cleans it up.
    pub fn invalidate(&mut self, key: &ResourceKey, id: HandleId) {
        if let Some(handle) = self
            .buckets
            .get_mut(key)
            .and_then(|bucket| bucket.iter_mut().find(|handle| handle.id == id))
        {
            handle.state = HandleState::Invalid;
        }
    }

    /// Drops all buckets. Resource destruction stays the provider's job;
    /// this only forgets the bookkeeping (scene or session teardown).
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn bucket_len(&self, key: &ResourceKey) -> usize {
        self.buckets.get(key).map_or(0, Vec::len)
    }

    /// Snapshot of one bucket's handles and their states, in bucket order.
    pub fn bucket_handles(&self, key: &ResourceKey) -> Vec<(HandleId, HandleState)> {
        self.buckets.get(key).map_or_else(Vec::new, |bucket| {
            bucket
                .iter()
                .map(|handle| (handle.id, handle.state))
                .collect()
        })
    }

    pub fn handle_state(&self, key: &ResourceKey, id: HandleId) -> Option<HandleState> {
        self.buckets
            .get(key)?
            .iter()
            .find(|handle| handle.id == id)
            .map(|handle| handle.state)
    }

    pub fn resource_for(&self, key: &ResourceKey, id: HandleId) -> Option<ResourceId> {
        self.buckets
            .get(key)?
            .iter()
            .find(|handle| handle.id == id)
            .map(|handle| handle.resource)
    }
}

fn purge_invalid(key: &ResourceKey, bucket: &mut Vec<PooledHandle>, provider: &dyn ResourceProvider) {
    bucket.retain(|handle| {
        let alive = handle.state != HandleState::Invalid && provider.is_valid(handle.resource);
        if !alive {
            debug!("purging stale handle {} from {key}", handle.id.raw());
        }
        alive
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LoadPoll, ProviderTicket};
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct FlakyProvider {
        dead: RefCell<BTreeSet<u64>>,
    }

    impl FlakyProvider {
        fn kill(&self, resource: ResourceId) {
            self.dead.borrow_mut().insert(resource.0);
        }
    }

    impl ResourceProvider for FlakyProvider {
        fn begin_load(&self, _key: &ResourceKey) -> ProviderTicket {
            ProviderTicket(0)
        }

        fn poll_load(&self, _ticket: &ProviderTicket) -> LoadPoll {
            LoadPoll::NotFound
        }

        fn anchor_position(&self, _code: &str) -> Option<crate::command::position::Position> {
            None
        }

        fn is_valid(&self, resource: ResourceId) -> bool {
            !self.dead.borrow().contains(&resource.0)
        }
    }

    #[test]
    fn acquire_on_empty_bucket_returns_none() {
        let mut pool = PoolRegistry::new();
        let provider = FlakyProvider::default();
        assert_eq!(pool.acquire(&"fx/snow".into(), &provider), None);
    }

    #[test]
    fn release_then_acquire_reuses_the_same_handle() {
        let mut pool = PoolRegistry::new();
        let provider = FlakyProvider::default();
        let key: ResourceKey = "fx/snow".into();

        let id = pool.insert(&key, ResourceId(7));
        assert_eq!(pool.handle_state(&key, id), Some(HandleState::InUse));

        pool.release(&key, id, &provider);
        assert_eq!(pool.handle_state(&key, id), Some(HandleState::Free));

        assert_eq!(pool.acquire(&key, &provider), Some(id));
        assert_eq!(pool.handle_state(&key, id), Some(HandleState::InUse));
    }

    #[test]
    fn releasing_an_externally_destroyed_resource_purges_quietly() {
        let mut pool = PoolRegistry::new();
        let provider = FlakyProvider::default();
        let key: ResourceKey = "fx/snow".into();

        let id = pool.insert(&key, ResourceId(3));
        provider.kill(ResourceId(3));

        pool.release(&key, id, &provider);
        assert_eq!(pool.bucket_len(&key), 0);
        assert_eq!(pool.handle_state(&key, id), None);
    }

    #[test]
    fn acquire_skips_and_purges_invalidated_handles() {
        let mut pool = PoolRegistry::new();
        let provider = FlakyProvider::default();
        let key: ResourceKey = "fx/rain".into();

        let stale = pool.insert(&key, ResourceId(1));
        let live = pool.insert(&key, ResourceId(2));
        pool.release(&key, stale, &provider);
        pool.release(&key, live, &provider);
        pool.invalidate(&key, stale);

        assert_eq!(pool.acquire(&key, &provider), Some(live));
        // The stale entry is gone, not just skipped.
        assert_eq!(pool.bucket_len(&key), 1);
    }

    #[test]
    fn clear_drops_every_bucket() {
        let mut pool = PoolRegistry::new();
        let key: ResourceKey = "fx/fog".into();
        pool.insert(&key, ResourceId(1));
        pool.clear();
        assert_eq!(pool.bucket_len(&key), 0);
    }
}
