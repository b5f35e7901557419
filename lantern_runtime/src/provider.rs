//! Traits the playback core consumes from its host.
//!
//! The core never implements asset storage, scene placement, configuration
//! lookup, or event delivery itself; it talks to all of them through these
//! interfaces so a host (or a test) can supply deterministic stand-ins.

use serde::Serialize;

use crate::command::position::Position;
use crate::pool::ResourceKey;
use crate::progress::ProgressSnapshot;

/// Opaque token for one loaded resource instance, minted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ResourceId(pub u64);

/// Token for one in-flight load, handed back by [`ResourceProvider::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTicket(pub u64);

/// One observation of an in-flight load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadPoll {
    /// Still loading; carries the provider's completion fraction in `[0, 1]`.
    Pending(f32),
    Ready(ResourceId),
    NotFound,
}

/// Asset storage and scene placement, owned by the host.
///
/// Methods with default bodies are presentation-only: a host that renders
/// nothing (or a test double) can ignore them without breaking playback.
pub trait ResourceProvider {
    fn begin_load(&self, key: &ResourceKey) -> ProviderTicket;
    fn poll_load(&self, ticket: &ProviderTicket) -> LoadPoll;

    /// Current position of a named anchor, if the anchor exists in the scene.
    fn anchor_position(&self, code: &str) -> Option<Position>;

    /// Whether the underlying resource still exists. External actors may
    /// destroy pooled resources at any time; the pool checks here instead of
    /// trusting its own bookkeeping.
    fn is_valid(&self, _resource: ResourceId) -> bool {
        true
    }

    /// Reports whether a one-shot animation on this resource has run its
    /// length. Polled once per tick by the task waiting on it.
    fn animation_finished(&self, _resource: ResourceId) -> bool {
        true
    }

    fn place_under_layer(&self, _resource: ResourceId, _layer: &str) {}
    fn show(&self, _resource: ResourceId, _at: Position) {}
    fn hide(&self, _resource: ResourceId) {}
    fn destroy(&self, _resource: ResourceId) {}
}

/// Maps logical effect names to loadable resource keys.
pub trait ConfigProvider {
    fn lookup(&self, logical_name: &str) -> Option<String>;
}

/// Broadcast channel for state the UI and other subsystems watch.
pub trait EventBus {
    fn publish(&self, event: RuntimeEvent);
}

/// Everything the core broadcasts over the [`EventBus`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Progress { snapshot: ProgressSnapshot },
    AllLoadsCompleted,
    EffectActivated { name: String },
    EffectDeactivated { name: String },
}

/// Bus that drops everything, for sessions that have no subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: RuntimeEvent) {}
}

/// Config lookup with no table behind it; callers fall back to the logical
/// name as the resource key.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConfig;

impl ConfigProvider for IdentityConfig {
    fn lookup(&self, _logical_name: &str) -> Option<String> {
        None
    }
}
