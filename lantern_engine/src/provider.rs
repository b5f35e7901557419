//! Deterministic provider backing a scripted run.
//!
//! Loads resolve after a fixed tick count taken from the manifest, resource
//! ids are minted sequentially, and every presentation call lands in an
//! ordered log so a run can be checked call for call.

use std::cell::RefCell;
use std::collections::BTreeMap;

use log::warn;

use lantern_runtime::command::position::Position;
use lantern_runtime::provider::{LoadPoll, ProviderTicket, ResourceId};
use lantern_runtime::{ConfigProvider, EventBus, ResourceKey, ResourceProvider, RuntimeEvent};

use crate::manifest::ResourceManifest;

struct InFlightLoad {
    key: String,
    remaining: u32,
    total: u32,
}

struct LiveResource {
    alive: bool,
    animation_left: u32,
}

#[derive(Default)]
struct ProviderState {
    next_ticket: u64,
    next_resource: u64,
    loads: BTreeMap<u64, InFlightLoad>,
    resources: BTreeMap<u64, LiveResource>,
    log: Vec<String>,
}

/// Asset storage whose behavior is fully described by a [`ResourceManifest`].
pub struct ScriptedProvider {
    manifest: ResourceManifest,
    state: RefCell<ProviderState>,
}

impl ScriptedProvider {
    pub fn new(manifest: ResourceManifest) -> Self {
        Self {
            manifest,
            state: RefCell::new(ProviderState::default()),
        }
    }

    /// Ordered transcript of every load and presentation call so far.
    pub fn call_log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Number of loads started over the whole run.
    pub fn loads_begun(&self) -> u64 {
        self.state.borrow().next_ticket
    }

    fn log(&self, line: String) {
        self.state.borrow_mut().log.push(line);
    }
}

impl ResourceProvider for ScriptedProvider {
    fn begin_load(&self, key: &ResourceKey) -> ProviderTicket {
        let mut state = self.state.borrow_mut();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let total = self
            .manifest
            .entry(key.as_str())
            .map(|entry| entry.load_ticks)
            .unwrap_or(0);
        state.loads.insert(
            ticket,
            InFlightLoad {
                key: key.to_string(),
                remaining: total,
                total,
            },
        );
        state.log.push(format!("load.begin {key}"));
        ProviderTicket(ticket)
    }

    fn poll_load(&self, ticket: &ProviderTicket) -> LoadPoll {
        let mut state = self.state.borrow_mut();
        let Some(mut load) = state.loads.remove(&ticket.0) else {
            warn!("poll for unknown load ticket {}", ticket.0);
            return LoadPoll::NotFound;
        };
        let served = self
            .manifest
            .entry(&load.key)
            .map(|entry| !entry.missing)
            .unwrap_or(false);
        if !served {
            state.log.push(format!("load.missing {}", load.key));
            return LoadPoll::NotFound;
        }
        if load.remaining > 0 {
            // Fraction of the wait already served; stays below 1 until the
            // poll that actually yields the resource.
            let fraction = (load.total - load.remaining) as f32 / load.total.max(1) as f32;
            load.remaining -= 1;
            state.loads.insert(ticket.0, load);
            return LoadPoll::Pending(fraction);
        }
        let id = state.next_resource;
        state.next_resource += 1;
        state.resources.insert(
            id,
            LiveResource {
                alive: true,
                animation_left: self
                    .manifest
                    .entry(&load.key)
                    .map(|entry| entry.animation_ticks)
                    .unwrap_or(0),
            },
        );
        state.log.push(format!("load.ready {} -> #{id}", load.key));
        LoadPoll::Ready(ResourceId(id))
    }

    fn anchor_position(&self, code: &str) -> Option<Position> {
        self.manifest
            .anchors
            .get(code)
            .map(|[x, y]| Position { x: *x, y: *y })
    }

    fn is_valid(&self, resource: ResourceId) -> bool {
        self.state
            .borrow()
            .resources
            .get(&resource.0)
            .map(|live| live.alive)
            .unwrap_or(false)
    }

    fn animation_finished(&self, resource: ResourceId) -> bool {
        let mut state = self.state.borrow_mut();
        match state.resources.get_mut(&resource.0) {
            Some(live) if live.animation_left > 0 => {
                live.animation_left -= 1;
                false
            }
            Some(_) => true,
            None => true,
        }
    }

    fn place_under_layer(&self, resource: ResourceId, layer: &str) {
        self.log(format!("place #{} under {layer}", resource.0));
    }

    fn show(&self, resource: ResourceId, at: Position) {
        self.log(format!("show #{} at ({}, {})", resource.0, at.x, at.y));
    }

    fn hide(&self, resource: ResourceId) {
        self.log(format!("hide #{}", resource.0));
    }

    fn destroy(&self, resource: ResourceId) {
        let mut state = self.state.borrow_mut();
        if let Some(live) = state.resources.get_mut(&resource.0) {
            live.alive = false;
        }
        state.log.push(format!("destroy #{}", resource.0));
    }
}

impl ConfigProvider for ScriptedProvider {
    fn lookup(&self, logical_name: &str) -> Option<String> {
        self.manifest.aliases.get(logical_name).cloned()
    }
}

/// Event bus that keeps everything it sees, in publish order.
#[derive(Default)]
pub struct BusRecorder {
    events: RefCell<Vec<RuntimeEvent>>,
}

impl BusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.borrow().clone()
    }
}

impl EventBus for BusRecorder {
    fn publish(&self, event: RuntimeEvent) {
        self.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ResourceManifest {
        serde_json::from_str(
            r#"{
                "resources": [
                    { "key": "fx/snow", "load_ticks": 2 },
                    { "key": "fx/ghost", "missing": true }
                ],
                "anchors": { "L": [-400, 0] }
            }"#,
        )
        .expect("manifest parses")
    }

    #[test]
    fn loads_resolve_after_the_configured_tick_count() {
        let provider = ScriptedProvider::new(manifest());
        let ticket = provider.begin_load(&ResourceKey::new("fx/snow"));
        assert_eq!(provider.poll_load(&ticket), LoadPoll::Pending(0.0));
        assert_eq!(provider.poll_load(&ticket), LoadPoll::Pending(0.5));
        assert_eq!(provider.poll_load(&ticket), LoadPoll::Ready(ResourceId(0)));
    }

    #[test]
    fn missing_and_unknown_keys_resolve_to_not_found() {
        let provider = ScriptedProvider::new(manifest());
        let ghost = provider.begin_load(&ResourceKey::new("fx/ghost"));
        assert_eq!(provider.poll_load(&ghost), LoadPoll::NotFound);
        let unknown = provider.begin_load(&ResourceKey::new("fx/nope"));
        assert_eq!(provider.poll_load(&unknown), LoadPoll::NotFound);
    }

    #[test]
    fn destroy_invalidates_the_resource() {
        let provider = ScriptedProvider::new(manifest());
        let ticket = provider.begin_load(&ResourceKey::new("fx/snow"));
        provider.poll_load(&ticket);
        provider.poll_load(&ticket);
        let LoadPoll::Ready(id) = provider.poll_load(&ticket) else {
            panic!("expected ready");
        };
        assert!(provider.is_valid(id));
        provider.destroy(id);
        assert!(!provider.is_valid(id));
    }
}
