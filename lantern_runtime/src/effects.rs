//! Persistent record of which toggled effects are logically on.
//!
//! This registry is the replayable half of the effect system: it says an
//! effect is active whether or not its visuals were ever built, which is
//! what lets save/load and fast-forward rebuild a session without running
//! playback. It serializes into saves; the pooled visuals never do.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

/// How a marker entered the registry.
///
/// `Toggle` markers persist until an explicit deactivate. `Transient`
/// markers ride along with an in-flight one-shot effect so a save taken
/// mid-burst replays it; they disappear on their own when the burst lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Toggle,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub kind: EffectKind,
    pub count: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRegistry {
    active: BTreeMap<String, EffectRecord>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns a toggled effect on. Returns `false` if the name is already
    /// registered; activating twice is a no-op beyond confirming membership.
    pub fn activate(&mut self, name: &str) -> bool {
        if self.active.contains_key(name) {
            debug!("effect {name} already active");
            return false;
        }
        self.active.insert(
            name.to_string(),
            EffectRecord {
                kind: EffectKind::Toggle,
                count: 1,
            },
        );
        true
    }

    /// Turns a toggled effect off. Returns `false` if it was not on.
    pub fn deactivate(&mut self, name: &str) -> bool {
        match self.active.get(name) {
            Some(record) if record.kind == EffectKind::Toggle => {
                self.active.remove(name);
                true
            }
            Some(_) => {
                debug!("deactivate of {name} skipped, marker is transient");
                false
            }
            None => false,
        }
    }

    /// Marks a one-shot effect as in flight. Overlapping bursts of the same
    /// name stack their counts.
    pub fn push_transient(&mut self, name: &str) {
        self.active
            .entry(name.to_string())
            .or_insert(EffectRecord {
                kind: EffectKind::Transient,
                count: 0,
            })
            .count += 1;
    }

    /// Drops one in-flight marker; the record disappears when the last
    /// overlapping burst lands.
    pub fn pop_transient(&mut self, name: &str) {
        let Some(record) = self.active.get_mut(name) else {
            debug!("pop of unknown transient {name}, ignoring");
            return;
        };
        record.count = record.count.saturating_sub(1);
        if record.count == 0 {
            self.active.remove(name);
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Names currently registered as toggles, for bulk teardown.
    pub fn toggled_names(&self) -> Vec<String> {
        self.active
            .iter()
            .filter(|(_, record)| record.kind == EffectKind::Toggle)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_is_idempotent() {
        let mut effects = EffectRegistry::new();
        assert!(effects.activate("Snow"));
        assert!(!effects.activate("Snow"));
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn deactivate_removes_the_marker() {
        let mut effects = EffectRegistry::new();
        effects.activate("Snow");
        assert!(effects.deactivate("Snow"));
        assert!(!effects.is_active("Snow"));
        assert!(!effects.deactivate("Snow"));
    }

    #[test]
    fn transient_markers_stack_and_drain() {
        let mut effects = EffectRegistry::new();
        effects.push_transient("Explode");
        effects.push_transient("Explode");
        assert!(effects.is_active("Explode"));

        effects.pop_transient("Explode");
        assert!(effects.is_active("Explode"));
        effects.pop_transient("Explode");
        assert!(!effects.is_active("Explode"));
    }

    #[test]
    fn toggled_names_excludes_transients() {
        let mut effects = EffectRegistry::new();
        effects.activate("Snow");
        effects.push_transient("Explode");
        assert_eq!(effects.toggled_names(), vec!["Snow".to_string()]);
    }

    #[test]
    fn registry_round_trips_through_json() {
        let mut effects = EffectRegistry::new();
        effects.activate("Fog");
        effects.push_transient("Explode");

        let json = serde_json::to_string(&effects).expect("serializes");
        let restored: EffectRegistry = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(restored, effects);
    }
}
