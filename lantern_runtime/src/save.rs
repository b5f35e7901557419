//! The replayable slice of a session, as it goes into a save file.
//!
//! Only the effect registry and the script cursor persist. The pool and its
//! handles are deliberately excluded: they cache provider resources that a
//! fresh session rebuilds on demand, and serializing them would only pin
//! state that cannot survive a process boundary anyway.

use serde::{Deserialize, Serialize};

use crate::effects::EffectRegistry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub effects: EffectRegistry,
    pub cursor: usize,
}

impl SaveState {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_file_round_trips_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("slot0.json");

        let mut effects = EffectRegistry::new();
        effects.activate("Snow");
        let save = SaveState { effects, cursor: 7 };

        std::fs::write(&path, save.to_json_pretty().expect("serializes")).expect("writes");
        let loaded =
            SaveState::from_json(&std::fs::read_to_string(&path).expect("reads")).expect("parses");
        assert_eq!(loaded, save);
    }

    #[test]
    fn save_state_round_trips_through_json() {
        let mut effects = EffectRegistry::new();
        effects.activate("Snow");
        effects.activate("Fog");
        let save = SaveState {
            effects,
            cursor: 42,
        };

        let json = save.to_json_pretty().expect("serializes");
        let restored = SaveState::from_json(&json).expect("deserializes");
        assert_eq!(restored, save);
    }
}
