//! JSON manifest describing what the scripted provider can serve.
//!
//! The manifest stands in for real asset storage: each entry says how many
//! ticks its load takes, how long its one-shot animation runs, and whether
//! the asset should be reported missing. Anchors and logical-name aliases
//! live here too, so one file configures a whole deterministic run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_load_ticks() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub key: String,
    /// Ticks before a load of this key resolves.
    #[serde(default = "default_load_ticks")]
    pub load_ticks: u32,
    /// Ticks a one-shot animation on this resource runs before it signals
    /// completion. Zero signals immediately.
    #[serde(default)]
    pub animation_ticks: u32,
    /// Report this key as not found instead of serving it.
    #[serde(default)]
    pub missing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceManifest {
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    /// Anchor code to scene position.
    #[serde(default)]
    pub anchors: BTreeMap<String, [f32; 2]>,
    /// Logical effect name to resource key.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl ResourceManifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading resource manifest {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing resource manifest {}", path.display()))
    }

    pub fn entry(&self, key: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|entry| entry.key == key)
    }
}
