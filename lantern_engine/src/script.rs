//! Line-oriented playback scripts.
//!
//! One command per line: the command name, whitespace, then everything else
//! as the argument string. Blank lines and `#` comments are skipped but line
//! numbers are kept so diagnostics point at the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-based line number in the source file.
    pub line: usize,
    pub name: String,
    pub args: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackScript {
    pub lines: Vec<ScriptLine>,
}

impl PlaybackScript {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading playback script {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (name, args) = match trimmed.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (trimmed, ""),
            };
            lines.push(ScriptLine {
                line: index + 1,
                name: name.to_string(),
                args: args.to_string(),
            });
        }
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
