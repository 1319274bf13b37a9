use std::collections::BTreeMap;

use serde::Serialize;

/// Sprite animations known to the driver and their playback rates.
#[derive(Clone, Debug, Serialize)]
pub struct Catalog {
    entries: BTreeMap<String, u32>,
    default: String,
}

impl Catalog {
    pub fn new(entries: BTreeMap<String, u32>, default: String) -> Self {
        Self { entries, default }
    }

    pub fn fps(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Name and rate to play for a request, substituting the default for
    /// names that are not in the catalog.
    pub fn resolve<'a>(&'a self, name: &'a str) -> (&'a str, u32) {
        match self.fps(name) {
            Some(fps) => (name, fps),
            None => {
                tracing::info!(requested = name, fallback = %self.default, "Unknown animation");
                (self.default.as_str(), self.fps(&self.default).unwrap_or(1))
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, u32> {
        &self.entries
    }
}
