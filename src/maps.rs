// src/maps.rs
use std::collections::HashMap;

use log::debug;

use crate::models::mapname::Mapname;

/// Lowercased map code to its dictionary entry.
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    by_code: HashMap<String, Mapname>,
}

impl MapLookup {
    pub fn lookup(&self, code: &str) -> Option<&Mapname> {
        self.by_code.get(&code.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Later entries win when two entries claim the same code.
pub fn build_reverse_lookup(entries: &[Mapname]) -> MapLookup {
    let mut by_code = HashMap::new();
    for entry in entries {
        for code in &entry.maps {
            if let Some(prev) = by_code.insert(code.to_lowercase(), entry.clone()) {
                debug!("Map code {} moved from {} to {}", code, prev.name, entry.name);
            }
        }
    }
    MapLookup { by_code }
}

/// `display|code` when the code is known, otherwise just the code.
pub fn guess_map(lookup: &MapLookup, code: &str) -> String {
    match lookup.lookup(code) {
        Some(entry) => format!("{}|{}", entry.display_name(), code),
        None => code.to_string(),
    }
}
