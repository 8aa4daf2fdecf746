// src/models/mapname.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapname {
    pub name: String,
    #[serde(default)]
    pub name_zh: Option<String>,
    #[serde(default)]
    pub official: bool,
    /// Map codes that resolve to this entry.
    pub maps: Vec<String>,
}

impl Mapname {
    /// Localized name when present, otherwise the default one.
    pub fn display_name(&self) -> &str {
        self.name_zh.as_deref().unwrap_or(&self.name)
    }
}
