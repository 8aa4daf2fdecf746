// src/models/server.rs
use serde::{Deserialize, Serialize};

/// Why a snapshot holds real data or a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Online,
    Timeout,
    Restarting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub players: u32,
    pub max_players: u32,
    pub map: String,
    pub vac: bool,
    /// Round trip in milliseconds.
    pub ping: f64,
    pub status: ServerStatus,
}

impl ServerInfo {
    /// Placeholder handed out when a live query could not complete.
    /// Never written into the cache.
    pub fn placeholder(status: ServerStatus) -> Self {
        let name = match status {
            ServerStatus::Online | ServerStatus::Timeout => "timeout",
            ServerStatus::Restarting => "changing map or restarting",
        };
        Self {
            name: name.to_string(),
            players: 0,
            max_players: 0,
            map: "unknown".to_string(),
            vac: false,
            ping: 0.0,
            status,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ServerStatus::Online
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub score: i32,
    /// Seconds connected.
    pub duration: f32,
    pub index: u8,
}

/// A snapshot paired with the roster fetched for the same server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPair {
    pub server: ServerInfo,
    pub players: Vec<PlayerInfo>,
}
