// src/models/query.rs
use serde::Serialize;

use crate::models::server::{ServerInfo, ServerPair};
use crate::storage::cache::Timestamp;

/// What a query produced, tagged by the branch that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Overview { servers: Vec<ServerInfo> },
    SingleServerAndPlayers { pair: ServerPair },
    MultiServerAndPlayers { pairs: Vec<ServerPair> },
    /// `None` means no player matched anywhere in the group.
    PlayerSearch { matches: Option<Vec<ServerPair>> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Latest fetch timestamp among everything consulted, `None` when
    /// nothing was fetched at all.
    pub queried_at: Option<Timestamp>,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

impl QueryResult {
    pub fn new(queried_at: Option<Timestamp>, outcome: QueryOutcome) -> Self {
        Self { queried_at, outcome }
    }

    /// Sum of reported players over the servers in the result.
    pub fn total_players(&self) -> u32 {
        match &self.outcome {
            QueryOutcome::Overview { servers } => servers.iter().map(|s| s.players).sum(),
            QueryOutcome::SingleServerAndPlayers { pair } => pair.server.players,
            QueryOutcome::MultiServerAndPlayers { pairs } => {
                pairs.iter().map(|p| p.server.players).sum()
            }
            QueryOutcome::PlayerSearch { matches } => matches
                .iter()
                .flatten()
                .map(|p| p.players.len() as u32)
                .sum(),
        }
    }
}

/// Running maximum over fetch timestamps.
pub fn latest(acc: Option<Timestamp>, ts: Timestamp) -> Option<Timestamp> {
    Some(acc.map_or(ts, |cur| cur.max(ts)))
}
