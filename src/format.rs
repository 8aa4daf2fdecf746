// src/format.rs
//! Plain text rendering of query results.

use std::fmt::Write;

use chrono::{DateTime, Local};

use crate::maps::{guess_map, MapLookup};
use crate::models::query::{QueryOutcome, QueryResult};
use crate::models::server::{PlayerInfo, ServerInfo, ServerPair};
use crate::storage::cache::Timestamp;

const FALLBACK_TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Formatter<'a> {
    maps: &'a MapLookup,
    time_fmt: &'a str,
}

impl<'a> Formatter<'a> {
    pub fn new(maps: &'a MapLookup, time_fmt: &'a str) -> Self {
        Self { maps, time_fmt }
    }

    pub fn server_info(&self, info: &ServerInfo) -> String {
        format!(
            "{}\n==({:>2}/{:>2})[{}]",
            info.name,
            info.players,
            info.max_players,
            guess_map(self.maps, &info.map)
        )
    }

    pub fn player_info(&self, player: &PlayerInfo) -> String {
        format!(
            ">>[{}]({:.1}min){}",
            player.score,
            player.duration / 60.0,
            player.name
        )
    }

    pub fn server_pair(&self, pair: &ServerPair) -> String {
        let mut out = self.server_info(&pair.server);
        for player in &pair.players {
            out.push('\n');
            out.push_str(&self.player_info(player));
        }
        out
    }

    /// Local time using the configured pattern, or the stock one if the
    /// pattern cannot be rendered.
    pub fn time(&self, ts: Timestamp) -> String {
        let Some(utc) = DateTime::from_timestamp_millis(ts as i64) else {
            return ts.to_string();
        };
        let local = utc.with_timezone(&Local);
        let mut out = String::new();
        if write!(out, "{}", local.format(self.time_fmt)).is_err() {
            return local.format(FALLBACK_TIME_FMT).to_string();
        }
        out
    }

    /// `query` is the text the caller searched for, echoed on empty searches.
    pub fn result(&self, result: &QueryResult, query: &str) -> String {
        let mut body = match &result.outcome {
            QueryOutcome::Overview { servers } => {
                let lines: Vec<_> = servers.iter().map(|s| self.server_info(s)).collect();
                format!("{}\n\n\nTotal players: {}", lines.join("\n"), result.total_players())
            }
            QueryOutcome::SingleServerAndPlayers { pair } => self.server_pair(pair),
            QueryOutcome::MultiServerAndPlayers { pairs } if pairs.is_empty() => {
                "No known servers in query".to_string()
            }
            QueryOutcome::MultiServerAndPlayers { pairs }
            | QueryOutcome::PlayerSearch {
                matches: Some(pairs),
            } => pairs
                .iter()
                .map(|p| self.server_pair(p))
                .collect::<Vec<_>>()
                .join("\n"),
            QueryOutcome::PlayerSearch { matches: None } => {
                format!("No players matched {:?}", query.trim())
            }
        };
        if let Some(ts) = result.queried_at {
            body.push_str("\n\n----");
            body.push_str(&self.time(ts));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::build_reverse_lookup;
    use crate::models::mapname::Mapname;
    use crate::models::server::ServerStatus;

    fn lookup() -> MapLookup {
        build_reverse_lookup(&[Mapname {
            name: "Dead Center".into(),
            name_zh: Some("死亡中心".into()),
            official: true,
            maps: vec!["c1m1_hotel".into()],
        }])
    }

    fn info() -> ServerInfo {
        ServerInfo {
            name: "Coop #1".into(),
            players: 3,
            max_players: 8,
            map: "c1m1_hotel".into(),
            vac: true,
            ping: 1.0,
            status: ServerStatus::Online,
        }
    }

    #[test]
    fn renders_server_with_resolved_map() {
        let maps = lookup();
        let fmt = Formatter::new(&maps, FALLBACK_TIME_FMT);
        assert_eq!(fmt.server_info(&info()), "Coop #1\n==( 3/ 8)[死亡中心|c1m1_hotel]");
    }

    #[test]
    fn renders_pair_with_players() {
        let maps = lookup();
        let fmt = Formatter::new(&maps, FALLBACK_TIME_FMT);
        let pair = ServerPair {
            server: info(),
            players: vec![PlayerInfo {
                name: "Alex".into(),
                score: 12,
                duration: 90.0,
                index: 0,
            }],
        };
        assert!(fmt.server_pair(&pair).ends_with("\n>>[12](1.5min)Alex"));
    }

    #[test]
    fn empty_search_is_worded_differently_from_results() {
        let maps = MapLookup::default();
        let fmt = Formatter::new(&maps, FALLBACK_TIME_FMT);
        let none = QueryResult::new(None, QueryOutcome::PlayerSearch { matches: None });
        assert_eq!(fmt.result(&none, " Alex "), "No players matched \"Alex\"");
    }

    #[test]
    fn unrenderable_time_pattern_falls_back() {
        let maps = MapLookup::default();
        let fmt = Formatter::new(&maps, "%Q");
        let stock = Formatter::new(&maps, FALLBACK_TIME_FMT);
        assert_eq!(fmt.time(1_700_000_000_000), stock.time(1_700_000_000_000));
    }

    #[test]
    fn overview_has_total_and_time_trailer() {
        let maps = MapLookup::default();
        let fmt = Formatter::new(&maps, "%Y");
        let result = QueryResult::new(
            Some(1_700_000_000_000),
            QueryOutcome::Overview {
                servers: vec![info(), info()],
            },
        );
        let text = fmt.result(&result, "");
        assert!(text.contains("Total players: 6"));
        assert!(text.ends_with("----2023"));
    }
}
