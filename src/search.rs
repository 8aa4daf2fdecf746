// src/search.rs
//! Cross-server player name search over cached rosters.

use futures::future::join_all;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};

use crate::models::query::latest;
use crate::models::server::{PlayerInfo, ServerPair};
use crate::storage::cache::{QueryCache, Timestamp};
use crate::topology::ServerGroup;

lazy_static! {
    /// Plain, ideographic and em spaces, all used as decoration in names.
    static ref NAME_SPACES: Regex = Regex::new("[ \u{3000}\u{2003}]").unwrap();
}

pub fn strip_spaces(name: &str) -> String {
    NAME_SPACES.replace_all(name, "").into_owned()
}

/// Case-insensitive pattern. Text that is not a valid regex is matched literally.
pub fn compile_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| {
            warn!("Search pattern {:?} is not a valid regex, matching literally: {}", pattern, e);
            RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|_| Regex::new("$^").unwrap())
        })
}

pub fn matching_players(pattern: &Regex, roster: &[PlayerInfo]) -> Vec<PlayerInfo> {
    roster
        .iter()
        .filter(|p| pattern.is_match(&strip_spaces(&p.name)))
        .cloned()
        .collect()
}

/// Searches every server of `group` for players matching `pattern`.
///
/// Returns the latest fetch timestamp seen and the matches per server,
/// sorted by server name, or `None` when nobody matched.
pub async fn search(
    cache: &QueryCache,
    group: &ServerGroup,
    pattern: &str,
) -> (Option<Timestamp>, Option<Vec<ServerPair>>) {
    let regex = compile_pattern(pattern);
    let servers = group.sorted_servers();

    let fetched = join_all(servers.iter().map(|s| async move {
        let (info, players) = tokio::join!(
            cache.server_info(&s.host, s.port),
            cache.players_info(&s.host, s.port)
        );
        (s.name.clone(), info, players)
    }))
    .await;

    let mut queried_at = None;
    let mut found = Vec::new();
    for (name, (info_ts, info), (players_ts, roster)) in fetched {
        queried_at = latest(latest(queried_at, info_ts), players_ts);
        let matches = matching_players(&regex, &roster);
        if !matches.is_empty() {
            found.push((name, ServerPair { server: info, players: matches }));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));

    debug!(
        "Search {:?} in group {} matched on {} servers",
        pattern,
        group.name,
        found.len()
    );
    if found.is_empty() {
        (queried_at, None)
    } else {
        (queried_at, Some(found.into_iter().map(|(_, pair)| pair).collect()))
    }
}
