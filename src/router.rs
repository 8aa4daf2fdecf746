// src/router.rs
//! Turns free text into one of four retrieval shapes and runs it.

use futures::future::join_all;
use log::debug;

use crate::error::LookupError;
use crate::models::query::{latest, QueryOutcome, QueryResult};
use crate::models::server::ServerPair;
use crate::search;
use crate::service::QueryService;
use crate::storage::cache::{QueryCache, Timestamp};
use crate::topology::{Server, ServerGroup, Topology};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Overview,
    Server(String),
    /// Tokens naming servers of the resolved group, sorted. Repeated tokens repeat.
    Servers(Vec<String>),
    Search(String),
}

/// First match wins: overview, exact server name anywhere in the
/// topology, space separated server names of `group`, then player search.
pub fn classify(
    text: &str,
    topology: &Topology,
    group: &ServerGroup,
    overview_keyword: &str,
) -> Route {
    let text = text.trim();
    if text.is_empty() || text == overview_keyword {
        return Route::Overview;
    }
    if topology.contains_server(text) {
        return Route::Server(text.to_string());
    }
    if text.contains(' ') {
        let mut names: Vec<String> = text
            .split(' ')
            .filter(|token| group.servers.contains_key(*token))
            .map(str::to_string)
            .collect();
        names.sort();
        return Route::Servers(names);
    }
    Route::Search(text.to_string())
}

async fn fetch_pair(cache: &QueryCache, server: &Server) -> (Timestamp, ServerPair) {
    let ((info_ts, info), (players_ts, players)) = tokio::join!(
        cache.server_info(&server.host, server.port),
        cache.players_info(&server.host, server.port)
    );
    (info_ts.max(players_ts), ServerPair { server: info, players })
}

impl QueryService {
    /// Answers `text` against `group`, or the default group when absent.
    pub async fn query(
        &self,
        group: Option<&str>,
        text: &str,
    ) -> Result<QueryResult, LookupError> {
        let topology = self.topology();
        let group = self.resolve_group(&topology, group)?;
        let settings = self.settings();
        let route = classify(text, &topology, &group, &settings.overview_keyword);
        debug!("Query {:?} in group {} routed to {:?}", text, group.name, route);

        let result = match route {
            Route::Overview => {
                let servers = group.sorted_servers();
                let fetched = join_all(
                    servers
                        .iter()
                        .map(|s| self.cache.server_info(&s.host, s.port)),
                )
                .await;
                let queried_at = fetched.iter().fold(None, |acc, (ts, _)| latest(acc, *ts));
                QueryResult::new(
                    queried_at,
                    QueryOutcome::Overview {
                        servers: fetched.into_iter().map(|(_, info)| info).collect(),
                    },
                )
            }
            Route::Server(name) => {
                // classify only yields names present in the topology
                let server = topology.server(&name).ok_or_else(|| LookupError::ServerNotFound {
                    group: group.name.clone(),
                    server: name.clone(),
                })?;
                let (ts, pair) = fetch_pair(&self.cache, server).await;
                QueryResult::new(Some(ts), QueryOutcome::SingleServerAndPlayers { pair })
            }
            Route::Servers(names) => {
                let servers: Vec<_> = names.iter().filter_map(|n| group.servers.get(n)).collect();
                let fetched = join_all(servers.iter().map(|s| fetch_pair(&self.cache, s))).await;
                let queried_at = fetched.iter().fold(None, |acc, (ts, _)| latest(acc, *ts));
                // names are already sorted
                QueryResult::new(
                    queried_at,
                    QueryOutcome::MultiServerAndPlayers {
                        pairs: fetched.into_iter().map(|(_, pair)| pair).collect(),
                    },
                )
            }
            Route::Search(pattern) => {
                let (queried_at, matches) = search::search(&self.cache, &group, &pattern).await;
                QueryResult::new(queried_at, QueryOutcome::PlayerSearch { matches })
            }
        };
        Ok(result)
    }

    /// Snapshot of one server inside a named group.
    pub async fn query_server(
        &self,
        server: &str,
        group: &str,
    ) -> Result<QueryResult, LookupError> {
        let server = self.find_server(server, group)?;
        let (ts, info) = self.cache.server_info(&server.host, server.port).await;
        Ok(QueryResult::new(
            Some(ts),
            QueryOutcome::Overview {
                servers: vec![info],
            },
        ))
    }
}
