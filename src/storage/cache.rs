// src/storage/cache.rs
//! TTL cache over live server queries.
//!
//! Two tables keyed by `(host, port)`: one for server snapshots and one
//! for player rosters. Entries refresh lazily on read once older than the
//! TTL. Failed queries answer with a placeholder that is never stored, so
//! the next read goes back to the server. Each key has its own async lock
//! around check-then-refresh, so concurrent misses on one key share a
//! single fetch and its outcome, failed or not.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::a2s::QueryClient;
use crate::error::QueryError;
use crate::models::server::{PlayerInfo, ServerInfo, ServerStatus};

/// Unix time in milliseconds.
pub type Timestamp = u64;

pub type CacheKey = (String, u16);

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    fetched_at: Timestamp,
    value: T,
}

struct SlotState<T> {
    /// Last successful fetch, served while fresh.
    cached: Option<Entry<T>>,
    /// Outcome of the most recent fetch, successful or not.
    last: Option<Entry<T>>,
}

/// Per-key state. `fetches` only moves while `state` is locked.
struct Slot<T> {
    fetches: AtomicU64,
    state: Mutex<SlotState<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            fetches: AtomicU64::new(0),
            state: Mutex::new(SlotState {
                cached: None,
                last: None,
            }),
        }
    }
}

/// One table of cached values for a single data class.
struct Table<T> {
    slots: DashMap<CacheKey, Arc<Slot<T>>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot<T>> {
        // Clone the Arc out so the shard lock is released before awaiting.
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    /// Returns the cached value while fresh, otherwise runs `fetch`.
    /// `fetch` yields the value and whether it may be stored.
    ///
    /// Callers that queued behind a fetch in progress take its outcome,
    /// placeholder included, instead of issuing their own.
    async fn get_or_refresh<F, Fut>(
        &self,
        key: &CacheKey,
        clock: &dyn Clock,
        ttl: Duration,
        fetch: F,
    ) -> (Timestamp, T)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (T, bool)>,
    {
        let slot = self.slot(key);
        let seen = slot.fetches.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if let Some(entry) = state.cached.as_ref() {
            let age = clock.now().saturating_sub(entry.fetched_at);
            if u128::from(age) <= ttl.as_millis() {
                debug!("Cache hit for {}:{} (age {}ms)", key.0, key.1, age);
                return (entry.fetched_at, entry.value.clone());
            }
        }

        if slot.fetches.load(Ordering::Acquire) != seen {
            if let Some(last) = state.last.as_ref() {
                debug!("Joined fetch for {}:{} issued at {}", key.0, key.1, last.fetched_at);
                return (last.fetched_at, last.value.clone());
            }
        }

        let issued_at = clock.now();
        let (value, cacheable) = fetch().await;
        if cacheable {
            let newer = state
                .cached
                .as_ref()
                .map_or(true, |e| e.fetched_at <= issued_at);
            if newer {
                state.cached = Some(Entry {
                    fetched_at: issued_at,
                    value: value.clone(),
                });
            }
        }
        state.last = Some(Entry {
            fetched_at: issued_at,
            value: value.clone(),
        });
        slot.fetches.fetch_add(1, Ordering::Release);
        (issued_at, value)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

pub struct QueryCache {
    client: Arc<dyn QueryClient>,
    clock: Arc<dyn Clock>,
    ttl: RwLock<Duration>,
    servers: Table<ServerInfo>,
    players: Table<Vec<PlayerInfo>>,
}

impl QueryCache {
    pub fn new(client: Arc<dyn QueryClient>, ttl: Duration) -> Self {
        Self::with_clock(client, Arc::new(SystemClock), ttl)
    }

    pub fn with_clock(client: Arc<dyn QueryClient>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            client,
            clock,
            ttl: RwLock::new(ttl),
            servers: Table::new(),
            players: Table::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read()
    }

    pub fn set_ttl(&self, ttl: Duration) {
        debug!("Reset cache TTL to {:?}", ttl);
        *self.ttl.write() = ttl;
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Server snapshot, from cache while fresh.
    pub async fn server_info(&self, host: &str, port: u16) -> (Timestamp, ServerInfo) {
        let key = (host.to_string(), port);
        let client = Arc::clone(&self.client);
        self.servers
            .get_or_refresh(&key, self.clock.as_ref(), self.ttl(), || async move {
                match client.server_info(host, port).await {
                    Ok(info) => (info, true),
                    Err(e) => {
                        warn!("Server query failed, answering with placeholder: {}", e);
                        (ServerInfo::placeholder(placeholder_status(&e)), false)
                    }
                }
            })
            .await
    }

    /// Player roster, from cache while fresh.
    pub async fn players_info(&self, host: &str, port: u16) -> (Timestamp, Vec<PlayerInfo>) {
        let key = (host.to_string(), port);
        let client = Arc::clone(&self.client);
        self.players
            .get_or_refresh(&key, self.clock.as_ref(), self.ttl(), || async move {
                match client.players_info(host, port).await {
                    Ok(players) => (players, true),
                    Err(e) => {
                        warn!("Players query failed, answering with empty roster: {}", e);
                        (Vec::new(), false)
                    }
                }
            })
            .await
    }

    /// Number of (server, roster) keys ever touched.
    pub fn key_counts(&self) -> (usize, usize) {
        (self.servers.len(), self.players.len())
    }
}

fn placeholder_status(err: &QueryError) -> ServerStatus {
    match err {
        QueryError::ServerRestarting { .. } => ServerStatus::Restarting,
        _ => ServerStatus::Timeout,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted client and manual clock shared by the service tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    pub struct ManualClock(pub AtomicU64);

    impl ManualClock {
        pub fn at(ms: Timestamp) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(ms)))
        }

        pub fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            self.0.load(Ordering::SeqCst)
        }
    }

    pub enum Reply {
        Ok,
        Timeout,
        Restarting,
    }

    /// Answers from a fixed table; queued replies override one call each.
    #[derive(Default)]
    pub struct FakeClient {
        pub servers: HashMap<CacheKey, ServerInfo>,
        pub rosters: HashMap<CacheKey, Vec<PlayerInfo>>,
        pub script: parking_lot::Mutex<VecDeque<Reply>>,
        pub server_calls: AtomicUsize,
        pub player_calls: AtomicUsize,
        pub delay: Option<Duration>,
        /// Moved forward by this much during every fetch.
        pub clock: Option<(Arc<ManualClock>, u64)>,
    }

    impl FakeClient {
        pub fn with_server(
            mut self,
            host: &str,
            port: u16,
            name: &str,
            players: &[(&str, i32)],
        ) -> Self {
            let key = (host.to_string(), port);
            self.servers.insert(key.clone(), online(name, players.len() as u32));
            self.rosters.insert(
                key,
                players
                    .iter()
                    .enumerate()
                    .map(|(i, (n, score))| PlayerInfo {
                        name: n.to_string(),
                        score: *score,
                        duration: 60.0,
                        index: i as u8,
                    })
                    .collect(),
            );
            self
        }

        pub fn push(&self, reply: Reply) {
            self.script.lock().push_back(reply);
        }

        pub fn calls(&self) -> (usize, usize) {
            (
                self.server_calls.load(Ordering::SeqCst),
                self.player_calls.load(Ordering::SeqCst),
            )
        }

        async fn pre_fetch(&self, host: &str, port: u16) -> Result<(), QueryError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some((clock, step)) = &self.clock {
                clock.advance(*step);
            }
            let addr = format!("{}:{}", host, port);
            match self.script.lock().pop_front() {
                Some(Reply::Timeout) => Err(QueryError::Timeout { addr }),
                Some(Reply::Restarting) => Err(QueryError::ServerRestarting { addr }),
                Some(Reply::Ok) | None => Ok(()),
            }
        }
    }

    pub fn online(name: &str, players: u32) -> ServerInfo {
        ServerInfo {
            name: name.to_string(),
            players,
            max_players: 8,
            map: "c1m1_hotel".to_string(),
            vac: true,
            ping: 10.0,
            status: ServerStatus::Online,
        }
    }

    #[async_trait]
    impl QueryClient for FakeClient {
        async fn server_info(&self, host: &str, port: u16) -> Result<ServerInfo, QueryError> {
            self.server_calls.fetch_add(1, Ordering::SeqCst);
            self.pre_fetch(host, port).await?;
            self.servers
                .get(&(host.to_string(), port))
                .cloned()
                .ok_or_else(|| QueryError::Timeout {
                    addr: format!("{}:{}", host, port),
                })
        }

        async fn players_info(&self, host: &str, port: u16) -> Result<Vec<PlayerInfo>, QueryError> {
            self.player_calls.fetch_add(1, Ordering::SeqCst);
            self.pre_fetch(host, port).await?;
            Ok(self
                .rosters
                .get(&(host.to_string(), port))
                .cloned()
                .unwrap_or_default())
        }
    }
}
