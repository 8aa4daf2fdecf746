// src/service.rs
//! Long-lived state behind every request: cache, topology, map lookup
//! and settings. Topology, map lookup and settings are replaced as whole
//! `Arc`s on refresh, so in-flight requests keep the snapshot they started
//! with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::RwLock;

use crate::a2s::{A2sClient, QueryClient};
use crate::config::{self, FmtConfig, QueryConfig, ServerConfig, ServerGroupConfig};
use crate::error::{ConfigError, LookupError};
use crate::maps::{build_reverse_lookup, MapLookup};
use crate::models::mapname::Mapname;
use crate::storage::cache::{Clock, QueryCache};
use crate::topology::{Server, ServerGroup, Topology};

/// Per-deployment knobs that are not part of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub default_group: Option<String>,
    pub overview_keyword: String,
    pub mapnames_db: PathBuf,
    pub fmt: FmtConfig,
}

impl Settings {
    fn from_config(config: &QueryConfig) -> Self {
        Self {
            default_group: config.default_group.clone(),
            overview_keyword: config.overview_keyword.clone(),
            mapnames_db: config.mapnames_db.clone(),
            fmt: config.fmt.clone(),
        }
    }
}

pub struct QueryService {
    pub(crate) cache: QueryCache,
    topology: RwLock<Arc<Topology>>,
    maps: RwLock<Arc<MapLookup>>,
    settings: RwLock<Arc<Settings>>,
}

impl QueryService {
    pub fn new(cache: QueryCache, topology: Topology, settings: Settings) -> Self {
        Self {
            cache,
            topology: RwLock::new(Arc::new(topology)),
            maps: RwLock::new(Arc::new(MapLookup::default())),
            settings: RwLock::new(Arc::new(settings)),
        }
    }

    /// Builds the service from a loaded configuration with the A2S client.
    pub fn from_config(config: &QueryConfig) -> Self {
        let client: Arc<dyn QueryClient> = Arc::new(A2sClient::new(config.timeout()));
        Self::with_client(config, client, None)
    }

    pub fn with_client(
        config: &QueryConfig,
        client: Arc<dyn QueryClient>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_delay);
        let cache = match clock {
            Some(clock) => QueryCache::with_clock(client, clock, ttl),
            None => QueryCache::new(client, ttl),
        };
        let topology = Topology::build(&config.server_groups, &config.servers);
        Self::new(cache, topology, Settings::from_config(config))
    }

    pub fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.topology.read())
    }

    pub fn maps(&self) -> Arc<MapLookup> {
        Arc::clone(&self.maps.read())
    }

    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.read())
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn rebuild_topology(&self, groups: &[ServerGroupConfig], servers: &[ServerConfig]) {
        let topology = Topology::build(groups, servers);
        info!(
            "Topology rebuilt: {} groups, {} servers",
            topology.group_count(),
            topology.server_count()
        );
        *self.topology.write() = Arc::new(topology);
    }

    pub fn set_ttl(&self, seconds: u64) {
        self.cache.set_ttl(Duration::from_secs(seconds));
    }

    pub fn set_mapnames(&self, entries: &[Mapname]) {
        let lookup = build_reverse_lookup(entries);
        info!("Map lookup rebuilt with {} codes", lookup.len());
        *self.maps.write() = Arc::new(lookup);
    }

    /// Applies TTL, topology and settings from `config`. The query timeout
    /// is bound to the client and only changes on restart.
    pub fn apply_config(&self, config: &QueryConfig) {
        self.set_ttl(config.cache_delay);
        self.rebuild_topology(&config.server_groups, &config.servers);
        *self.settings.write() = Arc::new(Settings::from_config(config));
    }

    pub fn reload_config(&self, path: &Path) -> Result<QueryConfig, ConfigError> {
        let config = QueryConfig::load(path)?;
        self.apply_config(&config);
        Ok(config)
    }

    pub fn reload_mapnames(&self, path: &Path) -> Result<(), ConfigError> {
        let entries = config::load_mapnames(path)?;
        self.set_mapnames(&entries);
        Ok(())
    }

    /// The requested group, falling back to the default one.
    pub fn resolve_group(
        &self,
        topology: &Topology,
        requested: Option<&str>,
    ) -> Result<ServerGroup, LookupError> {
        let settings = self.settings();
        if let Some(group) = requested.and_then(|name| topology.group(name)) {
            return Ok(group.clone());
        }
        if let Some(name) = requested {
            warn!("Server group {} not found, trying default", name);
        }
        settings
            .default_group
            .as_deref()
            .and_then(|name| topology.group(name))
            .cloned()
            .ok_or_else(|| LookupError::GroupNotFound {
                requested: requested.map(str::to_string),
                default: settings.default_group.clone(),
            })
    }

    pub fn group_for_session(&self, session: &str) -> Option<String> {
        self.topology()
            .group_for_session(session)
            .map(|g| g.name.clone())
    }

    /// A server looked up inside one named group only.
    pub fn find_server(&self, server: &str, group: &str) -> Result<Arc<Server>, LookupError> {
        let topology = self.topology();
        let found = topology.group(group).ok_or_else(|| LookupError::GroupNotFound {
            requested: Some(group.to_string()),
            default: None,
        })?;
        found
            .servers
            .get(server)
            .cloned()
            .ok_or_else(|| LookupError::ServerNotFound {
                group: group.to_string(),
                server: server.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::storage::cache::testing::{FakeClient, ManualClock};

    fn sample_config() -> QueryConfig {
        QueryConfig::parse(
            r#"
[srcquery]
default_group = "main"

[[srcquery.server_groups]]
name = "main"
related_sessions = ["111"]

[[srcquery.server_groups]]
name = "side"

[[srcquery.servers]]
group = "main"
name = "alpha"
host = "h"
port = 1

[[srcquery.servers]]
group = "side"
name = "gamma"
host = "h"
port = 3
"#,
            Path::new("test.toml"),
        )
        .unwrap()
    }

    fn service() -> QueryService {
        let client = Arc::new(FakeClient::default());
        let clock: Arc<dyn Clock> = ManualClock::at(0);
        QueryService::with_client(&sample_config(), client, Some(clock))
    }

    #[test]
    fn resolves_requested_then_default_group() {
        let svc = service();
        let topo = svc.topology();
        assert_eq!(svc.resolve_group(&topo, Some("side")).unwrap().name, "side");
        assert_eq!(svc.resolve_group(&topo, None).unwrap().name, "main");
        assert_eq!(svc.resolve_group(&topo, Some("missing")).unwrap().name, "main");
    }

    #[test]
    fn missing_requested_and_default_group_is_not_found() {
        let svc = service();
        svc.rebuild_topology(&[], &[]);
        let err = svc.resolve_group(&svc.topology(), Some("missing")).unwrap_err();
        assert_eq!(
            err,
            LookupError::GroupNotFound {
                requested: Some("missing".to_string()),
                default: Some("main".to_string()),
            }
        );
    }

    #[test]
    fn find_server_is_scoped_to_the_group() {
        let svc = service();
        assert_eq!(svc.find_server("alpha", "main").unwrap().port, 1);
        assert!(matches!(
            svc.find_server("gamma", "main"),
            Err(LookupError::ServerNotFound { .. })
        ));
        assert!(matches!(
            svc.find_server("alpha", "nope"),
            Err(LookupError::GroupNotFound { .. })
        ));
    }

    #[test]
    fn rebuild_swaps_whole_topology() {
        let svc = service();
        let before = svc.topology();
        svc.rebuild_topology(
            &[ServerGroupConfig {
                name: "new".to_string(),
                related_sessions: vec![],
            }],
            &[],
        );
        assert!(before.contains_server("alpha"));
        assert!(!svc.topology().contains_server("alpha"));
        assert!(svc.topology().group("new").is_some());
    }

    #[test]
    fn session_maps_to_group() {
        let svc = service();
        assert_eq!(svc.group_for_session("111").as_deref(), Some("main"));
        assert_eq!(svc.group_for_session("222"), None);
    }

    #[test]
    fn reloads_map_database_from_disk() {
        let svc = service();
        let path = std::env::temp_dir().join(format!("srcquery-maps-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[[mapnames]]\nname = \"Dead Center\"\nmaps = [\"c1m1_hotel\"]").unwrap();
        drop(file);

        svc.reload_mapnames(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(svc.maps().lookup("c1m1_hotel").unwrap().name, "Dead Center");
    }

    #[test]
    fn apply_config_updates_ttl() {
        let svc = service();
        let mut config = sample_config();
        config.cache_delay = 60;
        svc.apply_config(&config);
        assert_eq!(svc.cache().ttl(), Duration::from_secs(60));
    }
}
