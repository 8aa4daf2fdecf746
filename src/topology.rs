// src/topology.rs
//! Groups and the servers they own, built once from configuration and
//! swapped wholesale on refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::{ServerConfig, ServerGroupConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Name of the owning group.
    pub group: String,
}

impl Server {
    pub fn key(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server(name={}, host={}, port={})", self.name, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ServerGroup {
    pub name: String,
    pub related_sessions: Vec<String>,
    pub servers: HashMap<String, Arc<Server>>,
}

impl ServerGroup {
    fn new(name: String, related_sessions: Vec<String>) -> Self {
        Self {
            name,
            related_sessions,
            servers: HashMap::new(),
        }
    }

    /// Servers ordered by name.
    pub fn sorted_servers(&self) -> Vec<Arc<Server>> {
        let mut servers: Vec<_> = self.servers.values().cloned().collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    groups: HashMap<String, ServerGroup>,
    servers: HashMap<String, Arc<Server>>,
}

impl Topology {
    /// Servers naming an unknown group are dropped with a warning. A name
    /// reused across groups keeps the last declaration in the global index.
    pub fn build(groups_conf: &[ServerGroupConfig], servers_conf: &[ServerConfig]) -> Self {
        let mut groups: HashMap<String, ServerGroup> = groups_conf
            .iter()
            .map(|g| {
                (
                    g.name.clone(),
                    ServerGroup::new(g.name.clone(), g.related_sessions.clone()),
                )
            })
            .collect();
        let mut servers = HashMap::new();

        for conf in servers_conf {
            let Some(group) = groups.get_mut(&conf.group) else {
                warn!("Orphan server {} names unknown group {}, skipping", conf.name, conf.group);
                continue;
            };
            let server = Arc::new(Server {
                name: conf.name.clone(),
                host: conf.host.clone(),
                port: conf.port,
                group: conf.group.clone(),
            });
            group.servers.insert(server.name.clone(), Arc::clone(&server));
            if let Some(prev) = servers.insert(server.name.clone(), server) {
                if prev.group != conf.group {
                    warn!(
                        "Server name {} declared in both {} and {}, keeping {}",
                        conf.name, prev.group, conf.group, conf.group
                    );
                }
            }
        }

        for group in groups.values() {
            debug!("Group {} owns {} servers", group.name, group.servers.len());
        }
        Self { groups, servers }
    }

    pub fn group(&self, name: &str) -> Option<&ServerGroup> {
        self.groups.get(name)
    }

    /// Exact, case-sensitive lookup across every group.
    pub fn server(&self, name: &str) -> Option<&Arc<Server>> {
        self.servers.get(name)
    }

    pub fn contains_server(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// First group (by name) listing the given session identifier.
    pub fn group_for_session(&self, session: &str) -> Option<&ServerGroup> {
        let mut groups: Vec<_> = self
            .groups
            .values()
            .filter(|g| g.related_sessions.iter().any(|s| s == session))
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups.into_iter().next()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}
