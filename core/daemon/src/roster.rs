//! Live per-server population mirrored from proxy connect/disconnect events.
//!
//! The roster is not persisted: the proxy owns the live population and the
//! daemon's copy rebuilds itself as events arrive. A server stays listed once
//! seen, so a drained server keeps reporting zero to the sampler instead of
//! disappearing from the series.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::warn;

use crate::sampler::{PopulationSource, ServerPopulation};

#[derive(Default)]
pub struct Roster {
    servers: Mutex<HashMap<String, HashSet<String>>>,
}

impl Roster {
    pub fn seed_servers(&self, names: &[String]) {
        match self.servers.lock() {
            Ok(mut servers) => {
                for name in names {
                    servers.entry(name.clone()).or_default();
                }
            }
            Err(_) => warn!("Population roster lock poisoned; dropping server seed"),
        }
    }

    pub fn player_joined(&self, server: &str, stable_id: &str) {
        match self.servers.lock() {
            Ok(mut servers) => {
                servers
                    .entry(server.to_string())
                    .or_default()
                    .insert(stable_id.to_string());
            }
            Err(_) => warn!(server = %server, "Population roster lock poisoned; dropping join"),
        }
    }

    pub fn player_left(&self, server: &str, stable_id: &str) {
        match self.servers.lock() {
            Ok(mut servers) => {
                if let Some(players) = servers.get_mut(server) {
                    players.remove(stable_id);
                }
            }
            Err(_) => warn!(server = %server, "Population roster lock poisoned; dropping leave"),
        }
    }
}

impl PopulationSource for Roster {
    fn snapshot(&self) -> Result<Vec<ServerPopulation>, String> {
        let servers = self
            .servers
            .lock()
            .map_err(|_| "Population roster lock poisoned".to_string())?;

        let mut populations = servers
            .iter()
            .map(|(server, players)| ServerPopulation {
                server: server.clone(),
                players: players.len() as u32,
            })
            .collect::<Vec<_>>();
        populations.sort_by(|left, right| left.server.cmp(&right.server));
        Ok(populations)
    }
}
