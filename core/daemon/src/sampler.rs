//! Periodic population sampling with run-length compression.
//!
//! A server whose population never changes accumulates exactly one row whose
//! `time` keeps advancing; a change in population starts a new row. Between
//! one sample and the next a server is assumed to have held the earlier
//! sample's count.

use tracing::warn;

use crate::db::Db;

/// Point-in-time occupancy of one backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPopulation {
    pub server: String,
    pub players: u32,
}

/// Read-side view of the proxy's current per-server population.
pub trait PopulationSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ServerPopulation>, String>;
}

/// Records one sample per known server. A failure for one server never
/// aborts the pass; the remaining servers are still sampled.
pub fn sample_once(db: &Db, source: &dyn PopulationSource, now: i64) {
    let populations = match source.snapshot() {
        Ok(populations) => populations,
        Err(err) => {
            warn!(error = %err, "Failed to read live population snapshot");
            return;
        }
    };

    for population in populations {
        if let Err(err) = sample_server(db, &population, now) {
            warn!(
                error = %err,
                server = %population.server,
                "Failed to write population sample"
            );
        }
    }
}

fn sample_server(db: &Db, population: &ServerPopulation, now: i64) -> Result<(), String> {
    db.ensure_server(&population.server)?;

    let players = i64::from(population.players);
    match db.latest_sample_time_for_count(&population.server, players)? {
        // The most recent sample already shows this count; extend the run.
        Some(time) => {
            db.advance_sample_time(&population.server, time, now)?;
        }
        None => {
            db.insert_sample(&population.server, now, players)?;
        }
    }
    Ok(())
}
