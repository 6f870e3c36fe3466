//! SQLite persistence for gatehouse-daemon.
//!
//! The single shared store backing the admission gate and the telemetry
//! subsystem. Every read is a point-in-time query; no component keeps an
//! authoritative in-memory copy of persisted state. Timestamps are unix
//! epoch seconds so the SQL comparisons stay exact.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;

pub struct Db {
    path: PathBuf,
}

/// One player presence on one server. `disconnect_time` is `None` while the
/// session is open.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub player: String,
    pub server: String,
    pub connect_time: i64,
    pub disconnect_time: Option<i64>,
}

/// One change point in a server's run-length-encoded occupancy series.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub server: String,
    pub time: i64,
    pub player_count: i64,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn identity_allowed(&self, stable_id: &str, display_name: &str) -> Result<bool, String> {
        let count = self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM identities WHERE stable_id = ?1 AND display_name = ?2",
                params![stable_id, display_name],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| format!("Failed to query allow-list: {}", err))
        })?;
        Ok(count > 0)
    }

    #[cfg(test)]
    pub fn insert_identity(&self, stable_id: &str, display_name: &str) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO identities (stable_id, display_name) VALUES (?1, ?2)",
                params![stable_id, display_name],
            )
            .map_err(|err| format!("Failed to insert identity: {}", err))?;
            Ok(())
        })
    }

    pub fn list_identity_names(&self) -> Result<Vec<String>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT display_name FROM identities ORDER BY display_name ASC")
                .map_err(|err| format!("Failed to prepare allow-list query: {}", err))?;

            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read allow-list rows: {}", err))?;

            let mut names = Vec::new();
            for row in rows {
                names.push(row.map_err(|err| format!("Failed to decode identity row: {}", err))?);
            }
            Ok(names)
        })
    }

    pub fn open_session(&self, player: &str, server: &str, connect_time: i64) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sessions (player, server, connect_time) VALUES (?1, ?2, ?3)",
                params![player, server, connect_time],
            )
            .map_err(|err| format!("Failed to insert session: {}", err))?;
            Ok(())
        })
    }

    pub fn close_session(
        &self,
        player: &str,
        server: &str,
        disconnect_time: i64,
    ) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE sessions SET disconnect_time = ?3 \
                 WHERE disconnect_time IS NULL AND player = ?1 AND server = ?2",
                params![player, server, disconnect_time],
            )
            .map(|count| count as u64)
            .map_err(|err| format!("Failed to close session: {}", err))
        })
    }

    /// Closes every open session at the latest time its server was observed
    /// with a non-zero population, never earlier than the session's own
    /// connect time. Servers with no qualifying sample fall back to the
    /// connect time (IFNULL keeps the scalar MAX from going NULL).
    pub fn close_abandoned_sessions(&self) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE sessions \
                 SET disconnect_time = MAX(connect_time, IFNULL( \
                        (SELECT MAX(time) FROM population_samples p \
                         WHERE p.server = sessions.server AND p.player_count > 0), 0)) \
                 WHERE disconnect_time IS NULL",
                [],
            )
            .map(|count| count as u64)
            .map_err(|err| format!("Failed to close abandoned sessions: {}", err))
        })
    }

    pub fn ensure_server(&self, name: &str) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO servers (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![name],
            )
            .map_err(|err| format!("Failed to register server: {}", err))?;
            Ok(())
        })
    }

    pub fn known_servers(&self) -> Result<Vec<String>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM servers ORDER BY name ASC")
                .map_err(|err| format!("Failed to prepare servers query: {}", err))?;

            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read server rows: {}", err))?;

            let mut names = Vec::new();
            for row in rows {
                names.push(row.map_err(|err| format!("Failed to decode server row: {}", err))?);
            }
            Ok(names)
        })
    }

    /// Time of the most recent sample for `server`, but only when that sample
    /// already shows `player_count`. `None` means the count changed (or no
    /// sample exists) and a new row must start.
    pub fn latest_sample_time_for_count(
        &self,
        server: &str,
        player_count: i64,
    ) -> Result<Option<i64>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT time FROM population_samples \
                 WHERE server = ?1 AND player_count = ?2 \
                   AND time = (SELECT MAX(time) FROM population_samples WHERE server = ?1)",
                params![server, player_count],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|err| format!("Failed to query latest sample: {}", err))
        })
    }

    pub fn insert_sample(&self, server: &str, time: i64, player_count: i64) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO population_samples (server, time, player_count) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(server, time) DO UPDATE SET \
                    player_count = excluded.player_count",
                params![server, time, player_count],
            )
            .map_err(|err| format!("Failed to insert population sample: {}", err))?;
            Ok(())
        })
    }

    pub fn advance_sample_time(
        &self,
        server: &str,
        from_time: i64,
        to_time: i64,
    ) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE population_samples SET time = ?3 WHERE server = ?1 AND time = ?2",
                params![server, from_time, to_time],
            )
            .map(|count| count as u64)
            .map_err(|err| format!("Failed to advance population sample: {}", err))
        })
    }

    #[cfg(test)]
    pub fn list_sessions(&self) -> Result<Vec<SessionRow>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT player, server, connect_time, disconnect_time \
                     FROM sessions ORDER BY connect_time ASC, player ASC",
                )
                .map_err(|err| format!("Failed to prepare sessions query: {}", err))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(SessionRow {
                        player: row.get(0)?,
                        server: row.get(1)?,
                        connect_time: row.get(2)?,
                        disconnect_time: row.get(3)?,
                    })
                })
                .map_err(|err| format!("Failed to query sessions: {}", err))?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(|err| format!("Failed to decode session row: {}", err))?);
            }
            Ok(sessions)
        })
    }

    #[cfg(test)]
    pub fn list_samples(&self, server: &str) -> Result<Vec<SampleRow>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT server, time, player_count FROM population_samples \
                     WHERE server = ?1 ORDER BY time ASC",
                )
                .map_err(|err| format!("Failed to prepare samples query: {}", err))?;

            let rows = stmt
                .query_map(params![server], |row| {
                    Ok(SampleRow {
                        server: row.get(0)?,
                        time: row.get(1)?,
                        player_count: row.get(2)?,
                    })
                })
                .map_err(|err| format!("Failed to query samples: {}", err))?;

            let mut samples = Vec::new();
            for row in rows {
                samples.push(row.map_err(|err| format!("Failed to decode sample row: {}", err))?);
            }
            Ok(samples)
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS identities (
                    stable_id TEXT NOT NULL,
                    display_name TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS servers (
                    name TEXT PRIMARY KEY
                 );
                 CREATE TABLE IF NOT EXISTS sessions (
                    player TEXT NOT NULL,
                    server TEXT NOT NULL,
                    connect_time INTEGER NOT NULL,
                    disconnect_time INTEGER
                 );
                 CREATE TABLE IF NOT EXISTS population_samples (
                    server TEXT NOT NULL,
                    time INTEGER NOT NULL,
                    player_count INTEGER NOT NULL,
                    UNIQUE(server, time)
                 );
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))?;
            Ok(())
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create daemon data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}
