//! Session recording for post-connect and disconnect events.
//!
//! Recording is best-effort: the dispatch layer logs failures and drops the
//! event, and a telemetry write never blocks or reverses the underlying
//! connection. Connects insert unconditionally; the proxy's strictly
//! alternating connect/disconnect ordering per player is what keeps a
//! (player, server) pair from accumulating more than one open row.

use gatehouse_protocol::{EventEnvelope, EventType};
use tracing::debug;

use crate::db::Db;

pub fn record_event(db: &Db, event: &EventEnvelope) -> Result<(), String> {
    let recorded_at = event
        .recorded_at_epoch()
        .ok_or_else(|| format!("Failed to parse event timestamp: {}", event.recorded_at))?;

    match event.event_type {
        EventType::ServerConnected => db.open_session(&event.stable_id, &event.server, recorded_at),
        EventType::ServerDisconnected => {
            let closed = db.close_session(&event.stable_id, &event.server, recorded_at)?;
            if closed == 0 {
                debug!(
                    player = %event.stable_id,
                    server = %event.server,
                    "Disconnect without a matching open session"
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, recorded_at: &str) -> EventEnvelope {
        EventEnvelope {
            recorded_at: recorded_at.to_string(),
            event_type,
            stable_id: "abc".to_string(),
            display_name: "Alice".to_string(),
            server: "lobby".to_string(),
        }
    }

    #[test]
    fn connect_then_disconnect_yields_single_closed_row() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        record_event(
            &db,
            &event(EventType::ServerConnected, "1970-01-01T00:01:40Z"),
        )
        .expect("record connect");
        record_event(
            &db,
            &event(EventType::ServerDisconnected, "1970-01-01T00:05:00Z"),
        )
        .expect("record disconnect");

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].connect_time, 100);
        assert_eq!(sessions[0].disconnect_time, Some(300));
    }

    #[test]
    fn disconnect_without_open_session_is_a_noop() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        record_event(
            &db,
            &event(EventType::ServerDisconnected, "1970-01-01T00:05:00Z"),
        )
        .expect("record disconnect");

        assert!(db.list_sessions().expect("list sessions").is_empty());
    }

    #[test]
    fn connect_inserts_unconditionally() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        record_event(
            &db,
            &event(EventType::ServerConnected, "1970-01-01T00:01:40Z"),
        )
        .expect("first connect");
        record_event(
            &db,
            &event(EventType::ServerConnected, "1970-01-01T00:01:50Z"),
        )
        .expect("second connect");

        assert_eq!(db.list_sessions().expect("list sessions").len(), 2);
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        let mut bad = event(EventType::ServerConnected, "1970-01-01T00:01:40Z");
        bad.recorded_at = "garbage".to_string();
        assert!(record_event(&db, &bad).is_err());
        assert!(db.list_sessions().expect("list sessions").is_empty());
    }
}
