//! Startup reconciliation for telemetry state.
//!
//! Runs once per process lifetime, before any event is accepted and before
//! the sampler starts. Sessions left open by an unclean shutdown are closed
//! at the latest time their server was known populated, never earlier than
//! their own connect time; stamping them with the repair instant would be
//! wrong after an extended outage. Also registers the configured backend
//! servers, ignoring ones already present.

use crate::db::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairSummary {
    pub sessions_closed: u64,
    pub servers_registered: usize,
}

pub fn run(db: &Db, server_names: &[String]) -> Result<RepairSummary, String> {
    let sessions_closed = db.close_abandoned_sessions()?;

    for name in server_names {
        db.ensure_server(name)?;
    }

    Ok(RepairSummary {
        sessions_closed,
        servers_registered: server_names.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_open_sessions_at_last_populated_time() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        db.open_session("abc", "lobby", 100).expect("open session");
        db.insert_sample("lobby", 500, 4).expect("insert sample");
        db.insert_sample("lobby", 700, 0).expect("insert sample");

        let summary = run(&db, &[]).expect("repair");
        assert_eq!(summary.sessions_closed, 1);

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions[0].disconnect_time, Some(500));
    }

    #[test]
    fn second_run_is_a_noop() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        db.open_session("abc", "lobby", 100).expect("open session");
        db.insert_sample("lobby", 500, 4).expect("insert sample");

        run(&db, &[]).expect("first repair");
        let summary = run(&db, &[]).expect("second repair");
        assert_eq!(summary.sessions_closed, 0);

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions[0].disconnect_time, Some(500));
    }

    #[test]
    fn leaves_closed_sessions_untouched() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        db.open_session("abc", "lobby", 100).expect("open session");
        db.close_session("abc", "lobby", 140).expect("close session");
        db.insert_sample("lobby", 500, 4).expect("insert sample");

        let summary = run(&db, &[]).expect("repair");
        assert_eq!(summary.sessions_closed, 0);

        let sessions = db.list_sessions().expect("list sessions");
        assert_eq!(sessions[0].disconnect_time, Some(140));
    }

    #[test]
    fn registers_configured_servers_idempotently() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("gatehouse.db")).expect("db init");

        let names = vec!["lobby".to_string(), "arena".to_string()];
        run(&db, &names).expect("first repair");
        run(&db, &names).expect("second repair");

        assert_eq!(db.known_servers().expect("list"), vec!["arena", "lobby"]);
    }
}
