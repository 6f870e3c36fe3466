//! Gatehouse daemon entrypoint.
//!
//! A small single-writer service that answers allow-list admission checks for
//! a multi-server game proxy and records session/occupancy telemetry. The
//! proxy connects over a unix socket, asks for verdicts on connection
//! attempts, and reports post-connect/disconnect events; a fixed-interval
//! thread samples per-server population into a run-length-compressed series.

use chrono::Utc;
use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gatehouse_protocol::{
    parse_admission, parse_event, ErrorInfo, EventType, Method, Request, Response,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod admission;
mod config;
mod db;
mod messages;
mod repair;
mod roster;
mod sampler;
mod sessions;

use admission::AdmissionGate;
use config::RuntimeConfig;
use db::Db;
use messages::MessageCatalog;
use roster::Roster;

const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

struct DaemonState {
    db: Db,
    config: RuntimeConfig,
    messages: MessageCatalog,
    roster: Roster,
    telemetry_enabled: bool,
}

fn main() {
    init_logging();

    let config = match config::load_runtime_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            RuntimeConfig::default()
        }
    };

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    let db_path = match resolve_db_path(&config) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    // Startup repair gates the telemetry subsystem for this process lifetime;
    // admission keeps operating either way.
    let telemetry_enabled = match repair::run(&db, &config.servers.names) {
        Ok(summary) => {
            info!(
                sessions_closed = summary.sessions_closed,
                servers_registered = summary.servers_registered,
                "Telemetry startup repair complete"
            );
            true
        }
        Err(err) => {
            error!(error = %err, "Failed to repair telemetry state; telemetry disabled");
            false
        }
    };

    let roster = Roster::default();
    roster.seed_servers(&config.servers.names);
    if telemetry_enabled {
        match db.known_servers() {
            Ok(names) => roster.seed_servers(&names),
            Err(err) => warn!(error = %err, "Failed to seed roster from known servers"),
        }
    }

    let messages = MessageCatalog::new(&config.messages);
    let state = Arc::new(DaemonState {
        db,
        config,
        messages,
        roster,
        telemetry_enabled,
    });

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    if state.telemetry_enabled {
        spawn_population_sampler(Arc::clone(&state));
    }

    info!(
        path = %socket_path.display(),
        whitelist_enforced = state.config.whitelist.enabled,
        telemetry = state.telemetry_enabled,
        "Gatehouse daemon started"
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn spawn_population_sampler(state: Arc<DaemonState>) {
    let interval = Duration::from_secs(state.config.sampler.interval_secs);
    thread::spawn(move || loop {
        let now = Utc::now().timestamp();
        sampler::sample_once(&state.db, &state.roster, now);
        thread::sleep(interval);
    });
}

fn init_logging() {
    let debug_enabled = env::var("GATEHOUSE_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".gatehouse").join(SOCKET_NAME))
}

fn resolve_db_path(config: &RuntimeConfig) -> Result<PathBuf, String> {
    if let Some(path) = &config.database.path {
        if !path.as_os_str().is_empty() {
            return Ok(path.clone());
        }
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".gatehouse").join("gatehouse.db"))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<DaemonState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: Arc<DaemonState>) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => Response::ok(
            request.id,
            serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "whitelist_enforced": state.config.whitelist.enabled,
                "telemetry": state.telemetry_enabled,
                "sampler_interval_secs": state.config.sampler.interval_secs,
            }),
        ),
        Method::CheckAdmission => {
            let params = match request.params {
                Some(params) => params,
                None => {
                    return Response::error(
                        request.id,
                        "invalid_params",
                        "admission params are required",
                    )
                }
            };
            let parsed = match parse_admission(params) {
                Ok(parsed) => parsed,
                Err(err) => return Response::error_with_info(request.id, err),
            };

            let gate = AdmissionGate::new(&state.db, &state.config.whitelist, &state.messages);
            let outcome = gate.check(&parsed.identity());
            tracing::debug!(
                player = %parsed.display_name,
                server = %parsed.server,
                allowed = outcome.allowed,
                "Admission check"
            );
            match serde_json::to_value(&outcome) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => Response::error(
                    request.id,
                    "serialization_error",
                    format!("Failed to serialize admission outcome: {}", err),
                ),
            }
        }
        Method::Event => handle_event(request, state),
        Method::ListAllowed => match state.db.list_identity_names() {
            Ok(names) => match serde_json::to_value(names) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => Response::error(
                    request.id,
                    "serialization_error",
                    format!("Failed to serialize allow-list: {}", err),
                ),
            },
            Err(err) => Response::error(
                request.id,
                "store_error",
                format!("Failed to list allow-list: {}", err),
            ),
        },
    }
}

fn handle_event(request: Request, state: Arc<DaemonState>) -> Response {
    let params = match request.params {
        Some(params) => params,
        None => return Response::error(request.id, "invalid_params", "event payload is required"),
    };

    let event = match parse_event(params) {
        Ok(event) => event,
        Err(err) => return Response::error_with_info(request.id, err),
    };

    info!(
        event_type = ?event.event_type,
        player = %event.display_name,
        server = %event.server,
        "Received event"
    );

    match event.event_type {
        EventType::ServerConnected => state.roster.player_joined(&event.server, &event.stable_id),
        EventType::ServerDisconnected => state.roster.player_left(&event.server, &event.stable_id),
    }

    if !state.telemetry_enabled {
        return Response::ok(
            request.id,
            serde_json::json!({"accepted": true, "recorded": false}),
        );
    }

    // Recording is best-effort; a store failure is logged and the event is
    // dropped without surfacing an error to the proxy.
    let recorded = match sessions::record_event(&state.db, &event) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                error = %err,
                player = %event.display_name,
                server = %event.server,
                "Failed to record session event"
            );
            false
        }
    };

    Response::ok(
        request.id,
        serde_json::json!({"accepted": true, "recorded": recorded}),
    )
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
