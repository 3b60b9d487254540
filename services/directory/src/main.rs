use std::process::ExitCode;

use directory::{
    config::ServiceConfig,
    transport::{AuditLog, DirectoryRuntime},
    transport_axum::serve_http_with_axum,
};
use store::ContactStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env();

    let store = match config.wal_path.as_deref() {
        Some(wal_path) => match ContactStore::open_path(wal_path, config.checkpoint_policy) {
            Ok((store, stats)) => {
                info!(
                    wal = %wal_path.display(),
                    contacts_loaded = stats.contacts_loaded,
                    retired_ids = stats.retired_ids,
                    snapshot_records = stats.replay.snapshot_records,
                    wal_delta_records = stats.replay.wal_records,
                    "directory startup replay"
                );
                store
            }
            Err(err) => {
                error!(wal = %wal_path.display(), error = %err, "failed opening contact log");
                return ExitCode::FAILURE;
            }
        },
        None => {
            info!("no DIRECTORY_WAL_PATH set, contacts live in memory only");
            ContactStore::new()
        }
    };

    let audit = match config.audit_log_path.as_deref() {
        Some(path) => match AuditLog::to_file(path) {
            Ok(audit) => audit,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed opening audit log");
                return ExitCode::FAILURE;
            }
        },
        None => AuditLog::disabled(),
    };

    info!(
        bind_addr = %config.bind_addr,
        http_workers = config.http_workers,
        max_wal_records = ?config.checkpoint_policy.max_wal_records,
        audit_log = ?audit.path(),
        "directory starting"
    );

    let runtime = DirectoryRuntime::new(store, audit);
    match serve_http_with_axum(runtime, &config.bind_addr, config.http_workers) {
        Ok(()) => {
            info!("directory stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "directory transport failed");
            ExitCode::FAILURE
        }
    }
}
