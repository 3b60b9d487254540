use std::{
    fs::{OpenOptions, create_dir_all},
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc,
    thread::JoinHandle,
    time::Duration,
};

use serde::Serialize;
use tracing::{info, warn};

use crate::RequestPhase;

#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub status: u16,
    pub response_bytes: usize,
    pub elapsed: Duration,
    pub reached: RequestPhase,
    pub phase: RequestPhase,
    pub payload: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    ts: String,
    method: &'a str,
    path: &'a str,
    status: u16,
    bytes: usize,
    elapsed_ms: f64,
    phase: &'static str,
    reached: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a str>,
}

/// Per-request audit trail. Always emits a `tracing` event; when a file path
/// is configured, also hands a JSON line to a writer thread so the request
/// never waits on disk.
pub struct AuditLog {
    file_tx: Option<mpsc::Sender<String>>,
    writer: Option<JoinHandle<()>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn disabled() -> Self {
        Self {
            file_tx: None,
            writer: None,
            path: None,
        }
    }

    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (tx, rx) = mpsc::channel::<String>();
        let writer_path = path.clone();
        let writer = std::thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || {
                for line in rx {
                    if let Err(err) = writeln!(file, "{line}") {
                        warn!(path = %writer_path.display(), error = %err, "audit write failed");
                    }
                }
                let _ = file.flush();
            })?;
        Ok(Self {
            file_tx: Some(tx),
            writer: Some(writer),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, event: &AuditEvent<'_>) {
        let elapsed_ms = event.elapsed.as_secs_f64() * 1000.0;
        info!(
            target: "directory::audit",
            method = event.method,
            path = event.target,
            status = event.status,
            bytes = event.response_bytes,
            elapsed_ms = format_args!("{elapsed_ms:.3}"),
            phase = event.phase.as_str(),
            reached = event.reached.as_str(),
            payload = event.payload.as_deref().unwrap_or("-"),
            "{} {} {} {} - {elapsed_ms:.3} ms",
            event.method,
            event.target,
            event.status,
            event.response_bytes,
        );

        let Some(tx) = self.file_tx.as_ref() else {
            return;
        };
        let record = AuditRecord {
            ts: chrono::Utc::now().to_rfc3339(),
            method: event.method,
            path: event.target,
            status: event.status,
            bytes: event.response_bytes,
            elapsed_ms,
            phase: event.phase.as_str(),
            reached: event.reached.as_str(),
            payload: event.payload.as_deref(),
        };
        match serde_json::to_string(&record) {
            Ok(line) => {
                if tx.send(line).is_err() {
                    warn!("audit writer stopped, dropping audit record");
                }
            }
            Err(err) => warn!(error = %err, "audit record serialization failed"),
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.file_tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// Text logged for a request body: compact JSON when it parses, the raw
/// (lossy UTF-8) text otherwise, nothing for an empty body.
pub fn render_payload(body: &[u8]) -> Option<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => Some(value.to_string()),
        Err(_) => Some(String::from_utf8_lossy(body).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tracing_test::traced_test;

    fn temp_audit_path() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "directory-audit-{}-{nanos}.jsonl",
            std::process::id()
        ))
    }

    fn sample_event(payload: Option<String>) -> AuditEvent<'static> {
        AuditEvent {
            method: "POST",
            target: "/contacts",
            status: 200,
            response_bytes: 64,
            elapsed: Duration::from_micros(1_250),
            reached: RequestPhase::Persisted,
            phase: RequestPhase::Responded,
            payload,
        }
    }

    #[test]
    fn render_payload_compacts_json_and_skips_empty_bodies() {
        assert_eq!(
            render_payload(b"{ \"name\": \"Ada\",\n \"number\": \"1\" }"),
            Some(r#"{"name":"Ada","number":"1"}"#.to_string())
        );
        assert_eq!(render_payload(b""), None);
        assert_eq!(render_payload(b"  \n"), None);
        assert_eq!(render_payload(b"not json"), Some("not json".to_string()));
    }

    #[test]
    #[traced_test]
    fn record_emits_structured_line() {
        let audit = AuditLog::disabled();
        audit.record(&sample_event(Some(r#"{"name":"Ada"}"#.to_string())));
        assert!(logs_contain("POST /contacts 200 64"));
        assert!(logs_contain("phase=\"responded\""));
        assert!(logs_contain("Ada"));
    }

    #[test]
    fn file_sink_appends_one_json_line_per_request() {
        let path = temp_audit_path();
        let audit = AuditLog::to_file(&path).unwrap();
        assert_eq!(audit.path(), Some(path.as_path()));
        audit.record(&sample_event(Some(r#"{"name":"Ada"}"#.to_string())));
        audit.record(&sample_event(None));
        drop(audit);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[0]["status"], 200);
        assert_eq!(lines[0]["payload"], r#"{"name":"Ada"}"#);
        assert!(lines[1].get("payload").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unwritable_audit_path_fails_at_open_not_at_request_time() {
        let dir = temp_audit_path();
        std::fs::create_dir_all(&dir).unwrap();
        assert!(AuditLog::to_file(&dir).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
