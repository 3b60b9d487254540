use std::path::PathBuf;

use store::CheckpointPolicy;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub http_workers: usize,
    pub wal_path: Option<PathBuf>,
    pub checkpoint_policy: CheckpointPolicy,
    pub audit_log_path: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable or zero numeric
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("DIRECTORY_BIND")
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                parse_with::<u16, _>(&lookup, "PORT").map(|port| format!("0.0.0.0:{port}"))
            })
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let http_workers = parse_with::<usize, _>(&lookup, "DIRECTORY_HTTP_WORKERS")
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_http_workers);
        let checkpoint_policy = CheckpointPolicy {
            max_wal_records: parse_with::<usize, _>(
                &lookup,
                "DIRECTORY_CHECKPOINT_MAX_WAL_RECORDS",
            )
            .filter(|value| *value > 0),
        };

        Self {
            bind_addr,
            http_workers,
            wal_path: path_with(&lookup, "DIRECTORY_WAL_PATH"),
            checkpoint_policy,
            audit_log_path: path_with(&lookup, "DIRECTORY_AUDIT_LOG_PATH"),
        }
    }
}

fn parse_with<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|value| value.trim().parse::<T>().ok())
}

fn path_with<F>(lookup: &F, key: &str) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.http_workers >= 1);
        assert_eq!(config.wal_path, None);
        assert_eq!(config.checkpoint_policy, CheckpointPolicy::default());
        assert_eq!(config.audit_log_path, None);
    }

    #[test]
    fn port_is_used_when_bind_is_absent() {
        assert_eq!(config_from(&[("PORT", "8080")]).bind_addr, "0.0.0.0:8080");
        assert_eq!(
            config_from(&[("DIRECTORY_BIND", "127.0.0.1:9000"), ("PORT", "8080")]).bind_addr,
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn invalid_or_zero_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("DIRECTORY_HTTP_WORKERS", "0"),
            ("DIRECTORY_CHECKPOINT_MAX_WAL_RECORDS", "0"),
        ]);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.http_workers >= 1);
        assert_eq!(config.checkpoint_policy.max_wal_records, None);
    }

    #[test]
    fn persistence_and_audit_paths_are_read() {
        let config = config_from(&[
            ("DIRECTORY_WAL_PATH", "/tmp/contacts.wal"),
            ("DIRECTORY_CHECKPOINT_MAX_WAL_RECORDS", "500"),
            ("DIRECTORY_AUDIT_LOG_PATH", "/tmp/audit.jsonl"),
            ("DIRECTORY_HTTP_WORKERS", "3"),
        ]);
        assert_eq!(config.wal_path, Some(PathBuf::from("/tmp/contacts.wal")));
        assert_eq!(config.checkpoint_policy.max_wal_records, Some(500));
        assert_eq!(config.audit_log_path, Some(PathBuf::from("/tmp/audit.jsonl")));
        assert_eq!(config.http_workers, 3);
    }
}
