use std::path::PathBuf;

/// Server settings, read once from `TABLEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub notify_url: Option<String>,
    pub restaurant_name: String,
    pub admin: Option<AdminSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to their default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let admin = match (get("TABLEBOOK_ADMIN_USER"), get("TABLEBOOK_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminSeed {
                email: get("TABLEBOOK_ADMIN_EMAIL").unwrap_or_else(|| format!("{username}@localhost")),
                username,
                password,
            }),
            _ => None,
        };
        Self {
            bind: get("TABLEBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("TABLEBOOK_PORT").and_then(|s| s.parse().ok()).unwrap_or(7878),
            data_dir: PathBuf::from(get("TABLEBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            max_connections: get("TABLEBOOK_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            compact_threshold: get("TABLEBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            metrics_port: get("TABLEBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
            notify_url: get("TABLEBOOK_NOTIFY_URL").filter(|s| !s.is_empty()),
            restaurant_name: get("TABLEBOOK_RESTAURANT_NAME").unwrap_or_else(|| "Crisbi's".into()),
            admin,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("tablebook.wal")
    }
}
