use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order (after DB connection): CLI > ENV > DB, then persist back to DB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token of the bootstrap admin user.
    pub admin_key: String,
    /// Database DSN used for this process.
    pub dsn: String,
    /// Optional outbound proxy (for upstream egress).
    #[serde(default)]
    pub proxy: Option<String>,
    /// Sent upstream as `HTTP-Referer`.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default)]
    pub data_dir: String,
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_key: Option<String>,
    pub dsn: Option<String>,
    pub proxy: Option<String>,
    pub site_url: Option<String>,
    pub data_dir: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.admin_key.is_some() {
            self.admin_key = other.admin_key;
        }
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.site_url.is_some() {
            self.site_url = other.site_url;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8787),
            admin_key: self
                .admin_key
                .ok_or(GlobalConfigError::MissingField("admin_key"))?,
            dsn: self.dsn.ok_or(GlobalConfigError::MissingField("dsn"))?,
            proxy: self.proxy.filter(|value| !value.trim().is_empty()),
            site_url: self.site_url.unwrap_or_else(default_site_url),
            data_dir: self.data_dir.unwrap_or_default(),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            admin_key: Some(value.admin_key),
            dsn: Some(value.dsn),
            proxy: value.proxy,
            site_url: Some(value.site_url),
            data_dir: Some(value.data_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win() {
        let mut patch = GlobalConfigPatch {
            host: Some("0.0.0.0".to_string()),
            port: Some(1),
            admin_key: Some("db-key".to_string()),
            dsn: Some("sqlite::memory:".to_string()),
            ..Default::default()
        };
        patch.overlay(GlobalConfigPatch {
            port: Some(9000),
            admin_key: Some("cli-key".to_string()),
            ..Default::default()
        });
        let config = patch.into_config().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.admin_key, "cli-key");
        assert_eq!(config.site_url, "http://localhost:3000");
    }

    #[test]
    fn missing_dsn_is_reported() {
        let patch = GlobalConfigPatch {
            admin_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            patch.into_config(),
            Err(GlobalConfigError::MissingField("dsn"))
        ));
    }

    #[test]
    fn blank_proxy_is_dropped() {
        let patch = GlobalConfigPatch {
            admin_key: Some("k".to_string()),
            dsn: Some("sqlite::memory:".to_string()),
            proxy: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(patch.into_config().unwrap().proxy, None);
    }
}
