use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{Level, info};

use crate::core::workspace::validate_name;
use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Defaults to `<data dir>/build.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Defaults to `<data dir>/artifacts`.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default)]
    pub qmk: QmkConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QmkConfig {
    /// Holds one QMK firmware checkout per version, e.g. `<base_dir>/0.22.12`.
    #[serde(default = "default_qmk_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_qmk_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_keymap_name")]
    pub keymap_name: String,

    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_openid_configuration_url")]
    pub openid_configuration_url: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_email")]
    pub email: String,

    #[serde(default = "default_audience_prefix")]
    pub audience_prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_concurrent_requests() -> usize {
    4
}
fn default_qmk_base_dir() -> PathBuf {
    PathBuf::from("/root/versions")
}
fn default_qmk_binary() -> PathBuf {
    PathBuf::from("/root/.local/bin/qmk")
}
fn default_keymap_name() -> String {
    "remap".to_string()
}
fn default_build_timeout_secs() -> u64 {
    600
}
fn default_openid_configuration_url() -> String {
    "https://accounts.google.com/.well-known/openid-configuration".to_string()
}
fn default_issuer() -> String {
    "https://accounts.google.com".to_string()
}
fn default_email() -> String {
    "remap-build-server-task-auth@remap-b2d08.iam.gserviceaccount.com".to_string()
}
fn default_audience_prefix() -> String {
    "https://build.remap-keys.app/build?".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            database_path: None,
            artifact_dir: None,
            max_concurrent_requests: default_max_concurrent_requests(),
            qmk: QmkConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for QmkConfig {
    fn default() -> Self {
        Self {
            base_dir: default_qmk_base_dir(),
            binary: default_qmk_binary(),
            keymap_name: default_keymap_name(),
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            openid_configuration_url: default_openid_configuration_url(),
            issuer: default_issuer(),
            email: default_email(),
            audience_prefix: default_audience_prefix(),
        }
    }
}

impl ServerConfig {
    pub fn default_path() -> PathBuf {
        NativePlatform::data_dir().join("config.toml")
    }

    /// Read the TOML file at `path` (or the default location), then apply
    /// environment overrides. A missing file means defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config = Self::from_toml(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            info!("No {} found, using defaults.", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override file values with the environment as seen through `lookup`.
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(path) = get("BUILD_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = get("ARTIFACT_DIR") {
            self.artifact_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get("QMK_BASE_DIR") {
            self.qmk.base_dir = PathBuf::from(dir);
        }
        if let Some(binary) = get("QMK_BINARY") {
            self.qmk.binary = PathBuf::from(binary);
        }
        if let Some(email) = get("AUTH_EMAIL") {
            self.auth.email = email;
        }
        if let Some(prefix) = get("AUTH_AUDIENCE_PREFIX") {
            self.auth.audience_prefix = prefix;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.qmk.build_timeout_secs == 0 {
            bail!("qmk.build_timeout_secs must be greater than zero");
        }
        if self.max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be greater than zero");
        }
        validate_name(&self.qmk.keymap_name, "keymap")?;
        self.level()?;
        Ok(())
    }

    pub fn level(&self) -> Result<Level> {
        Level::from_str(self.log_level.trim())
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.log_level))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| NativePlatform::data_dir().join("build.db"))
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| NativePlatform::data_dir().join("artifacts"))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.qmk.build_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:80");
        assert_eq!(config.qmk.base_dir, PathBuf::from("/root/versions"));
        assert_eq!(config.qmk.binary, PathBuf::from("/root/.local/bin/qmk"));
        assert_eq!(config.qmk.keymap_name, "remap");
        assert_eq!(config.build_timeout(), Duration::from_secs(600));
        assert_eq!(config.auth.issuer, "https://accounts.google.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = ServerConfig::from_toml(
            r#"
port = 8080
database_path = "/var/lib/qmk/build.db"

[qmk]
base_dir = "/srv/qmk"
build_timeout_secs = 120
"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/qmk/build.db"));
        assert_eq!(config.qmk.base_dir, PathBuf::from("/srv/qmk"));
        assert_eq!(config.qmk.keymap_name, "remap");
        assert_eq!(config.build_timeout(), Duration::from_secs(120));
        assert_eq!(config.auth.audience_prefix, "https://build.remap-keys.app/build?");
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut config = ServerConfig::from_toml("port = 8080").unwrap();
        config
            .apply_env(env(&[
                ("PORT", "9000"),
                ("QMK_BASE_DIR", "/opt/versions"),
                ("AUTH_EMAIL", "ci@example.com"),
                ("HOST", ""),
            ]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.qmk.base_dir, PathBuf::from("/opt/versions"));
        assert_eq!(config.auth.email, "ci@example.com");
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("PORT", "eighty")])).is_err());

        let config = ServerConfig::from_toml("[qmk]\nbuild_timeout_secs = 0").unwrap();
        assert!(config.validate().is_err());

        let config = ServerConfig::from_toml("max_concurrent_requests = 0").unwrap();
        assert!(config.validate().is_err());

        let config = ServerConfig::from_toml("log_level = \"loud\"").unwrap();
        assert!(config.validate().is_err());

        assert!(ServerConfig::from_toml("port = 70000").is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(Some(&dir.path().join("absent.toml")))
            .await
            .unwrap();
        assert_eq!(config.qmk.keymap_name, "remap");
    }
}
