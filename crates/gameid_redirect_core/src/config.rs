use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::identifier::RegionSlot;
use crate::store::{DEFAULT_BUSY_TIMEOUT, StoreSettings};

pub const DEFAULT_DB_PATH: &str = "gameid-redirect.db";
pub const DEFAULT_BIND: &str = "127.0.0.1:8033";
pub const DEFAULT_PAGE_URL: &str = "/index.php?title=$1";
pub const DEFAULT_FALLBACK_URL: &str = "/";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RedirectConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub redirect: RedirectSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RedirectSection {
    /// Page URL template; `$1` is replaced by the URL-escaped title.
    pub page_url: Option<String>,
    pub fallback_url: Option<String>,
    pub region_slot: Option<RegionSlot>,
}

/// Settings after applying env > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub store: StoreSettings,
    pub bind: SocketAddr,
    pub page_url: String,
    pub fallback_url: String,
    pub region_slot: RegionSlot,
}

impl ResolvedSettings {
    pub fn diagnostics(&self) -> String {
        format!(
            "db_path={}\nbusy_timeout_ms={}\nbind={}\npage_url={}\nfallback_url={}\nregion_slot={}",
            self.store.db_path.display(),
            self.store.busy_timeout.as_millis(),
            self.bind,
            self.page_url,
            self.fallback_url,
            self.region_slot.as_str()
        )
    }
}

impl RedirectConfig {
    /// Resolve settings from the process environment. Relative paths are taken
    /// from `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedSettings> {
        self.resolve_with_lookup(base_dir, |key| env::var(key).ok())
    }

    pub fn resolve_with_lookup<F>(&self, base_dir: &Path, lookup_env: F) -> Result<ResolvedSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = env_value("GAMEID_REDIRECT_DB")
            .map(PathBuf::from)
            .or_else(|| self.store.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let busy_timeout = self
            .store
            .busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT);

        let bind_raw = env_value("GAMEID_REDIRECT_BIND")
            .or_else(|| self.server.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("invalid bind address {bind_raw}"))?;

        let page_url = env_value("GAMEID_REDIRECT_PAGE_URL")
            .or_else(|| self.redirect.page_url.clone())
            .unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        if !page_url.contains("$1") {
            bail!("page_url must contain a $1 placeholder for the title: {page_url}");
        }
        let fallback_url = env_value("GAMEID_REDIRECT_FALLBACK_URL")
            .or_else(|| self.redirect.fallback_url.clone())
            .unwrap_or_else(|| DEFAULT_FALLBACK_URL.to_string());

        Ok(ResolvedSettings {
            store: StoreSettings {
                db_path: absolutize(&db_path, base_dir),
                busy_timeout,
            },
            bind,
            page_url,
            fallback_url,
            region_slot: self.redirect.region_slot.unwrap_or_default(),
        })
    }
}

/// Load and parse a RedirectConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<RedirectConfig> {
    if !config_path.exists() {
        return Ok(RedirectConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: RedirectConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn absolutize(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_resolve_against_base_dir() {
        let settings = RedirectConfig::default()
            .resolve_with_lookup(Path::new("/srv/wiki"), no_env)
            .expect("resolve");
        assert_eq!(
            settings.store.db_path,
            PathBuf::from("/srv/wiki/gameid-redirect.db")
        );
        assert_eq!(settings.store.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert_eq!(settings.bind.to_string(), DEFAULT_BIND);
        assert_eq!(settings.page_url, DEFAULT_PAGE_URL);
        assert_eq!(settings.fallback_url, "/");
        assert_eq!(settings.region_slot, RegionSlot::Any);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/gameid-redirect.toml")).expect("load");
        assert_eq!(config, RedirectConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("gameid-redirect.toml");
        fs::write(
            &config_path,
            r#"
[store]
db_path = "/var/lib/wiki/redirects.db"
busy_timeout_ms = 250

[server]
bind = "0.0.0.0:9000"

[redirect]
page_url = "/wiki/$1"
fallback_url = "https://wiki.example.org/"
region_slot = "uppercase"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        let settings = config
            .resolve_with_lookup(temp.path(), no_env)
            .expect("resolve");
        assert_eq!(
            settings.store.db_path,
            PathBuf::from("/var/lib/wiki/redirects.db")
        );
        assert_eq!(settings.store.busy_timeout, Duration::from_millis(250));
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.page_url, "/wiki/$1");
        assert_eq!(settings.fallback_url, "https://wiki.example.org/");
        assert_eq!(settings.region_slot, RegionSlot::Uppercase);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("gameid-redirect.toml");
        fs::write(&config_path, "[store\ndb_path = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_unknown_region_slot() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("gameid-redirect.toml");
        fs::write(&config_path, "[redirect]\nregion_slot = \"digits\"\n").expect("write config");
        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn env_overrides_config_values() {
        let config = RedirectConfig {
            store: StoreSection {
                db_path: Some(PathBuf::from("config.db")),
                busy_timeout_ms: None,
            },
            server: ServerSection {
                bind: Some("127.0.0.1:1000".to_string()),
            },
            redirect: RedirectSection {
                page_url: Some("/config/$1".to_string()),
                fallback_url: Some("/config".to_string()),
                region_slot: None,
            },
        };
        let env = HashMap::from([
            ("GAMEID_REDIRECT_DB", "env.db"),
            ("GAMEID_REDIRECT_BIND", "127.0.0.1:2000"),
            ("GAMEID_REDIRECT_PAGE_URL", " /env/$1 "),
            ("GAMEID_REDIRECT_FALLBACK_URL", ""),
        ]);
        let settings = config
            .resolve_with_lookup(Path::new("/base"), |key| {
                env.get(key).map(|value| value.to_string())
            })
            .expect("resolve");
        assert_eq!(settings.store.db_path, PathBuf::from("/base/env.db"));
        assert_eq!(settings.bind.port(), 2000);
        assert_eq!(settings.page_url, "/env/$1");
        assert_eq!(settings.fallback_url, "/config");
    }

    #[test]
    fn page_url_without_placeholder_is_rejected() {
        let config = RedirectConfig {
            redirect: RedirectSection {
                page_url: Some("/index.php".to_string()),
                ..RedirectSection::default()
            },
            ..RedirectConfig::default()
        };
        let error = config
            .resolve_with_lookup(Path::new("/base"), no_env)
            .expect_err("must fail");
        assert!(error.to_string().contains("$1"));
    }

    #[test]
    fn invalid_bind_is_rejected() {
        let config = RedirectConfig {
            server: ServerSection {
                bind: Some("localhost".to_string()),
            },
            ..RedirectConfig::default()
        };
        let error = config
            .resolve_with_lookup(Path::new("/base"), no_env)
            .expect_err("must fail");
        assert!(error.to_string().contains("invalid bind address"));
    }

    #[test]
    fn diagnostics_lists_resolved_values() {
        let settings = RedirectConfig::default()
            .resolve_with_lookup(Path::new("/srv"), no_env)
            .expect("resolve");
        let diagnostics = settings.diagnostics();
        assert!(diagnostics.contains("db_path=/srv/gameid-redirect.db"));
        assert!(diagnostics.contains("region_slot=any"));
    }
}
