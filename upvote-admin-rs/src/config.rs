use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::statechip::ChipTables;

const CONFIG_PATH_ENV: &str = "UPVOTE_ADMIN_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    api_base_url: Option<String>,
    web_prefix: Option<String>,
    console_base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
    session_cookie: Option<String>,
    xsrf_token: Option<String>,
    default_platform: Option<String>,
    log_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct StateChipConfig {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    classes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RootConfig {
    #[serde(default, flatten)]
    top: FileConfig,
    upvote_admin: Option<FileConfig>,
    statechip: Option<StateChipConfig>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub web_prefix: String,
    /// Base used when printing console routes for the operator.
    pub console_base_url: String,
    pub request_timeout_seconds: u64,
    pub session_cookie: String,
    pub xsrf_token: String,
    pub default_platform: String,
    pub log_filter: String,
    pub chip_labels: BTreeMap<String, String>,
    pub chip_classes: BTreeMap<String, String>,
    pub config_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            web_prefix: "/api/web/".to_string(),
            console_base_url: String::new(),
            request_timeout_seconds: 30,
            session_cookie: String::new(),
            xsrf_token: String::new(),
            default_platform: "santa".to_string(),
            log_filter: "info".to_string(),
            chip_labels: BTreeMap::new(),
            chip_classes: BTreeMap::new(),
            config_path: PathBuf::from("upvote-admin.toml"),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let explicit = env_string(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(explicit.as_deref(), env_string)
    }

    /// Defaults, then the config file, then environment overrides.
    /// `lookup_env` stands in for `std::env::var`.
    pub fn load_from(
        explicit_path: Option<&Path>,
        lookup_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut cfg = Self::default();

        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => find_config_file().unwrap_or_else(|| config_search_paths()[0].clone()),
        };
        cfg.config_path = config_path.clone();

        let RootConfig {
            top,
            upvote_admin,
            statechip,
        } = load_root_config(&config_path)?;

        cfg.apply_file(top);
        if let Some(section) = upvote_admin {
            cfg.apply_file(section);
        }
        if let Some(chips) = statechip {
            cfg.chip_labels = chips.labels;
            cfg.chip_classes = chips.classes;
        }

        cfg.apply_env(lookup_env);

        if cfg.console_base_url.is_empty() {
            cfg.console_base_url = cfg.api_base_url.clone();
        }

        Ok(cfg)
    }

    fn apply_file(&mut self, file_cfg: FileConfig) {
        set_opt(&mut self.api_base_url, file_cfg.api_base_url);
        set_opt(&mut self.web_prefix, file_cfg.web_prefix);
        set_opt(&mut self.console_base_url, file_cfg.console_base_url);
        set_opt_u64_min(
            &mut self.request_timeout_seconds,
            file_cfg.request_timeout_seconds,
            1,
        );
        set_opt(&mut self.session_cookie, file_cfg.session_cookie);
        set_opt(&mut self.xsrf_token, file_cfg.xsrf_token);
        set_opt(&mut self.default_platform, file_cfg.default_platform);
        set_opt(&mut self.log_filter, file_cfg.log_filter);
    }

    fn apply_env(&mut self, lookup_env: impl Fn(&str) -> Option<String>) {
        let env_parse_u64 =
            |key: &str| lookup_env(key).and_then(|v| v.trim().parse::<u64>().ok());
        let env_cfg = FileConfig {
            api_base_url: lookup_env("UPVOTE_ADMIN_API_BASE_URL"),
            web_prefix: lookup_env("UPVOTE_ADMIN_WEB_PREFIX"),
            console_base_url: lookup_env("UPVOTE_ADMIN_CONSOLE_BASE_URL"),
            request_timeout_seconds: env_parse_u64("UPVOTE_ADMIN_REQUEST_TIMEOUT_SECONDS"),
            session_cookie: lookup_env("UPVOTE_ADMIN_SESSION_COOKIE"),
            xsrf_token: lookup_env("UPVOTE_ADMIN_XSRF_TOKEN"),
            default_platform: lookup_env("UPVOTE_ADMIN_DEFAULT_PLATFORM"),
            log_filter: lookup_env("UPVOTE_ADMIN_LOG_FILTER"),
        };
        self.apply_file(env_cfg);
    }

    pub fn chip_tables(&self) -> ChipTables {
        let (tables, unknown) =
            ChipTables::default().with_overrides(&self.chip_labels, &self.chip_classes);
        for key in unknown {
            warn!(
                "ignoring statechip override for unknown state {key} in {}",
                self.config_path.display()
            );
        }
        tables
    }

    /// Absolute console URL for a route path such as `/admin/hosts/H-1`.
    pub fn console_url(&self, route: &str) -> String {
        format!("{}{}", self.console_base_url.trim_end_matches('/'), route)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("upvote-admin.toml"),
        PathBuf::from("config.toml"),
    ];
    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("upvote-admin").join("config.toml"));
    }
    paths
}

pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|path| path.exists())
}

fn dirs_home() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

fn load_root_config(path: &Path) -> Result<RootConfig> {
    if !path.exists() {
        return Ok(RootConfig::default());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading {path:?}"))?;
    toml::from_str::<RootConfig>(&raw)
        .with_context(|| format!("failed parsing config {path:?}"))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn set_opt<T>(dst: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *dst = v;
    }
}

fn set_opt_u64_min(dst: &mut u64, value: Option<u64>, min: u64) {
    if let Some(v) = value {
        *dst = v.max(min);
    }
}
