use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const MIN_JIRA_TIMEOUT_SECONDS: u64 = 1;
const MIN_GENERATOR_TIMEOUT_SECONDS: u64 = 1;

/// One source of settings. Unset keys leave the value below untouched.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigLayer {
    bind_addr: Option<String>,
    jira_timeout_seconds: Option<u64>,
    frontend_dist: Option<String>,
    generator_cmd: Option<String>,
    generator_timeout_seconds: Option<u64>,
}

/// On-disk shape: top-level keys, optionally refined by a `[testgen]` table.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default, flatten)]
    base: ConfigLayer,
    testgen: Option<ConfigLayer>,
}

impl ConfigFile {
    fn layers(self) -> impl Iterator<Item = ConfigLayer> {
        std::iter::once(self.base).chain(self.testgen)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jira_timeout_seconds: u64,
    pub frontend_dist: String,
    /// Shell command fed the ticket on stdin. Empty selects the built-in outline generator.
    pub generator_cmd: String,
    pub generator_timeout_seconds: u64,
    pub config_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jira_timeout_seconds: 30,
            frontend_dist: "frontend/dist".to_string(),
            generator_cmd: String::new(),
            generator_timeout_seconds: 600,
            config_path: PathBuf::from("config.toml"),
        }
    }
}

impl AppConfig {
    /// Defaults, then the first config file found, then `TESTGEN_*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        let config_path = find_config_file().unwrap_or_else(|| PathBuf::from("config.toml"));
        let file = read_config_file(&config_path)?;

        let mut cfg = Self {
            config_path,
            ..Self::default()
        };
        for layer in file.layers() {
            cfg.overlay(layer);
        }
        cfg.overlay(env_layer());
        Ok(cfg)
    }

    fn overlay(&mut self, layer: ConfigLayer) {
        if let Some(bind_addr) = layer.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(seconds) = layer.jira_timeout_seconds {
            self.jira_timeout_seconds = seconds.max(MIN_JIRA_TIMEOUT_SECONDS);
        }
        if let Some(frontend_dist) = layer.frontend_dist {
            self.frontend_dist = frontend_dist;
        }
        if let Some(generator_cmd) = layer.generator_cmd {
            self.generator_cmd = generator_cmd.trim().to_string();
        }
        if let Some(seconds) = layer.generator_timeout_seconds {
            self.generator_timeout_seconds = seconds.max(MIN_GENERATOR_TIMEOUT_SECONDS);
        }
    }

    pub fn jira_timeout(&self) -> Duration {
        Duration::from_secs(self.jira_timeout_seconds)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_seconds)
    }

    pub fn frontend_dist(&self) -> PathBuf {
        PathBuf::from(&self.frontend_dist)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config.toml"), PathBuf::from("testgen.toml")];
    if let Some(home) = env::var_os("HOME").map(PathBuf::from) {
        paths.push(home.join(".config/testgen/config.toml"));
    }
    paths
}

pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|path| path.is_file())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading config {}", path.display()))?;
    parse_config_file(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn parse_config_file(raw: &str) -> Result<ConfigFile> {
    toml::from_str(raw).context("failed parsing config toml")
}

fn env_layer() -> ConfigLayer {
    ConfigLayer {
        bind_addr: env::var("TESTGEN_BIND_ADDR").ok(),
        jira_timeout_seconds: env_parsed("TESTGEN_JIRA_TIMEOUT_SECONDS"),
        frontend_dist: env::var("TESTGEN_FRONTEND_DIST").ok(),
        generator_cmd: env::var("TESTGEN_GENERATOR_CMD").ok(),
        generator_timeout_seconds: env_parsed("TESTGEN_GENERATOR_TIMEOUT_SECONDS"),
    }
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
