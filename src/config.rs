use num_cpus;
use serde_derive::Deserialize;

use log::warn;
use std::fs::File;
use std::io::prelude::*;
use std::time::Duration;

use crate::exception::Exception;
use crate::param::MAX_HEAD_SIZE;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    pool_size: usize,
    max_requests: u64,
    filter: String,
    #[serde(default)]
    local: bool,
    #[serde(default = "default_cache_root")]
    cache_root: String,
    #[serde(default = "default_max_head_size")]
    max_head_size: usize,
    #[serde(default)]
    io_timeout_secs: Option<u64>,
    #[serde(default)]
    write_lock: bool,
}

fn default_cache_root() -> String {
    ".".to_string()
}

fn default_max_head_size() -> usize {
    MAX_HEAD_SIZE
}

impl Config {
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::ConfigError(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::ConfigError(format!("error reading {}: {}", filename, e)))?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let mut raw_config: Config =
            toml::from_str(content).map_err(|e| Exception::ConfigError(e.to_string()))?;
        if raw_config.pool_size == 0 {
            raw_config.pool_size = num_cpus::get();
        }
        if raw_config.max_head_size == 0 {
            warn!("max_head_size被设置为0，无法读取任何请求，该值将被改为{}。", MAX_HEAD_SIZE);
            raw_config.max_head_size = MAX_HEAD_SIZE;
        }
        Ok(raw_config)
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn cache_root(&self) -> &str {
        &self.cache_root
    }

    pub fn max_head_size(&self) -> usize {
        self.max_head_size
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }

    pub fn write_lock(&self) -> bool {
        self.write_lock
    }
}
