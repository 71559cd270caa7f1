// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Supervisor configuration, decided before the supervisor is constructed

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drain::Severity;
use crate::Error;

/// Executables launched for each node role
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Programs {
    pub servicenode: String,
    pub rangeget: String,
    pub datanode: String,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            servicenode: "hsds-servicenode".to_string(),
            rangeget: "hsds-rangeget".to_string(),
            datanode: "hsds-datanode".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Number of data nodes, the topology always adds one service node and one range-get node
    pub dn_count: usize,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Minimum severity of child output that is kept
    pub log_level: Severity,
    pub programs: Programs,
    /// Parent of the per-instance socket directory, defaults to the OS temp dir
    pub socket_root: Option<PathBuf>,
    /// Remove the socket directory when the supervisor is closed
    pub cleanup_on_stop: bool,
    /// Environment overrides applied to every child, never to this process
    pub env: BTreeMap<String, String>,
    pub frontend_log_file: String,
    pub ready_timeout_ms: u64,
    pub ready_poll_ms: u64,
    pub stop_attempts: u32,
    pub stop_poll_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());

        Self {
            dn_count: 1,
            username: None,
            password: None,
            log_level: Severity::Debug,
            programs: Programs::default(),
            socket_root: None,
            cleanup_on_stop: true,
            env,
            frontend_log_file: "sn1.log".to_string(),
            ready_timeout_ms: 10_000,
            ready_poll_ms: 100,
            stop_attempts: 20,
            stop_poll_ms: 100,
        }
    }
}

impl SupervisorConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file {}: {}", path.display(), e))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.dn_count == 0 {
            return Err("dn_count must be at least 1".into());
        }
        if self.ready_poll_ms == 0 || self.stop_poll_ms == 0 {
            return Err("poll intervals must be non-zero".into());
        }
        Ok(())
    }

    /// Total number of processes in the topology
    pub fn process_count(&self) -> usize {
        self.dn_count + 2
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn stop_poll(&self) -> Duration {
        Duration::from_millis(self.stop_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.process_count(), 3);
        assert_eq!(config.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.stop_attempts as u64 * config.stop_poll_ms, 2_000);
        assert!(config.cleanup_on_stop);
        assert_eq!(config.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_from_toml() {
        let config = SupervisorConfig::from_toml_str(
            r#"
            dn_count = 4
            username = "admin"
            log_level = "WARN"
            cleanup_on_stop = false

            [programs]
            datanode = "/opt/hsds/bin/datanode"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.dn_count, 4);
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.password, None);
        assert_eq!(config.log_level, Severity::Warn);
        assert!(!config.cleanup_on_stop);
        assert_eq!(config.programs.datanode, "/opt/hsds/bin/datanode");
        assert_eq!(config.programs.servicenode, "hsds-servicenode");
    }

    #[test]
    fn test_zero_datanodes_rejected() {
        assert!(SupervisorConfig::from_toml_str("dn_count = 0").is_err());
    }
}
