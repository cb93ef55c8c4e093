// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/infrastructure/config.rs

use serde::Deserialize;

use config::{Config, ConfigError, Environment, File};

use crate::domain::{EnforcementConfig, TenantLimits};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub enforcement: EnforcementSettings,
    /// Limits and gates applied to tenants the overrides document does not
    /// mention. Absent from most deployments, hence fully defaulted.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub denial_log: DenialLogConfig,
    pub overrides: OverridesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Listener for the ext-authz check service.
    pub ext_authz_addr: String,
    /// Listener for the descriptor ratelimit service. When equal to
    /// `ext_authz_addr` both services share one listener.
    pub rate_limit_addr: String,
    pub admin_addr: String,
    pub health_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnforcementSettings {
    /// Header carrying the tenant identifier.
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Only requests under this path prefix are inspected; everything else
    /// passes through.
    #[serde(default = "default_write_path_prefix")]
    pub write_path_prefix: String,

    /// Allow requests whose payload cannot be parsed.
    #[serde(default = "default_true")]
    pub failure_mode_allow: bool,

    /// Allow requests that carry no tenant header at all.
    #[serde(default)]
    pub allow_unknown_tenant: bool,

    /// Upper bound on per-check wall-clock time, milliseconds.
    #[serde(default = "default_check_deadline_ms")]
    pub check_deadline_ms: u64,

    /// Conservative decision when a check times out: "allow" or "deny".
    #[serde(default = "default_on_timeout")]
    pub on_timeout: String,

    /// In-flight check ceiling before load shedding kicks in.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: i64,

    /// Cap on decompressed payload size, bytes.
    #[serde(default = "default_max_decompressed_bytes")]
    pub max_decompressed_bytes: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Limits applied to tenants absent from the overrides document.
    #[serde(default)]
    pub limits: TenantLimits,
    /// Enforcement gates applied to unknown tenants.
    #[serde(default)]
    pub enforcement: EnforcementConfig,
}

#[derive(Debug, Deserialize)]
pub struct DenialLogConfig {
    #[serde(default = "default_denial_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverridesConfig {
    /// Path to the mounted overrides document.
    pub path: String,
    #[serde(default = "default_poll_fallback_seconds")]
    pub poll_fallback_seconds: u64,
    #[serde(default = "default_watch_backoff_base_ms")]
    pub watch_backoff_base_ms: u64,
    #[serde(default = "default_watch_backoff_cap_ms")]
    pub watch_backoff_cap_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.ext_authz_addr", "0.0.0.0:5403")?
            .set_default("server.rate_limit_addr", "0.0.0.0:5403")?
            .set_default("server.admin_addr", "0.0.0.0:5405")?
            .set_default("server.health_addr", "0.0.0.0:5406")?
            .set_default("enforcement.tenant_header", "X-Scope-OrgID")?
            .set_default("enforcement.write_path_prefix", "/api/v1/push")?
            .set_default("enforcement.failure_mode_allow", true)?
            .set_default("enforcement.allow_unknown_tenant", false)?
            .set_default("enforcement.check_deadline_ms", 250)?
            .set_default("enforcement.on_timeout", "allow")?
            .set_default("enforcement.max_inflight", 4096)?
            .set_default("enforcement.max_decompressed_bytes", 64 * 1024 * 1024)?
            .set_default("denial_log.capacity", 1000)?
            .set_default("overrides.path", "/etc/tollgate/overrides.yaml")?
            .set_default("overrides.poll_fallback_seconds", 30)?
            .set_default("overrides.watch_backoff_base_ms", 1000)?
            .set_default("overrides.watch_backoff_cap_ms", 30000)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)?;

        // Add configuration file if it exists
        builder = builder.add_source(File::with_name("config/default").required(false));

        // Add environment-specific config
        let env = std::env::var("RUST_ENV").unwrap_or_else(|_| "development".into());
        builder = builder.add_source(File::with_name(&format!("config/{}", env)).required(false));

        // Override with environment variables
        builder = builder.add_source(Environment::with_prefix("TOLLGATE").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enforcement.on_timeout != "allow" && self.enforcement.on_timeout != "deny" {
            return Err(ConfigError::Message(format!(
                "enforcement.on_timeout must be \"allow\" or \"deny\", got {:?}",
                self.enforcement.on_timeout
            )));
        }
        self.defaults
            .limits
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(())
    }
}

fn default_tenant_header() -> String {
    "X-Scope-OrgID".to_string()
}

fn default_write_path_prefix() -> String {
    "/api/v1/push".to_string()
}

fn default_true() -> bool {
    true
}

fn default_check_deadline_ms() -> u64 {
    250
}

fn default_on_timeout() -> String {
    "allow".to_string()
}

fn default_max_inflight() -> i64 {
    4096
}

fn default_max_decompressed_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_denial_capacity() -> usize {
    1000
}

fn default_poll_fallback_seconds() -> u64 {
    30
}

fn default_watch_backoff_base_ms() -> u64 {
    1000
}

fn default_watch_backoff_cap_ms() -> u64 {
    30000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let settings = Settings::new().expect("default settings should load");
        assert_eq!(settings.enforcement.tenant_header, "X-Scope-OrgID");
        assert_eq!(settings.enforcement.write_path_prefix, "/api/v1/push");
        assert_eq!(settings.enforcement.check_deadline_ms, 250);
        assert_eq!(settings.denial_log.capacity, 1000);
        assert_eq!(settings.overrides.poll_fallback_seconds, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_on_timeout_validation() {
        let mut settings = Settings::new().unwrap();
        settings.enforcement.on_timeout = "explode".to_string();
        assert!(settings.validate().is_err());
    }
}
