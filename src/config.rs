//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::dns::matcher::BlockRule;
use crate::engine::LoopSettings;
use crate::error::{ConfigError, Result};
use crate::network::tun::TunConfig;
use crate::session::SessionSettings;

/// Main configuration for the focusdns engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Upstream DNS resolver address (e.g., "8.8.8.8:53").
    #[serde(
        default = "default_upstream_resolver",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub upstream_resolver: SocketAddr,

    /// Bound on one upstream round trip, in seconds.
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,

    /// Pause between interface reads when no data is available.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after a transient interface read error.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Cadence of the session end-time check.
    #[serde(default = "default_expiry_poll")]
    pub expiry_poll_ms: u64,

    /// Length of a focus session started by the standalone binary.
    #[serde(default = "default_session_duration")]
    pub session_duration_secs: u64,

    /// Blocked domain patterns.
    /// Exact matches ("instagram.com", which also covers the www alias)
    /// and wildcards ("*.youtube.com", which also covers the base).
    #[serde(default)]
    pub blocklist: Vec<String>,

    /// Tunnel addressing.
    #[serde(default)]
    pub tun: TunSettings,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Tunnel addressing plus the host-side descriptor handoff.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunSettings {
    /// Private address assigned to the tunnel (/32).
    #[serde(default = "default_tun_address")]
    pub address: Ipv4Addr,

    /// Gateway advertised as the DNS server; the only routed address.
    #[serde(default = "default_tun_gateway")]
    pub gateway: Ipv4Addr,

    /// Raw tun file descriptor inherited from the host platform.
    /// Required by the standalone binary; embedders pass their own
    /// interface handle instead.
    pub fd: Option<i32>,
}

impl Default for TunSettings {
    fn default() -> Self {
        Self {
            address: default_tun_address(),
            gateway: default_tun_gateway(),
            fd: None,
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address for the scrape endpoint.
    #[serde(
        default = "default_metrics_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_upstream_resolver() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

const fn default_forward_timeout() -> u64 {
    5
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_error_backoff() -> u64 {
    100
}

const fn default_expiry_poll() -> u64 {
    1000
}

/// Classic 25-minute focus block.
const fn default_session_duration() -> u64 {
    1500
}

const fn default_tun_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 2)
}

const fn default_tun_gateway() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 1)
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.forward_timeout_secs == 0 {
            return Err(ConfigError::Validation("forward_timeout_secs must be > 0".into()).into());
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation("poll_interval_ms must be > 0".into()).into());
        }
        if self.error_backoff_ms == 0 {
            return Err(ConfigError::Validation("error_backoff_ms must be > 0".into()).into());
        }
        if self.expiry_poll_ms == 0 {
            return Err(ConfigError::Validation("expiry_poll_ms must be > 0".into()).into());
        }
        if self.session_duration_secs == 0 {
            return Err(
                ConfigError::Validation("session_duration_secs must be > 0".into()).into(),
            );
        }
        if self.tun.address == self.tun.gateway {
            return Err(
                ConfigError::Validation("tun.address and tun.gateway must differ".into()).into(),
            );
        }

        for pattern in &self.blocklist {
            if BlockRule::parse(pattern).is_none() {
                return Err(ConfigError::Validation(format!(
                    "invalid blocklist pattern: {pattern:?}"
                ))
                .into());
            }
        }

        Ok(())
    }

    /// The blocklist compiled into rules.
    ///
    /// Validation guarantees every pattern parses.
    pub fn rules(&self) -> Vec<BlockRule> {
        self.blocklist
            .iter()
            .filter_map(|pattern| BlockRule::parse(pattern))
            .collect()
    }

    /// Tunnel addressing for the provider.
    pub fn tun_config(&self) -> TunConfig {
        TunConfig {
            address: self.tun.address,
            gateway: self.tun.gateway,
        }
    }

    /// Session tunables derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            upstream: self.upstream_resolver,
            forward_timeout: Duration::from_secs(self.forward_timeout_secs),
            expiry_poll_interval: Duration::from_millis(self.expiry_poll_ms),
            loop_settings: LoopSettings {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                error_backoff: Duration::from_millis(self.error_backoff_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_full_config() {
        let toml = r#"
            upstream_resolver = "1.1.1.1:53"
            forward_timeout_secs = 3
            blocklist = ["instagram.com", "*.youtube.com"]

            [tun]
            address = "10.8.0.2"
            gateway = "10.8.0.1"
            fd = 7
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.upstream_resolver.to_string(), "1.1.1.1:53");
        assert_eq!(config.forward_timeout_secs, 3);
        assert_eq!(config.blocklist.len(), 2);
        assert_eq!(config.tun.fd, Some(7));
        assert_eq!(config.tun_config().gateway, Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn should_fill_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.upstream_resolver.to_string(), "8.8.8.8:53");
        assert_eq!(config.forward_timeout_secs, 5);
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.expiry_poll_ms, 1000);
        assert_eq!(config.session_duration_secs, 1500);
        assert!(config.blocklist.is_empty());
        assert!(config.tun.fd.is_none());
        assert_eq!(config.tun.address, Ipv4Addr::new(10, 0, 0, 2));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn should_compile_rules_with_wildcards() {
        let toml = r#"
            blocklist = ["Instagram.com", "*.youtube.com"]
        "#;

        let config = Config::parse(toml).unwrap();
        let rules = config.rules();
        assert_eq!(rules.len(), 2);
        assert!(!rules[0].is_wildcard());
        assert_eq!(rules[0].pattern(), "instagram.com");
        assert!(rules[1].is_wildcard());
        assert_eq!(rules[1].pattern(), "youtube.com");
    }

    #[test]
    fn should_build_session_settings() {
        let config = Config::parse("poll_interval_ms = 25").unwrap();
        let settings = config.session_settings();

        assert_eq!(settings.forward_timeout, Duration::from_secs(5));
        assert_eq!(
            settings.loop_settings.poll_interval,
            Duration::from_millis(25)
        );
    }

    #[test]
    fn should_reject_invalid_resolver_address() {
        assert!(Config::parse(r#"upstream_resolver = "not-an-address""#).is_err());
    }

    #[test]
    fn should_reject_zero_timeout() {
        assert!(Config::parse("forward_timeout_secs = 0").is_err());
    }

    #[test]
    fn should_reject_empty_blocklist_pattern() {
        assert!(Config::parse(r#"blocklist = ["instagram.com", ""]"#).is_err());
        assert!(Config::parse(r#"blocklist = ["*."]"#).is_err());
    }

    #[test]
    fn should_reject_gateway_equal_to_address() {
        let toml = r#"
            [tun]
            address = "10.0.0.1"
            gateway = "10.0.0.1"
        "#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn should_reject_unknown_fields() {
        assert!(Config::parse(r#"unknown_field = "value""#).is_err());
    }

    #[test]
    fn should_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"blocklist = ["*.youtube.com"]"#).unwrap();
        writeln!(file, "session_duration_secs = 600").unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.session_duration_secs, 600);
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn should_fail_on_missing_file() {
        assert!(Config::load("/nonexistent/focusdns.toml").is_err());
    }
}
