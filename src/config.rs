use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::{info, warn};

use crate::optimizer::{PackingConfig, PackingMode};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&env_string)
    }

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_source(source),
            optimizer: OptimizerConfig::from_source(source),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const HOST_VAR: &'static str = "PALLET_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "PALLET_PLANNER_API_PORT";
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let host_value = source(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match source(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "{} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Tolerances and flow selection for the planner.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
    packing: PackingConfig,
}

impl OptimizerConfig {
    const SUPPORT_EPSILON_VAR: &'static str = "PALLET_PLANNER_SUPPORT_EPSILON";
    const GENERAL_EPSILON_VAR: &'static str = "PALLET_PLANNER_GENERAL_EPSILON";
    const STACK_SUPPORT_RATIO_VAR: &'static str = "PALLET_PLANNER_STACK_SUPPORT_RATIO";
    const PACKING_MODE_VAR: &'static str = "PALLET_PLANNER_PACKING_MODE";
    const CAP_LAYERS_VAR: &'static str = "PALLET_PLANNER_CAP_LAYERS_BY_WEIGHT";

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let support_epsilon = load_f64_with_warning(
            source,
            Self::SUPPORT_EPSILON_VAR,
            PackingConfig::DEFAULT_SUPPORT_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted support tolerance changes which stacks count as resting",
        );

        let general_epsilon = load_f64_with_warning(
            source,
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted tolerances may cause numerical instabilities",
        );

        let stack_support_ratio = load_f64_with_warning(
            source,
            Self::STACK_SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_STACK_SUPPORT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted stack support ratio may allow unstable manual stacks",
        );

        let mode = source(Self::PACKING_MODE_VAR)
            .and_then(|raw| {
                let parsed = PackingMode::parse(&raw);
                if parsed.is_none() {
                    warn!(
                        "Could not interpret {} ('{}'). Using {}.",
                        Self::PACKING_MODE_VAR,
                        raw,
                        PackingMode::default().as_str()
                    );
                }
                parsed
            })
            .unwrap_or_default();

        let cap_layers_by_weight = source(Self::CAP_LAYERS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::CAP_LAYERS_VAR))
            .unwrap_or(PackingConfig::DEFAULT_CAP_LAYERS_BY_WEIGHT);

        let packing = PackingConfig::builder()
            .support_epsilon(support_epsilon)
            .general_epsilon(general_epsilon)
            .stack_support_ratio(stack_support_ratio)
            .mode(mode)
            .cap_layers_by_weight(cap_layers_by_weight)
            .build();

        Self { packing }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    source: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match source(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    warn!(
                        "{} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        info!("{} ({} = {}).", notice, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("ON", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_source(&source(&[]));
        assert_eq!(config.api.port(), 8080);
        assert!(config.api.binds_to_all_interfaces());
        assert_eq!(config.optimizer.packing_config(), PackingConfig::default());
    }

    #[test]
    fn values_are_read_and_validated() {
        let config = AppConfig::from_source(&source(&[
            ("PALLET_PLANNER_API_HOST", "127.0.0.1"),
            ("PALLET_PLANNER_API_PORT", "0"),
            ("PALLET_PLANNER_SUPPORT_EPSILON", "2.5"),
            ("PALLET_PLANNER_STACK_SUPPORT_RATIO", "1.5"),
            ("PALLET_PLANNER_PACKING_MODE", "units"),
            ("PALLET_PLANNER_CAP_LAYERS_BY_WEIGHT", "off"),
        ]));
        assert_eq!(config.api.display_host(), "127.0.0.1");
        assert!(!config.api.binds_to_all_interfaces());
        assert_eq!(config.api.port(), 8080);

        let packing = config.optimizer.packing_config();
        assert_eq!(packing.support_epsilon, 2.5);
        assert_eq!(
            packing.stack_support_ratio,
            PackingConfig::DEFAULT_STACK_SUPPORT_RATIO
        );
        assert_eq!(packing.mode, PackingMode::Units);
        assert!(!packing.cap_layers_by_weight);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = AppConfig::from_source(&source(&[
            ("PALLET_PLANNER_API_HOST", "not-an-ip"),
            ("PALLET_PLANNER_GENERAL_EPSILON", "tiny"),
            ("PALLET_PLANNER_PACKING_MODE", "spiral"),
        ]));
        assert_eq!(config.api.display_host(), "0.0.0.0");
        let packing = config.optimizer.packing_config();
        assert_eq!(packing.general_epsilon, PackingConfig::DEFAULT_GENERAL_EPSILON);
        assert_eq!(packing.mode, PackingMode::Columns);
    }
}
