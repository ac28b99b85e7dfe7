//! Application settings and configuration management

use crate::error::{AppError, Result};
use crate::gateway::resolver::RoutingConfig;
use crate::gateway::route::{Route, RouteTable};
use config::{Config, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A backend service fronted by the gateway
#[derive(Debug, Clone, Copy)]
pub struct ServiceDefinition {
    /// Key under `upstreams.` in the configuration
    pub name: &'static str,
    /// Route prefix served by the gateway
    pub prefix: &'static str,
    /// Flat environment variable overriding the upstream URL
    pub env_var: &'static str,
    pub default_url: &'static str,
}

/// The fixed set of proxied services, in match order
pub const SERVICES: [ServiceDefinition; 5] = [
    ServiceDefinition {
        name: "account",
        prefix: "/accounts",
        env_var: "ACCOUNT_SERVICE_URL",
        default_url: "http://localhost:8081",
    },
    ServiceDefinition {
        name: "transaction",
        prefix: "/transactions",
        env_var: "TRANSACTION_SERVICE_URL",
        default_url: "http://localhost:8082",
    },
    ServiceDefinition {
        name: "auth",
        prefix: "/auth",
        env_var: "AUTH_SERVICE_URL",
        default_url: "http://localhost:8083",
    },
    ServiceDefinition {
        name: "notification",
        prefix: "/notifications",
        env_var: "NOTIFICATION_SERVICE_URL",
        default_url: "http://localhost:8084",
    },
    ServiceDefinition {
        name: "fraud",
        prefix: "/fraud",
        env_var: "FRAUD_SERVICE_URL",
        default_url: "http://localhost:8085",
    },
];

pub const DEFAULT_CACHE_PROXY_URL: &str = "http://localhost:5020";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub upstreams: BTreeMap<String, UpstreamConfig>,
    pub cache_proxy: CacheProxyConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Upstream service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_timeout() -> u64 {
    30000
}

/// Shared cache tier configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheProxyConfig {
    #[serde(default = "default_cache_proxy_url")]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_cache_proxy_url() -> String {
    DEFAULT_CACHE_PROXY_URL.to_string()
}

/// Forwarding limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load settings using an explicit environment instead of the process one
    pub fn load_with_env<P: AsRef<Path>>(path: P, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("cache_proxy.url", default_cache_proxy_url())?
            .set_default("cache_proxy.enabled", false)?
            .set_default("proxy.max_body_bytes", default_max_body_bytes() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?;

        for service in &SERVICES {
            builder = builder
                .set_default(format!("upstreams.{}.url", service.name), service.default_url)?
                .set_default(format!("upstreams.{}.timeout_ms", service.name), default_timeout() as i64)?;
        }

        builder = builder
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with GATEWAY__)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            );

        // Flat variables used by the existing deployment manifests win over everything
        for service in &SERVICES {
            builder = builder.set_override_option(
                format!("upstreams.{}.url", service.name),
                env.get(service.env_var).cloned(),
            )?;
        }
        builder = builder
            .set_override_option("cache_proxy.url", env.get("CACHE_PROXY_URL").cloned())?
            .set_override_option("cache_proxy.enabled", env.get("ENABLE_CACHE_PROXY").cloned())?
            .set_override_option("server.port", env.get("PORT").cloned())?;

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0".to_string()));
        }

        for name in self.upstreams.keys() {
            if !SERVICES.iter().any(|s| s.name == name.as_str()) {
                return Err(config_error(format!("Unknown upstream service '{}'", name)));
            }
        }

        for service in &SERVICES {
            let upstream = self.upstream(service)?;
            if upstream.timeout_ms == 0 {
                return Err(config_error(format!(
                    "Upstream '{}' timeout_ms must be greater than 0",
                    service.name
                )));
            }
            parse_url(&upstream.url, service.name)?;
        }

        parse_url(&self.cache_proxy.url, "cache_proxy")?;

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(config_error(format!(
                "Invalid logging format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Build the immutable route table
    pub fn route_table(&self) -> Result<RouteTable> {
        let routes = SERVICES
            .iter()
            .map(|service| {
                let upstream = self.upstream(service)?;
                Ok(Route::new(
                    service.prefix,
                    parse_url(&upstream.url, service.name)?,
                    upstream.timeout_ms,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        RouteTable::new(routes)
    }

    /// Build the immutable cache-tier routing configuration
    pub fn routing_config(&self) -> Result<RoutingConfig> {
        Ok(RoutingConfig {
            cache_proxy_url: parse_url(&self.cache_proxy.url, "cache_proxy")?,
            cache_proxy_enabled: self.cache_proxy.enabled,
        })
    }

    fn upstream(&self, service: &ServiceDefinition) -> Result<&UpstreamConfig> {
        self.upstreams
            .get(service.name)
            .ok_or_else(|| config_error(format!("Missing upstream '{}'", service.name)))
    }
}

fn parse_url(raw: &str, name: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| config_error(format!("Invalid URL '{}' for '{}': {}", raw, name, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(config_error(format!(
            "URL '{}' for '{}' must use http or https",
            raw, name
        )));
    }
    Ok(url)
}

fn config_error(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            upstreams: SERVICES
                .iter()
                .map(|service| {
                    (
                        service.name.to_string(),
                        UpstreamConfig {
                            url: service.default_url.to_string(),
                            timeout_ms: default_timeout(),
                        },
                    )
                })
                .collect(),
            cache_proxy: CacheProxyConfig {
                url: default_cache_proxy_url(),
                enabled: false,
            },
            proxy: ProxyConfig {
                max_body_bytes: default_max_body_bytes(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
