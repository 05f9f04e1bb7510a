use anyhow::{Context, Result, anyhow};
use std::{
    env,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

pub const DEFAULT_ROUTE: &str = "/api/run-code";
pub const NETLIFY_ROUTE: &str = "/.netlify/functions/run-code";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub route: String,
    pub development: bool,
    pub max_body_bytes: usize,
    pub workspace_root: PathBuf,
    pub limits: ExecutionLimits,
    pub rate_limit: RateLimitConfig,
    pub runtimes: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Upper bound on code and input length, in characters.
    pub max_code_size: usize,
    /// Upper bound on each of stdout and stderr, in bytes.
    pub max_output_size: usize,
    pub max_execution_time: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_code_size: 50 * 1024,
            max_output_size: 1024 * 1024,
            max_execution_time: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub backend: RateLimitBackendConfig,
    pub window_seconds: u64,
    pub max_requests: u64,
    pub fail_open_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitBackendConfig {
    InMemory,
    Redis { url: String, key_prefix: String },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub cargo_bin: String,
    pub node_bin: String,
    pub python_bin: String,
    pub rust_library: Option<RustLibrary>,
    pub env_passthrough: Vec<String>,
}

/// Library crate linked into every Rust snippet and glob-imported through its prelude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustLibrary {
    pub name: String,
    pub path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cargo_bin: "cargo".to_string(),
            node_bin: "node".to_string(),
            python_bin: "python3".to_string(),
            rust_library: Some(RustLibrary {
                name: "neo3".to_string(),
                path: PathBuf::from("/app/neo3"),
            }),
            env_passthrough: split_csv(DEFAULT_ENV_PASSTHROUGH),
        }
    }
}

const DEFAULT_ENV_PASSTHROUGH: &str = "PATH,LANG,CARGO_HOME,RUSTUP_HOME,RUSTUP_TOOLCHAIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("unsupported log format: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_addr = var("BIND_ADDR", "0.0.0.0:8080")
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let route = var("RUN_CODE_ROUTE", DEFAULT_ROUTE);
        if !route.starts_with('/') {
            return Err(anyhow!("RUN_CODE_ROUTE must start with '/': {route}"));
        }

        let development = var("APP_ENV", "production").eq_ignore_ascii_case("development");

        let defaults = ExecutionLimits::default();
        let limits = ExecutionLimits {
            max_code_size: parse_var(&lookup, "MAX_CODE_SIZE", defaults.max_code_size)?,
            max_output_size: parse_var(&lookup, "MAX_OUTPUT_SIZE", defaults.max_output_size)?,
            max_execution_time: Duration::from_millis(parse_var(
                &lookup,
                "MAX_EXECUTION_TIME_MS",
                defaults.max_execution_time.as_millis() as u64,
            )?),
        };
        if limits.max_code_size == 0 || limits.max_output_size == 0 {
            return Err(anyhow!("size limits must be greater than zero"));
        }
        if limits.max_execution_time.is_zero() {
            return Err(anyhow!("MAX_EXECUTION_TIME_MS must be greater than zero"));
        }

        let backend = match var("RATE_LIMIT_BACKEND", "memory")
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" | "in_memory" => RateLimitBackendConfig::InMemory,
            "redis" => RateLimitBackendConfig::Redis {
                url: var("REDIS_URL", "redis://127.0.0.1:6379"),
                key_prefix: var("REDIS_KEY_PREFIX", "run-code:ratelimit"),
            },
            other => return Err(anyhow!("unsupported RATE_LIMIT_BACKEND: {other}")),
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_var(&lookup, "RATE_LIMIT_ENABLED", true)?,
            backend,
            window_seconds: parse_var(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 60u64)?.max(1),
            max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS", 10u64)?.max(1),
            fail_open_on_error: parse_var(&lookup, "RATE_LIMIT_FAIL_OPEN", false)?,
        };

        let library_name = var("RUST_LIBRARY_NAME", "neo3");
        let library_path = var("RUST_LIBRARY_PATH", "/app/neo3");
        let rust_library = (!library_name.trim().is_empty() && !library_path.trim().is_empty())
            .then(|| RustLibrary {
                name: library_name.trim().to_string(),
                path: PathBuf::from(library_path.trim()),
            });

        let runtimes = RuntimeConfig {
            cargo_bin: var("CARGO_BIN", "cargo"),
            node_bin: var("NODE_BIN", "node"),
            python_bin: var("PYTHON_BIN", "python3"),
            rust_library,
            env_passthrough: split_csv(&var("SANDBOX_ENV_PASSTHROUGH", DEFAULT_ENV_PASSTHROUGH)),
        };

        let workspace_root = lookup("WORKSPACE_ROOT")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let logging = LoggingConfig {
            level: var("LOG_LEVEL", "info"),
            format: var("LOG_FORMAT", "compact")
                .parse()
                .map_err(|e: String| anyhow!(e))?,
        };

        Ok(Self {
            bind_addr,
            route,
            development,
            max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES", 1_048_576usize)?,
            workspace_root,
            limits,
            rate_limit,
            runtimes,
            logging,
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("invalid value for {key}: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.route, DEFAULT_ROUTE);
        assert!(!cfg.development);
        assert_eq!(cfg.limits.max_code_size, 51_200);
        assert_eq!(cfg.limits.max_output_size, 1_048_576);
        assert_eq!(cfg.limits.max_execution_time, Duration::from_secs(30));
        assert_eq!(cfg.rate_limit.window_seconds, 60);
        assert_eq!(cfg.rate_limit.max_requests, 10);
        assert_eq!(cfg.rate_limit.backend, RateLimitBackendConfig::InMemory);
        assert_eq!(cfg.runtimes.python_bin, "python3");
        assert!(cfg.runtimes.env_passthrough.contains(&"PATH".to_string()));
        assert_eq!(
            cfg.runtimes.rust_library.as_ref().map(|l| l.name.as_str()),
            Some("neo3")
        );
    }

    #[test]
    fn reads_overrides() {
        let cfg = config_from(&[
            ("APP_ENV", "Development"),
            ("RATE_LIMIT_BACKEND", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("MAX_EXECUTION_TIME_MS", "1500"),
            ("RUST_LIBRARY_PATH", ""),
            ("SANDBOX_ENV_PASSTHROUGH", "PATH, LANG ,"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert!(cfg.development);
        assert_eq!(cfg.limits.max_execution_time, Duration::from_millis(1500));
        assert_eq!(
            cfg.rate_limit.backend,
            RateLimitBackendConfig::Redis {
                url: "redis://cache:6379".to_string(),
                key_prefix: "run-code:ratelimit".to_string(),
            }
        );
        assert!(cfg.runtimes.rust_library.is_none());
        assert_eq!(cfg.runtimes.env_passthrough, vec!["PATH", "LANG"]);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config_from(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config_from(&[("RATE_LIMIT_BACKEND", "memcached")]).is_err());
        assert!(config_from(&[("MAX_OUTPUT_SIZE", "lots")]).is_err());
        assert!(config_from(&[("MAX_EXECUTION_TIME_MS", "0")]).is_err());
        assert!(config_from(&[("RUN_CODE_ROUTE", "run")]).is_err());
    }
}
