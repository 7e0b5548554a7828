use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOKEN_URL: &str = "https://api.danfoss.com/oauth2/token";
pub const DEFAULT_DEVICES_URL: &str = "https://api.danfoss.com/ally/devices";
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Regional ingest endpoint, used for endpoint discovery
pub fn default_store_url(region: &str) -> String {
    format!("https://ingest.timestream.{}.amazonaws.com", region)
}

/// Connection limits for the pooled HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(20),
            tcp_keepalive: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 100,
            max_retries: 3,
        }
    }
}

/// Process-wide settings, read once at startup and passed down explicitly.
///
/// A long-running process keeps the values it started with. Changing the
/// environment takes a restart.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub token_url: String,
    pub devices_url: String,
    pub store_url: String,
    /// Ask `store_url` for the cell endpoint before writing
    pub endpoint_discovery: bool,
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub transport: TransportConfig,
    pub run_interval: Duration,
    pub run_once: bool,
    pub http_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = TransportConfig::default();

        let transport = TransportConfig {
            connect_timeout: Duration::from_secs(parse_or(
                get("HTTP_CONNECT_TIMEOUT_SECS"),
                defaults.connect_timeout.as_secs(),
            )),
            request_timeout: Duration::from_secs(parse_or(
                get("HTTP_REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout.as_secs(),
            )),
            tcp_keepalive: defaults.tcp_keepalive,
            pool_idle_timeout: Duration::from_secs(parse_or(
                get("HTTP_POOL_IDLE_TIMEOUT_SECS"),
                defaults.pool_idle_timeout.as_secs(),
            )),
            pool_max_idle_per_host: parse_or(
                get("HTTP_POOL_MAX_IDLE"),
                defaults.pool_max_idle_per_host,
            ),
            max_retries: parse_or(get("WRITE_MAX_RETRIES"), defaults.max_retries),
        };

        let aws_region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        // An explicit endpoint is written to directly unless discovery is asked for.
        let explicit_store_url = get("TIMESTREAM_ENDPOINT");
        let endpoint_discovery = parse_or(
            get("TIMESTREAM_ENDPOINT_DISCOVERY"),
            explicit_store_url.is_none(),
        );

        Self {
            api_key: get("DANFOSS_API_KEY"),
            api_secret: get("DANFOSS_API_SECRET"),
            database: get("TIMESTREAM_DATABASE"),
            table: get("TIMESTREAM_TABLE"),
            token_url: get("ALLY_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            devices_url: get("ALLY_DEVICES_URL")
                .unwrap_or_else(|| DEFAULT_DEVICES_URL.to_string()),
            store_url: explicit_store_url.unwrap_or_else(|| default_store_url(&aws_region)),
            endpoint_discovery,
            aws_region,
            aws_access_key_id: get("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: get("AWS_SESSION_TOKEN"),
            transport,
            run_interval: Duration::from_secs(parse_or::<u64>(get("RUN_INTERVAL_SECS"), 300).max(1)),
            run_once: parse_or(get("RUN_ONCE"), false),
            http_addr: get("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "***"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("database", &self.database)
            .field("table", &self.table)
            .field("token_url", &self.token_url)
            .field("devices_url", &self.devices_url)
            .field("store_url", &self.store_url)
            .field("endpoint_discovery", &self.endpoint_discovery)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &redact(&self.aws_secret_access_key))
            .field("aws_session_token", &redact(&self.aws_session_token))
            .field("transport", &self.transport)
            .field("run_interval", &self.run_interval)
            .field("run_once", &self.run_once)
            .field("http_addr", &self.http_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert!(config.api_key.is_none());
        assert!(config.database.is_none());
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.devices_url, DEFAULT_DEVICES_URL);
        assert_eq!(
            config.store_url,
            "https://ingest.timestream.eu-central-1.amazonaws.com"
        );
        assert!(config.endpoint_discovery);
        assert_eq!(config.aws_region, DEFAULT_REGION);
        assert!(config.aws_access_key_id.is_none());
        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.transport.pool_max_idle_per_host, 100);
        assert_eq!(config.run_interval, Duration::from_secs(300));
        assert!(!config.run_once);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = config_from(&[("DANFOSS_API_KEY", ""), ("TIMESTREAM_TABLE", "  ")]);

        assert!(config.api_key.is_none());
        assert!(config.table.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TIMESTREAM_DATABASE", "home"),
            ("TIMESTREAM_TABLE", "thermostats"),
            ("WRITE_MAX_RETRIES", "5"),
            ("HTTP_CONNECT_TIMEOUT_SECS", "3"),
            ("RUN_INTERVAL_SECS", "60"),
            ("RUN_ONCE", "true"),
        ]);

        assert_eq!(config.database.as_deref(), Some("home"));
        assert_eq!(config.table.as_deref(), Some("thermostats"));
        assert_eq!(config.transport.max_retries, 5);
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.run_interval, Duration::from_secs(60));
        assert!(config.run_once);
    }

    #[test]
    fn test_region_selects_default_endpoint() {
        let config = config_from(&[("AWS_REGION", "us-east-1")]);

        assert_eq!(config.aws_region, "us-east-1");
        assert_eq!(config.store_url, "https://ingest.timestream.us-east-1.amazonaws.com");
        assert!(config.endpoint_discovery);
    }

    #[test]
    fn test_explicit_endpoint_skips_discovery() {
        let config = config_from(&[("TIMESTREAM_ENDPOINT", "http://127.0.0.1:9090/")]);
        assert_eq!(config.store_url, "http://127.0.0.1:9090/");
        assert!(!config.endpoint_discovery);

        let config = config_from(&[
            ("TIMESTREAM_ENDPOINT", "https://ingest.timestream.eu-west-1.amazonaws.com"),
            ("TIMESTREAM_ENDPOINT_DISCOVERY", "true"),
        ]);
        assert!(config.endpoint_discovery);
    }

    #[test]
    fn test_values_are_fixed_after_load() {
        let vars = std::sync::Mutex::new(HashMap::from([(
            "TIMESTREAM_TABLE".to_string(),
            "thermostats".to_string(),
        )]));
        let config = Config::from_lookup(|key| vars.lock().unwrap().get(key).cloned());

        vars.lock()
            .unwrap()
            .insert("TIMESTREAM_TABLE".to_string(), "other".to_string());

        assert_eq!(config.table.as_deref(), Some("thermostats"));
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = config_from(&[("WRITE_MAX_RETRIES", "many"), ("RUN_INTERVAL_SECS", "0")]);

        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.run_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = config_from(&[
            ("DANFOSS_API_KEY", "key-123"),
            ("DANFOSS_API_SECRET", "secret-456"),
            ("AWS_SECRET_ACCESS_KEY", "aws-secret-789"),
            ("AWS_SESSION_TOKEN", "session-000"),
        ]);
        let printed = format!("{:?}", config);

        assert!(!printed.contains("key-123"));
        assert!(!printed.contains("secret-456"));
        assert!(!printed.contains("aws-secret-789"));
        assert!(!printed.contains("session-000"));
    }
}
