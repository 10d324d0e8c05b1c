use anyhow::{Context, Result, ensure};
use std::{env, str::FromStr, time::Duration};

/// Which of the two services a configuration is loaded for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Registry,
    ImageIngest,
}

impl Service {
    fn env_prefix(self) -> &'static str {
        match self {
            Service::Registry => "REGISTRY",
            Service::ImageIngest => "INGEST",
        }
    }

    fn default_database(self) -> &'static str {
        match self {
            Service::Registry => "myDatabase",
            Service::ImageIngest => "esp32_camera",
        }
    }

    fn default_collection(self) -> &'static str {
        match self {
            Service::Registry => "datas",
            Service::ImageIngest => "images",
        }
    }
}

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Document store configuration
    pub mongo: MongoConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub server_selection_timeout: Duration,
    pub connect_timeout: Duration,
}

impl AppConfig {
    /// Load the configuration of `service` from environment variables
    pub fn load(service: Service) -> Result<Self> {
        Self::load_with(service, |key| env::var(key).ok())
    }

    /// Load the configuration of `service` from an arbitrary variable lookup
    ///
    /// Unset variables fall back to their defaults; set but malformed
    /// variables are reported as errors.
    pub fn load_with<F>(service: Service, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        Ok(Self {
            server: ServerConfig::load(service, &vars)?,
            mongo: MongoConfig::load(service, &vars)?,
        })
    }
}

impl ServerConfig {
    fn load(service: Service, vars: &Vars<'_>) -> Result<Self> {
        let bind_address = vars.string("BIND_ADDRESS", "0.0.0.0");
        let port = vars.parse(&format!("{}_PORT", service.env_prefix()), 3000)?;
        let body_limit_bytes = vars.parse("BODY_LIMIT_BYTES", usize::MAX)?;

        Ok(Self {
            bind_address,
            port,
            body_limit_bytes,
        })
    }
}

impl MongoConfig {
    fn load(service: Service, vars: &Vars<'_>) -> Result<Self> {
        let prefix = service.env_prefix();

        let uri = vars.string("MONGO_URI", "mongodb://127.0.0.1:27017");
        let database = vars.string(&format!("{prefix}_DB"), service.default_database());
        let collection = vars.string(
            &format!("{prefix}_COLLECTION"),
            service.default_collection(),
        );

        let connect_retries = vars.parse("MONGO_CONNECT_RETRIES", 5)?;
        ensure!(
            connect_retries > 0,
            "failed to parse MONGO_CONNECT_RETRIES: must be at least 1"
        );

        let retry_delay = Duration::from_millis(vars.parse("MONGO_RETRY_DELAY_MS", 2000)?);
        let server_selection_timeout =
            Duration::from_millis(vars.parse("MONGO_SERVER_SELECTION_TIMEOUT_MS", 5000)?);
        let connect_timeout =
            Duration::from_millis(vars.parse("MONGO_CONNECT_TIMEOUT_MS", 10000)?);

        Ok(Self {
            uri,
            database,
            collection,
            connect_retries,
            retry_delay,
            server_selection_timeout,
            connect_timeout,
        })
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match (self.lookup)(key) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .with_context(|| format!("failed to parse {key}: invalid format")),
            None => Ok(default),
        }
    }
}
