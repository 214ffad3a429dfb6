use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use snafu::ResultExt;
use url::Url;

use crate::database::{DatabaseConfig, DatabaseCredentials};
use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::youtube::YouTubeConfig;

/// Reads [Config] from the process environment. Variable names are the upper-cased field names.
pub fn load() -> Result<Config, ApplicationError> {
    envy::from_env::<Config>().context(ConfigLoadSnafu)
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed by CORS. Any origin is allowed when this is unset.
    #[serde(default)]
    pub frontend_url: Option<String>,

    #[serde(default = "default_database_url")]
    pub database_url: Url,
    #[serde(default = "default_namespace")]
    pub database_namespace: String,
    #[serde(default = "default_namespace")]
    pub database_name: String,
    #[serde(default)]
    pub database_username: Option<String>,
    #[serde(default)]
    pub database_password: Option<String>,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout: humantime::Duration,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    #[serde(default)]
    pub youtube_api_key: String,
    #[serde(default = "default_youtube_api_url")]
    pub youtube_api_url: Url,
    #[serde(default = "default_youtube_region")]
    pub youtube_region: String,
    #[serde(default = "default_youtube_max_results")]
    pub youtube_max_results: u32,
    #[serde(default = "default_youtube_categories")]
    pub youtube_categories: Vec<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Config {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn database(&self) -> DatabaseConfig {
        let credentials = match (&self.database_username, &self.database_password) {
            (Some(username), Some(password)) => Some(DatabaseCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        DatabaseConfig {
            url: self.database_url.clone(),
            namespace: self.database_namespace.clone(),
            database: self.database_name.clone(),
            credentials,
        }
    }

    pub fn youtube(&self) -> YouTubeConfig {
        YouTubeConfig {
            api_key: self.youtube_api_key.clone(),
            api_url: self.youtube_api_url.clone(),
            region: self.youtube_region.clone(),
            max_results: self.youtube_max_results,
            categories: self.youtube_categories.clone(),
        }
    }

    pub fn transaction_timeout(&self) -> Duration {
        *self.transaction_timeout
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    4000
}

fn default_database_url() -> Url {
    Url::parse("mem://").expect("static url is valid")
}

fn default_namespace() -> String {
    "videos".to_string()
}

fn default_transaction_timeout() -> humantime::Duration {
    Duration::from_secs(5).into()
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_youtube_api_url() -> Url {
    Url::parse("https://www.googleapis.com/youtube/v3/").expect("static url is valid")
}

fn default_youtube_region() -> String {
    "US".to_string()
}

fn default_youtube_max_results() -> u32 {
    10
}

fn default_youtube_categories() -> Vec<String> {
    vec!["1".to_string(), "10".to_string(), "28".to_string()]
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
