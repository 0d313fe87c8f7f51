use serde::Deserialize;
use std::{net::IpAddr, num::NonZeroU64, path::PathBuf, time::Duration};
use yatube_common::{
    pagination::{DEFAULT_PER_PAGE, Paginator},
    util::{NonPositiveDurationError, PositiveDuration},
};

/// Raw configuration, read from the environment (and an optional `.env` file).
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_objects_per_page")]
    pub objects_per_page: NonZeroU64,
    #[serde(default = "default_index_cache_seconds")]
    pub index_cache_seconds: u64,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    pub session_lifetime_seconds: Option<i64>,
}

fn default_database_url() -> String {
    "sqlite://yatube.db".to_owned()
}

fn default_objects_per_page() -> NonZeroU64 {
    DEFAULT_PER_PAGE
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

/// Settings the request handlers work with.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Settings {
    pub paginator: Paginator,
    /// How long the index page is served from the cache. Zero disables caching.
    pub index_cache_ttl: Duration,
    pub media_root: PathBuf,
    /// Sessions never expire if unset.
    pub session_lifetime: Option<PositiveDuration>,
}

impl Settings {
    #[must_use]
    pub fn new(media_root: PathBuf) -> Self {
        Self {
            paginator: Paginator::default(),
            index_cache_ttl: Duration::from_secs(default_index_cache_seconds()),
            media_root,
            session_lifetime: None,
        }
    }
}

impl TryFrom<&Env> for Settings {
    type Error = NonPositiveDurationError;

    fn try_from(env: &Env) -> Result<Self, Self::Error> {
        Ok(Self {
            paginator: Paginator::new(env.objects_per_page),
            index_cache_ttl: Duration::from_secs(env.index_cache_seconds),
            media_root: env.media_root.clone(),
            session_lifetime: env
                .session_lifetime_seconds
                .map(PositiveDuration::from_seconds)
                .transpose()?,
        })
    }
}
