//! Environment-variable configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use docmirror_repl::AttachmentRef;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {name}")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Connection settings for one repository instance.
#[derive(Debug, Clone, Default)]
pub struct RepositorySettings {
    pub endpoint: String,
    pub oidc_config: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: RepositorySettings,
    pub target: RepositorySettings,
    pub ignore_types: Vec<String>,
    pub ignore_subs: Vec<String>,
    pub ignore_sections: Vec<String>,
    pub include_attachments: Vec<AttachmentRef>,
    pub all_attachments: bool,
    pub start_event: i64,
    pub state_db: PathBuf,
    pub addr: SocketAddr,
    pub profile_addr: Option<SocketAddr>,
    pub cors_hosts: Vec<String>,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through a lookup function, so tests never have
    /// to mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            match lookup(name) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(ConfigError::Missing { name }),
            }
        };

        let include_attachments = split_list(lookup("INCLUDE_ATTACHMENTS"))
            .iter()
            .map(|entry| {
                AttachmentRef::parse(entry).map_err(|err| ConfigError::Invalid {
                    name: "INCLUDE_ATTACHMENTS",
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let start_event = match lookup("START_EVENT") {
            None => 0,
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "START_EVENT",
                reason: format!("not an integer: {v:?}"),
            })?,
        };

        let addr = parse_addr("ADDR", lookup("ADDR"))?.unwrap_or_else(|| {
            SocketAddr::from(([0, 0, 0, 0], 1080))
        });
        let profile_addr = parse_addr("PROFILE_ADDR", lookup("PROFILE_ADDR"))?;

        Ok(Self {
            source: RepositorySettings {
                endpoint: required("REPOSITORY_ENDPOINT")?,
                oidc_config: lookup("OIDC_CONFIG"),
                client_id: lookup("CLIENT_ID"),
                client_secret: lookup("CLIENT_SECRET"),
            },
            target: RepositorySettings {
                endpoint: required("TARGET_REPOSITORY_ENDPOINT")?,
                oidc_config: lookup("TARGET_OIDC_CONFIG"),
                client_id: lookup("TARGET_CLIENT_ID"),
                client_secret: lookup("TARGET_CLIENT_SECRET"),
            },
            ignore_types: split_list(lookup("IGNORE_TYPES")),
            ignore_subs: split_list(lookup("IGNORE_SUBS")),
            ignore_sections: split_list(lookup("IGNORE_SECTIONS")),
            include_attachments,
            all_attachments: parse_bool("ALL_ATTACHMENTS", lookup("ALL_ATTACHMENTS"))?,
            start_event,
            state_db: lookup("STATE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("docmirror.redb")),
            addr,
            profile_addr,
            cors_hosts: split_list(lookup("CORS_HOSTS")),
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref() {
        None | Some("") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("not a boolean: {other:?}"),
        }),
    }
}

fn parse_addr(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<SocketAddr>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("not a socket address: {v:?}"),
            }),
    }
}
