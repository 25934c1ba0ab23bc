//! Configuration for the serve subcommand.
use sigmaguard::ServiceConfig;

use crate::config::Profile;

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub listen_addr: String,
    pub service: ServiceConfig,
}

impl Config {
    pub fn from_profile(profile: &Profile, db_override: Option<&str>, addr_override: Option<&str>) -> Self {
        Self {
            database_url: db_override
                .map(str::to_string)
                .or_else(|| profile.connection.clone()),
            listen_addr: addr_override.unwrap_or(profile.listen_addr()).to_string(),
            service: profile.service_config(),
        }
    }
}
