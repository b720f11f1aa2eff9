use crate::{env_optional, env_or_default, env_required, ConfigError, FromEnv};

/// Redis configuration
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub uri: String,
    /// Consumer group used when reading streams
    pub consumer_group: String,
    /// Consumer name within the group
    pub consumer_id: String,
}

impl RedisConfig {
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            consumer_group: "queue_workers".to_string(),
            consumer_id: default_consumer_id(),
        }
    }
}

fn default_consumer_id() -> String {
    env_optional("HOSTNAME").unwrap_or_else(|| "queue-worker".to_string())
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_HOST to be set (no default)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            uri: env_required("REDIS_HOST")?,
            consumer_group: env_or_default("REDIS_CONSUMER_GROUP", "queue_workers"),
            consumer_id: env_optional("REDIS_CONSUMER_ID").unwrap_or_else(default_consumer_id),
        })
    }
}
