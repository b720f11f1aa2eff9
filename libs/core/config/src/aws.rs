use crate::{env_optional, ConfigError, FromEnv};

/// AWS client configuration shared by SQS and SES clients.
///
/// Every field is optional; unset values fall through to the AWS SDK default
/// chain (IRSA, instance profile, shared credentials file).
#[derive(Clone, Debug, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Custom endpoint, e.g. `http://localhost:4566` for LocalStack
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl AwsConfig {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Whether static credentials are configured
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

impl FromEnv for AwsConfig {
    /// Reads AWS_REGION (or AWS_DEFAULT_REGION), AWS_ENDPOINT_URL,
    /// AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            region: env_optional("AWS_REGION").or_else(|| env_optional("AWS_DEFAULT_REGION")),
            endpoint_url: env_optional("AWS_ENDPOINT_URL"),
            access_key_id: env_optional("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_optional("AWS_SECRET_ACCESS_KEY"),
        };

        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(ConfigError::Invalid {
                key: "AWS_SECRET_ACCESS_KEY".to_string(),
                details: "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_config_from_env_localstack() {
        temp_env::with_vars(
            [
                ("AWS_REGION", Some("eu-central-1")),
                ("AWS_ENDPOINT_URL", Some("http://localhost:4566")),
                ("AWS_ACCESS_KEY_ID", Some("test")),
                ("AWS_SECRET_ACCESS_KEY", Some("test")),
            ],
            || {
                let config = AwsConfig::from_env().unwrap();
                assert_eq!(config.region.as_deref(), Some("eu-central-1"));
                assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
                assert!(config.has_static_credentials());
            },
        );
    }

    #[test]
    fn test_aws_config_falls_back_to_default_region() {
        temp_env::with_vars(
            [
                ("AWS_REGION", None),
                ("AWS_DEFAULT_REGION", Some("us-east-1")),
                ("AWS_ENDPOINT_URL", None),
                ("AWS_ACCESS_KEY_ID", None),
                ("AWS_SECRET_ACCESS_KEY", None),
            ],
            || {
                let config = AwsConfig::from_env().unwrap();
                assert_eq!(config.region.as_deref(), Some("us-east-1"));
                assert!(!config.has_static_credentials());
            },
        );
    }

    #[test]
    fn test_aws_config_rejects_partial_credentials() {
        temp_env::with_vars(
            [
                ("AWS_ACCESS_KEY_ID", Some("AKIA")),
                ("AWS_SECRET_ACCESS_KEY", None::<&str>),
            ],
            || {
                assert!(AwsConfig::from_env().is_err());
            },
        );
    }
}
