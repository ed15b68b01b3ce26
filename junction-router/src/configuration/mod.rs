//! Logic for loading configuration in to an object model

mod backend;

use std::time::Duration;

use displaydoc::Display;
use indexmap::IndexMap;
use junction_federation::SchemaDefinition;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub use self::backend::BackendConfiguration;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// invalid configuration: {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// unknown backend '{backend}' in {section}
    UnknownBackend {
        backend: String,
        section: &'static str,
    },
}

/// The configuration for the gateway.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Backends making up the composite schema, in merge order
    pub backends: IndexMap<String, BackendDefinition>,

    /// Per backend transport settings
    #[serde(default)]
    pub traffic_shaping: BackendConfiguration<TrafficShaping>,

    /// The composite schema
    pub schema: SchemaDefinition,
}

/// Where a backend is reached.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BackendDefinition {
    /// The URL sub-queries are posted to
    pub routing_url: Url,
}

/// Transport settings for one backend.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct TrafficShaping {
    /// Maximum time to wait for a backend response, e.g. `30s` or `500ms`
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for TrafficShaping {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Configuration {
    /// Parses and validates a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration =
            serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::InvalidConfiguration {
                message: "failed to parse configuration",
                error: e.to_string(),
            })?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Checks references between sections.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut overridden: Vec<&String> = self.traffic_shaping.backends.keys().collect();
        overridden.sort();
        if let Some(backend) = overridden
            .into_iter()
            .find(|backend| !self.backends.contains_key(*backend))
        {
            return Err(ConfigurationError::UnknownBackend {
                backend: backend.clone(),
                section: "traffic_shaping",
            });
        }
        Ok(())
    }

    /// The JSON schema of the configuration file.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY_YAML: &str = include_str!("testdata/gateway.yaml");

    #[test]
    fn loads_the_sample_configuration() {
        let configuration = Configuration::from_yaml(GATEWAY_YAML).unwrap();

        assert_eq!(
            configuration.backends.keys().collect::<Vec<_>>(),
            vec!["hr", "crm"]
        );
        assert_eq!(
            configuration.backends["crm"].routing_url.as_str(),
            "http://localhost:4002/graphql"
        );
        assert_eq!(
            configuration.traffic_shaping.get("crm").timeout,
            Duration::from_secs(2)
        );
        assert_eq!(
            configuration.traffic_shaping.get("hr").timeout,
            Duration::from_secs(10)
        );
        assert!(configuration.schema.types.contains_key("Person"));
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(TrafficShaping::default().timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_overrides_for_unknown_backends() {
        let yaml = GATEWAY_YAML.replace("    crm:\n      timeout", "    billing:\n      timeout");
        let err = Configuration::from_yaml(&yaml).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown backend 'billing' in traffic_shaping"
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Configuration::from_yaml("backends: {}\nschema: {}\nlisten: 0.0.0.0:4000\n")
            .unwrap_err();
        assert!(
            matches!(err, ConfigurationError::InvalidConfiguration { .. }),
            "{err}"
        );
    }

    #[test]
    fn json_schema_documents_every_section() {
        let schema = serde_json::to_value(Configuration::json_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("backends"));
        assert!(properties.contains_key("traffic_shaping"));
        assert!(properties.contains_key("schema"));
    }
}
