use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::de;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_yaml::Mapping;

/// Options applying to every backend, with per-backend overrides.
///
/// A per-backend entry starts from the values set in `all` and overrides the keys it sets.
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct BackendConfiguration<T>
where
    T: fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    /// options applying to all backends
    #[serde(default)]
    pub all: T,
    /// per backend options
    #[serde(default)]
    pub backends: HashMap<String, T>,
}

impl<T> BackendConfiguration<T>
where
    T: fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    /// The options for `backend`.
    pub fn get(&self, backend: &str) -> &T {
        self.backends.get(backend).unwrap_or(&self.all)
    }
}

impl<'de, T> Deserialize<'de> for BackendConfiguration<T>
where
    T: DeserializeOwned,
    T: fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let sections = Sections::deserialize(deserializer)?;
        sections.resolve().map_err(de::Error::custom)
    }
}

/// The sections as written, before `all` is applied under each backend.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Sections {
    #[serde(default)]
    all: Mapping,
    #[serde(default)]
    backends: HashMap<String, Mapping>,
}

impl Sections {
    fn resolve<T>(self) -> Result<BackendConfiguration<T>, String>
    where
        T: DeserializeOwned,
        T: fmt::Debug + Default + Clone + Serialize + JsonSchema,
    {
        let backends = self
            .backends
            .into_iter()
            .map(|(name, overrides)| {
                let options = serde_yaml::from_value(overlay(&self.all, overrides))
                    .map_err(|err| format!("backend '{name}': {err}"))?;
                Ok((name, options))
            })
            .collect::<Result<_, String>>()?;
        let all = serde_yaml::from_value(serde_yaml::Value::Mapping(self.all))
            .map_err(|err| format!("all: {err}"))?;

        Ok(BackendConfiguration { all, backends })
    }
}

/// `base` with every top-level key of `overrides` replaced. Nested maps are not merged.
fn overlay(base: &Mapping, overrides: Mapping) -> serde_yaml::Value {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    serde_yaml::Value::Mapping(merged)
}
