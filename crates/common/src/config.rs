use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(&Lookup::process())
    }

    pub fn from_lookup(lookup: &Lookup) -> Self {
        match lookup
            .string("ENVIRONMENT", "development")
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Source of configuration values.
///
/// Service configs read through a `Lookup` instead of calling `std::env::var`
/// directly, so tests can build configs from a plain map.
pub enum Lookup {
    Process,
    Map(HashMap<String, String>),
}

impl Lookup {
    pub fn process() -> Self {
        Lookup::Process
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Lookup::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Raw value, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            Lookup::Process => env::var(key).ok(),
            Lookup::Map(map) => map.get(key).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parsed value, falling back to `default` when unset or unparsable.
    pub fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
                    default
                }
            },
            None => default,
        }
    }

    /// Comma separated list, trimmed, empty entries dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
