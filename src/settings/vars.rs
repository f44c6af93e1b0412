use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::ConfigError;

/// Service binding consulted when `UPS_NAMES` is not set.
pub const DEFAULT_UPS_NAME: &str = "dashboard-ups";

const UPS_NAMES_ENV: &str = "UPS_NAMES";
const UPS_NAMES_DELIMITER: char = ':';

/// A single source of configuration values.
pub trait Lookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLookup;

impl Lookup for OsLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value pairs, e.g. a service binding's credentials.
#[derive(Debug, Clone, Default)]
pub struct MapLookup(HashMap<String, String>);

impl Lookup for MapLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapLookup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ServiceBinding {
    name: String,
    #[serde(default)]
    credentials: HashMap<String, JsonValue>,
}

/// Service bindings from `VCAP_SERVICES`, keyed by service label.
#[derive(Debug, Default)]
pub struct VcapServices(HashMap<String, Vec<ServiceBinding>>);

impl VcapServices {
    /// Parses the `VCAP_SERVICES` JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServices`] if the document is malformed.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(ConfigError::InvalidServices)
    }

    /// Credentials of the binding called `name`, whatever its label.
    ///
    /// Non-string credential values are kept in their JSON form.
    #[must_use]
    pub fn credentials(&self, name: &str) -> Option<MapLookup> {
        let binding = self.0.values().flatten().find(|b| b.name == name)?;
        Some(
            binding
                .credentials
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
        )
    }
}

/// Ordered set of configuration sources; the first source holding a key wins.
#[derive(Default)]
pub struct VarSet {
    lookups: Vec<Box<dyn Lookup>>,
}

impl VarSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower precedence than those already added.
    #[must_use]
    pub fn with_lookup(mut self, lookup: impl Lookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }

    /// Named service bindings first, then the process environment.
    ///
    /// `UPS_NAMES` (colon separated) selects the bindings; without it the
    /// `dashboard-ups` binding is used when bound.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServices`] if `VCAP_SERVICES` is malformed.
    pub fn from_process_env() -> Result<Self, ConfigError> {
        let services = match std::env::var("VCAP_SERVICES") {
            Ok(json) => VcapServices::parse(&json)?,
            Err(_) => {
                tracing::warn!("no Cloud Foundry service bindings found");
                VcapServices::default()
            }
        };
        let ups_names = std::env::var(UPS_NAMES_ENV).ok();
        Ok(Self::from_bindings(&services, ups_names.as_deref()).with_lookup(OsLookup))
    }

    /// Binding lookups only, in `ups_names` order.
    #[must_use]
    pub fn from_bindings(services: &VcapServices, ups_names: Option<&str>) -> Self {
        let names: Vec<&str> = match ups_names.filter(|n| !n.trim().is_empty()) {
            Some(list) => list
                .split(UPS_NAMES_DELIMITER)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect(),
            None => vec![DEFAULT_UPS_NAME],
        };

        names.into_iter().fold(Self::new(), |set, name| match services.credentials(name) {
            Some(credentials) => {
                tracing::debug!(service = name, "using service binding for configuration");
                set.with_lookup(credentials)
            }
            None => set,
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lookups.iter().find_map(|l| l.lookup(key))
    }

    /// Value of `key`, or `default` if no source holds it.
    #[must_use]
    pub fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming `key`.
    pub fn must_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] or [`ConfigError::InvalidBool`].
    pub fn must_bool(&self, key: &str) -> Result<bool, ConfigError> {
        parse_bool(key, &self.must_string(key)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBool`] if the value is present but malformed.
    pub fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.get(key).map_or(Ok(default), |v| parse_bool(key, &v))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] if the value is present but malformed.
    pub fn u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.get(key).map_or(Ok(default), |v| {
            v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value: v,
            })
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
