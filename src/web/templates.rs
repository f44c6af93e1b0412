use std::io::ErrorKind;
use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;

use super::error::WebError;
use crate::settings::ConfigError;

const INDEX: &str = "index";
const INDEX_FILE: &str = "index.html";
const BUILTIN_INDEX: &str = include_str!("../../templates/index.html");

/// Values injected into the app shell.
#[derive(Debug, Serialize)]
pub struct IndexPage<'a> {
    pub csrf_token: &'a str,
    pub ga_tracking_id: &'a str,
    pub new_relic_id: &'a str,
    pub new_relic_browser_license_key: &'a str,
}

/// Server-rendered templates.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    /// Register `<dir>/index.html`, or the built-in shell if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if the file cannot be read or parsed.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(INDEX_FILE);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                tracing::info!(path = %path.display(), "loaded index template");
                Self::from_source(&source)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no index template found, using built-in shell");
                Self::builtin()
            }
            Err(e) => Err(ConfigError::Template(format!("{}: {e}", path.display()))),
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if `source` is not a valid template.
    pub fn from_source(source: &str) -> Result<Self, ConfigError> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(INDEX, source)
            .map_err(|e| ConfigError::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    /// # Errors
    ///
    /// Never in practice; the built-in shell is a valid template.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_source(BUILTIN_INDEX)
    }

    pub(crate) fn render_index(&self, page: &IndexPage<'_>) -> Result<String, WebError> {
        self.registry
            .render(INDEX, page)
            .map_err(|e| WebError::Render(e.to_string()))
    }
}
