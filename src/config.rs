use crate::error::{Result, UnderwritingError};
use serde::{Deserialize, Serialize};

/// Dataset holding the `properties`, `loans`, `tenants` and `market_comps` tables.
pub const DATASET_ID: &str = "cre_data";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const ENV_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_ACCESS_TOKEN: &str = "GCP_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub api_key: String,
    pub model: String,
    /// OAuth bearer token for the warehouse REST API.
    pub bigquery_access_token: Option<String>,
}

impl UnderwritingConfig {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: DATASET_ID.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            bigquery_access_token: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.bigquery_access_token = Some(token.into());
        self
    }

    /// Reads the process environment once. Call this at startup and pass the
    /// result into the components.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| UnderwritingError::MissingConfig(key.to_string()))
        };

        let mut config = Self::new(required(ENV_PROJECT_ID)?, required(ENV_API_KEY)?);

        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            config.model = model;
        }
        config.bigquery_access_token =
            lookup(ENV_ACCESS_TOKEN).filter(|v| !v.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier("project_id", &self.project_id)?;
        validate_identifier("dataset_id", &self.dataset_id)?;

        if self.api_key.trim().is_empty() {
            return Err(UnderwritingError::MissingConfig("api_key".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(UnderwritingError::MissingConfig("model".to_string()));
        }

        Ok(())
    }

    /// Fully qualified, backtick-quoted path of a table in the configured dataset.
    pub fn table_path(&self, table: &str) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset_id, table)
    }
}

// Project and dataset names end up inside query text, so only plain
// identifier characters are accepted.
fn validate_identifier(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(UnderwritingError::MissingConfig(key.to_string()));
    }

    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(UnderwritingError::InvalidConfig {
            key: key.to_string(),
            details: format!("character '{}' is not allowed in '{}'", bad, value),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let config = UnderwritingConfig::from_lookup(lookup_from(&[
            ("GCP_PROJECT_ID", "acme-analytics"),
            ("API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.project_id, "acme-analytics");
        assert_eq!(config.dataset_id, "cre_data");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.bigquery_access_token, None);
    }

    #[test]
    fn test_from_lookup_reads_optional_values() {
        let config = UnderwritingConfig::from_lookup(lookup_from(&[
            ("GCP_PROJECT_ID", "acme-analytics"),
            ("API_KEY", "secret"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("GCP_ACCESS_TOKEN", "ya29.token"),
        ]))
        .unwrap();

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.bigquery_access_token.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let err = UnderwritingConfig::from_lookup(lookup_from(&[(
            "GCP_PROJECT_ID",
            "acme-analytics",
        )]))
        .unwrap_err();

        match err {
            UnderwritingError::MissingConfig(key) => assert_eq!(key, "API_KEY"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_project_id_cannot_break_out_of_table_path() {
        let config = UnderwritingConfig::new("proj`; DROP TABLE x; --", "secret");
        assert!(matches!(
            config.validate(),
            Err(UnderwritingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_table_path() {
        let config = UnderwritingConfig::new("acme-analytics", "secret");
        assert_eq!(
            config.table_path("loans"),
            "`acme-analytics.cre_data.loans`"
        );
    }
}
