//! Settings loading.
//!
//! Loads `config.json` from the epictrack base directory and overlays the
//! project's `.epictrack/config.json`. Sections are merged key by key
//! (project wins); environment variables are applied last.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tracking behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    /// Push dirty epics to the remote tracker. When false, sync is a no-op.
    pub auto_update_epics: bool,
    /// Post a comment listing new journey entries on each successful push.
    pub comment_on_progress: bool,
    /// Upper bound for every remote call.
    pub request_timeout_secs: u64,
    /// Create/close remote tracking records for reconciled mirror items.
    pub mirror_as_issues: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            auto_update_epics: true,
            comment_on_progress: false,
            request_timeout_secs: 30,
            mirror_as_issues: false,
        }
    }
}

/// Remote tracker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubSettings {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

/// Full epictrack settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracking: TrackingSettings,
    pub github: GithubSettings,
}

impl Settings {
    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN").or_else(|| non_empty("GH_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(url) = non_empty("EPICTRACK_API_URL") {
            self.github.api_url = url;
        }
        if let Some(flag) = non_empty("EPICTRACK_AUTO_UPDATE") {
            let flag = flag.trim().to_lowercase();
            self.tracking.auto_update_epics = !(flag == "0" || flag == "false" || flag == "no");
        }
    }

    fn validate(&self) -> Result<()> {
        if self.tracking.request_timeout_secs == 0 {
            return Err(Error::Config(
                "tracking.requestTimeoutSecs must be greater than 0".to_string(),
            ));
        }
        if self.github.api_url.trim().is_empty() {
            return Err(Error::Config("github.apiUrl must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Merge `overlay` into `base` one level deep: top-level sections are
/// merged key by key, with `overlay` winning on conflicts.
#[must_use]
pub fn merge_settings(mut base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    let serde_json::Value::Object(overlay_obj) = overlay else {
        return base;
    };

    if let Some(base_obj) = base.as_object_mut() {
        for (section, value) in overlay_obj {
            let merged_in_place = match (base_obj.get_mut(&section), &value) {
                (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                    existing.extend(incoming.clone());
                    true
                }
                _ => false,
            };
            if !merged_in_place {
                base_obj.insert(section, value);
            }
        }
    }
    base
}

fn read_settings_file(path: &Path) -> Result<serde_json::Value> {
    if !path.exists() {
        return Ok(serde_json::json!({}));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?;

    if !value.is_object() {
        return Err(Error::Config(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Load settings from the base directory and an optional project root.
///
/// # Errors
///
/// Returns a `Config` error when a settings file is unreadable, is not a
/// JSON object, carries wrongly-typed values, or fails validation.
pub fn load_settings(base_dir: Option<&Path>, project_root: Option<&Path>) -> Result<Settings> {
    let mut merged = serde_json::json!({});

    if let Some(dir) = base_dir {
        merged = merge_settings(merged, read_settings_file(&dir.join("config.json"))?);
    }
    if let Some(root) = project_root {
        let project_file = root.join(".epictrack").join("config.json");
        merged = merge_settings(merged, read_settings_file(&project_file)?);
    }

    let mut settings: Settings = serde_json::from_value(merged.clone())
        .map_err(|e| Error::Config(format!("Invalid settings: {e}")))?;

    let known = serde_json::to_value(Settings::default())?;
    if let (Some(merged_obj), Some(known_obj)) = (merged.as_object(), known.as_object()) {
        for (section, values) in merged_obj {
            let Some(known_section) = known_obj.get(section).and_then(|v| v.as_object()) else {
                tracing::debug!(section = %section, "Ignoring unknown settings section");
                continue;
            };
            if let Some(values) = values.as_object() {
                for key in values.keys() {
                    if !known_section.contains_key(key) && key != "token" {
                        tracing::debug!(key = %format!("{section}.{key}"), "Ignoring unknown setting");
                    }
                }
            }
        }
    }

    settings.apply_env_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.tracking.auto_update_epics);
        assert!(!settings.tracking.comment_on_progress);
        assert_eq!(settings.tracking.request_timeout_secs, 30);
        assert_eq!(settings.github.api_url, "https://api.github.com");
    }

    #[test]
    fn test_merge_is_per_key_within_section() {
        let base = serde_json::json!({
            "tracking": { "autoUpdateEpics": true, "commentOnProgress": true }
        });
        let overlay = serde_json::json!({
            "tracking": { "autoUpdateEpics": false },
            "github": { "apiUrl": "http://ghe.local/api/v3" }
        });

        let merged = merge_settings(base, overlay);
        assert_eq!(merged["tracking"]["autoUpdateEpics"], false);
        assert_eq!(merged["tracking"]["commentOnProgress"], true);
        assert_eq!(merged["github"]["apiUrl"], "http://ghe.local/api/v3");
    }

    #[test]
    fn test_load_project_overrides_global() {
        let base = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            base.path().join("config.json"),
            r#"{"tracking":{"commentOnProgress":true,"requestTimeoutSecs":10}}"#,
        )
        .unwrap();
        fs::create_dir_all(project.path().join(".epictrack")).unwrap();
        fs::write(
            project.path().join(".epictrack").join("config.json"),
            r#"{"tracking":{"requestTimeoutSecs":5}}"#,
        )
        .unwrap();

        let settings = load_settings(Some(base.path()), Some(project.path())).unwrap();
        assert!(settings.tracking.comment_on_progress);
        assert_eq!(settings.tracking.request_timeout_secs, 5);
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let base = TempDir::new().unwrap();
        fs::write(
            base.path().join("config.json"),
            r#"{"tracking":{"autoUpdateEpics":"yes please"}}"#,
        )
        .unwrap();

        let result = load_settings(Some(base.path()), None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let base = TempDir::new().unwrap();
        fs::write(
            base.path().join("config.json"),
            r#"{"tracking":{"requestTimeoutSecs":0}}"#,
        )
        .unwrap();
        assert!(matches!(
            load_settings(Some(base.path()), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GH_TOKEN", "ghp_fallback"),
            ("EPICTRACK_AUTO_UPDATE", "false"),
            ("EPICTRACK_API_URL", "http://localhost:8080"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(settings.github.token.as_deref(), Some("ghp_fallback"));
        assert!(!settings.tracking.auto_update_epics);
        assert_eq!(settings.github.api_url, "http://localhost:8080");
    }
}
