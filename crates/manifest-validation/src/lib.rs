//! Structural validation of hosted web-app manifests.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub const MANIFEST_CONTENT_TYPE: &str = "application/x-web-app-manifest+json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub known_properties: Vec<String>,
    pub max_name_len: usize,
    pub max_description_len: usize,
    pub version_pattern: String,
    pub origin_pattern: String,
    pub expected_content_type: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            known_properties: [
                "activities",
                "appcache_path",
                "chrome",
                "csp",
                "default_locale",
                "description",
                "developer",
                "fullscreen",
                "icons",
                "installs_allowed_from",
                "launch_path",
                "locales",
                "messages",
                "name",
                "orientation",
                "origin",
                "permissions",
                "precompile",
                "redirects",
                "required_features",
                "role",
                "screen_size",
                "type",
                "version",
                "widget",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_name_len: 128,
            max_description_len: 1024,
            version_pattern: r"^[0-9A-Za-z._+-]+$".into(),
            origin_pattern: r"^https?://[^/\s]+/?$".into(),
            expected_content_type: MANIFEST_CONTENT_TYPE.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid validation pattern: {0}")]
    InvalidPattern(String),
}

/// Fields of a manifest that validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub icons: BTreeMap<u32, String>,
    pub installs_allowed_from: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The document could not be parsed as JSON.
    NotJson,
    /// The JSON does not follow the manifest schema.
    Schema,
}

/// Why a manifest was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub reason: FailureReason,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedManifest {
    pub manifest: Manifest,
    pub warnings: Vec<ValidationIssue>,
}

/// Best-effort read of the `name` property, for manifests already on file.
pub fn manifest_name(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("name")?.as_str().map(String::from)
}

#[derive(Debug, Clone)]
pub struct ManifestValidator {
    config: ValidationConfig,
    version_re: Regex,
    origin_re: Regex,
}

impl ManifestValidator {
    pub fn new(config: ValidationConfig) -> Result<Self, ValidationError> {
        let version_re = Regex::new(&config.version_pattern)
            .map_err(|_| ValidationError::InvalidPattern(config.version_pattern.clone()))?;
        let origin_re = Regex::new(&config.origin_pattern)
            .map_err(|_| ValidationError::InvalidPattern(config.origin_pattern.clone()))?;
        Ok(Self {
            config,
            version_re,
            origin_re,
        })
    }

    pub fn validate(
        &self,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<ValidatedManifest, ValidationReport> {
        let mut warnings = Vec::new();
        match content_type {
            Some(value) if media_type(value) == self.config.expected_content_type => {}
            Some(value) => warnings.push(ValidationIssue::new(
                "",
                format!(
                    "unexpected content type `{value}`, expected `{}`",
                    self.config.expected_content_type
                ),
            )),
            None => warnings.push(ValidationIssue::new("", "missing content type")),
        }

        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(err) => {
                return Err(ValidationReport {
                    reason: FailureReason::NotJson,
                    errors: vec![ValidationIssue::new(
                        "",
                        format!("manifest is not valid JSON: {err}"),
                    )],
                    warnings,
                })
            }
        };
        let Some(object) = value.as_object() else {
            return Err(ValidationReport {
                reason: FailureReason::Schema,
                errors: vec![ValidationIssue::new("", "manifest must be a JSON object")],
                warnings,
            });
        };

        let mut errors = Vec::new();
        for key in object.keys() {
            if !self.config.known_properties.iter().any(|known| known == key) {
                errors.push(ValidationIssue::new(key.as_str(), "unexpected property"));
            }
        }

        let name = self.check_name(object, &mut errors);
        let description = self.optional_text(
            object,
            "description",
            self.config.max_description_len,
            &mut errors,
        );
        let version = self.check_version(object, &mut errors);
        check_launch_path(object, &mut errors);
        let icons = check_icons(object, &mut errors);
        let installs_allowed_from = self.check_install_origins(object, &mut errors);
        check_developer(object, &mut errors);
        check_locales(object, &mut errors);

        if !errors.is_empty() {
            debug!(errors = errors.len(), "manifest rejected");
            return Err(ValidationReport {
                reason: FailureReason::Schema,
                errors,
                warnings,
            });
        }

        Ok(ValidatedManifest {
            manifest: Manifest {
                name: name.unwrap_or_default(),
                version,
                description,
                icons,
                installs_allowed_from,
                raw: value,
            },
            warnings,
        })
    }

    fn check_name(
        &self,
        object: &Map<String, Value>,
        errors: &mut Vec<ValidationIssue>,
    ) -> Option<String> {
        match object.get("name") {
            None => {
                errors.push(ValidationIssue::new("name", "required property is missing"));
                None
            }
            Some(Value::String(name)) if name.trim().is_empty() => {
                errors.push(ValidationIssue::new("name", "must not be empty"));
                None
            }
            Some(Value::String(name)) if name.chars().count() > self.config.max_name_len => {
                errors.push(ValidationIssue::new(
                    "name",
                    format!("longer than {} characters", self.config.max_name_len),
                ));
                None
            }
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => {
                errors.push(ValidationIssue::new("name", "must be a string"));
                None
            }
        }
    }

    fn optional_text(
        &self,
        object: &Map<String, Value>,
        key: &str,
        max_len: usize,
        errors: &mut Vec<ValidationIssue>,
    ) -> Option<String> {
        match object.get(key)? {
            Value::String(text) if text.chars().count() > max_len => {
                errors.push(ValidationIssue::new(
                    key,
                    format!("longer than {max_len} characters"),
                ));
                None
            }
            Value::String(text) => Some(text.clone()),
            _ => {
                errors.push(ValidationIssue::new(key, "must be a string"));
                None
            }
        }
    }

    fn check_version(
        &self,
        object: &Map<String, Value>,
        errors: &mut Vec<ValidationIssue>,
    ) -> Option<String> {
        match object.get("version")? {
            Value::String(version) if self.version_re.is_match(version) => Some(version.clone()),
            Value::String(version) => {
                errors.push(ValidationIssue::new(
                    "version",
                    format!("`{version}` is not a valid version string"),
                ));
                None
            }
            _ => {
                errors.push(ValidationIssue::new("version", "must be a string"));
                None
            }
        }
    }

    fn check_install_origins(
        &self,
        object: &Map<String, Value>,
        errors: &mut Vec<ValidationIssue>,
    ) -> Vec<String> {
        let Some(value) = object.get("installs_allowed_from") else {
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            errors.push(ValidationIssue::new(
                "installs_allowed_from",
                "must be an array",
            ));
            return Vec::new();
        };
        let mut origins = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let path = format!("installs_allowed_from[{idx}]");
            match item.as_str() {
                Some(origin) if origin == "*" || self.origin_re.is_match(origin) => {
                    origins.push(origin.to_string());
                }
                Some(origin) => {
                    errors.push(ValidationIssue::new(
                        path,
                        format!("`{origin}` is not `*` or an http(s) origin"),
                    ));
                }
                None => errors.push(ValidationIssue::new(path, "must be a string")),
            }
        }
        origins
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn check_launch_path(object: &Map<String, Value>, errors: &mut Vec<ValidationIssue>) {
    match object.get("launch_path") {
        None => {}
        Some(Value::String(path)) if path.starts_with('/') => {}
        Some(Value::String(_)) => {
            errors.push(ValidationIssue::new("launch_path", "must start with `/`"));
        }
        Some(_) => errors.push(ValidationIssue::new("launch_path", "must be a string")),
    }
}

fn check_icons(
    object: &Map<String, Value>,
    errors: &mut Vec<ValidationIssue>,
) -> BTreeMap<u32, String> {
    let mut icons = BTreeMap::new();
    let Some(value) = object.get("icons") else {
        return icons;
    };
    let Some(entries) = value.as_object() else {
        errors.push(ValidationIssue::new("icons", "must be an object"));
        return icons;
    };
    for (size, url) in entries {
        let path = format!("icons.{size}");
        let parsed = size.parse::<u32>().ok().filter(|px| *px > 0);
        let Some(px) = parsed else {
            errors.push(ValidationIssue::new(path, "icon size must be a positive integer"));
            continue;
        };
        match url.as_str() {
            Some(url) if !url.trim().is_empty() => {
                icons.insert(px, url.to_string());
            }
            _ => errors.push(ValidationIssue::new(path, "icon path must be a non-empty string")),
        }
    }
    icons
}

fn check_developer(object: &Map<String, Value>, errors: &mut Vec<ValidationIssue>) {
    let Some(value) = object.get("developer") else {
        return;
    };
    let Some(developer) = value.as_object() else {
        errors.push(ValidationIssue::new("developer", "must be an object"));
        return;
    };
    if let Some(name) = developer.get("name") {
        if !name.is_string() {
            errors.push(ValidationIssue::new("developer.name", "must be a string"));
        }
    }
}

fn check_locales(object: &Map<String, Value>, errors: &mut Vec<ValidationIssue>) {
    let Some(value) = object.get("locales") else {
        return;
    };
    if !value.is_object() {
        errors.push(ValidationIssue::new("locales", "must be an object"));
        return;
    }
    match object.get("default_locale") {
        Some(Value::String(_)) => {}
        Some(_) => errors.push(ValidationIssue::new("default_locale", "must be a string")),
        None => errors.push(ValidationIssue::new(
            "default_locale",
            "required when `locales` is present",
        )),
    }
}
