use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;

use crate::mirror::ImageTag;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// AWS account that owns the destination registry
    #[serde(default, deserialize_with = "string_or_number")]
    pub account_id: String,

    /// Images to mirror, as `name:tag` entries
    #[serde(default, deserialize_with = "list_or_csv")]
    pub image_tags: Vec<String>,

    /// Registry region. Falls back to the AWS SDK region chain when unset
    #[serde(default)]
    pub region: Option<String>,

    /// Maximum number of images transferred at the same time (default: 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Container CLI used to pull and push images (docker or podman)
    #[serde(default = "default_container_cli")]
    pub container_cli: String,

    /// Log the container CLI into ECR before pushing
    #[serde(default)]
    pub login: bool,
}

/// Account IDs in YAML files may be written without quotes
fn string_or_number<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected an account ID, got {}",
            other
        ))),
    }
}

/// Accepts either a list or a comma-separated string (as set through MIRROR_IMAGE_TAGS)
fn list_or_csv<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(list) => list,
        ListOrCsv::Csv(csv) => split_image_tags(&csv),
    })
}

fn default_concurrency() -> usize {
    1
}

fn default_container_cli() -> String {
    "docker".to_string()
}

/// Values given on the command line, applied after every other source
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub account_id: Option<String>,
    pub image_tags: Option<String>,
    pub region: Option<String>,
    pub concurrency: Option<usize>,
    pub container_cli: Option<String>,
    pub login: bool,
}

impl Settings {
    /// Substitute environment variables in a string value
    /// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let re = RE.get_or_init(|| {
            regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex is valid")
        });

        re.replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, performing environment variable substitution
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => {
                serde_json::Value::String(Self::substitute_env_vars_in_string(s))
            }
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                let vec: Vec<serde_json::Value> =
                    arr.iter().map(Self::config_value_to_json).collect();
                serde_json::Value::Array(vec)
            }
        }
    }

    /// Add a config file if one exists with a .toml, .yaml or .yml extension
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    /// Load settings from config files, the environment and command line overrides
    ///
    /// Sources, later ones winning:
    /// 1. `default` and `local` config files in `config_dir` (or `MIRROR_CONFIG_DIR`)
    /// 2. `MIRROR_*` environment variables (e.g. `MIRROR_CONCURRENCY=4`)
    /// 3. `AWS_ACCOUNT_ID`, `IMAGE_TAGS`, `AWS_REGION` / `AWS_DEFAULT_REGION`
    /// 4. command line overrides
    pub fn load(
        config_dir: Option<&str>,
        overrides: &SettingsOverrides,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir
            .map(String::from)
            .or_else(|| env::var("MIRROR_CONFIG_DIR").ok())
            .unwrap_or_else(|| "config".into());

        let mut builder = Config::builder();
        Self::try_add_config_file(&mut builder, &config_dir, "default");
        Self::try_add_config_file(&mut builder, &config_dir, "local");
        builder = builder.add_source(
            config::Environment::with_prefix("MIRROR")
                .try_parsing(true)
                .ignore_empty(true),
        );

        let config = builder.build()?;

        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            // MIRROR_CONFIG_DIR selects the files, it is not a setting
            if k == "config_dir" {
                continue;
            }
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }
        let json_value = serde_json::Value::Object(json_map);

        let mut unused_fields = Vec::new();
        let mut settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        settings.apply_env(|key| env::var(key).ok());
        settings.apply_overrides(overrides);
        settings.validate()?;

        Ok(settings)
    }

    /// Apply MIRROR_ACCOUNT_ID and the conventional AWS_ACCOUNT_ID / IMAGE_TAGS / AWS_REGION variables
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // The MIRROR_* source parses numeric strings, which drops leading zeros
        if let Some(account_id) = non_empty("MIRROR_ACCOUNT_ID") {
            self.account_id = account_id;
        }
        if let Some(account_id) = non_empty("AWS_ACCOUNT_ID") {
            self.account_id = account_id;
        }
        if let Some(image_tags) = non_empty("IMAGE_TAGS") {
            self.image_tags = split_image_tags(&image_tags);
        }
        if let Some(region) = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")) {
            self.region = Some(region);
        }
    }

    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(account_id) = &overrides.account_id {
            self.account_id = account_id.clone();
        }
        if let Some(image_tags) = &overrides.image_tags {
            self.image_tags = split_image_tags(image_tags);
        }
        if let Some(region) = &overrides.region {
            self.region = Some(region.clone());
        }
        self.region = self.region.take().filter(|r| !r.trim().is_empty());
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(container_cli) = &overrides.container_cli {
            self.container_cli = container_cli.clone();
        }
        if overrides.login {
            self.login = true;
        }
    }

    /// Check required values before any work is attempted
    pub fn validate(&self) -> Result<(), ConfigError> {
        let account_id = self.account_id.trim();
        if account_id.is_empty() {
            return Err(ConfigError::Message(
                "AWS account ID not configured. Set AWS_ACCOUNT_ID environment variable, --account-id or account_id in config".to_string()
            ));
        }
        if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Message(format!(
                "AWS account ID must be 12 digits. Got: '{}'",
                account_id
            )));
        }

        if self.image_tags.is_empty() {
            return Err(ConfigError::Message(
                "No images to mirror. Set IMAGE_TAGS environment variable (comma-separated name:tag list), --image-tags or image_tags in config".to_string()
            ));
        }
        self.parsed_image_tags()?;

        if self.concurrency == 0 {
            return Err(ConfigError::Message(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if self.container_cli.trim().is_empty() {
            return Err(ConfigError::Message(
                "container_cli must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn parsed_image_tags(&self) -> Result<Vec<ImageTag>, ConfigError> {
        self.image_tags
            .iter()
            .map(|entry| {
                ImageTag::parse(entry)
                    .map_err(|e| ConfigError::Message(format!("Invalid IMAGE_TAGS entry: {}", e)))
            })
            .collect()
    }
}

/// Split a comma-separated list; empty entries are kept so validation can reject them
fn split_image_tags(csv: &str) -> Vec<String> {
    csv.split(',').map(|s| s.trim().to_string()).collect()
}
