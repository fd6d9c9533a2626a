// Runtime configuration, read from the process environment.
use std::path::PathBuf;

use anyhow::{anyhow, Context};

use crate::models::MetaStyle;
use crate::schema::Schema;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub schema: &'static Schema,
    pub model_path: PathBuf,
    /// CSV used to train a model when `model_path` does not exist.
    pub training_data: Option<PathBuf>,
    pub meta_style: MetaStyle,
    pub static_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys fall back to
    /// defaults, malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let schema_name = var("SCHEMA").unwrap_or_else(|| "passenger".to_string());
        let schema = Schema::by_name(&schema_name)
            .ok_or_else(|| anyhow!("SCHEMA must be 'passenger' or 'dwelling', got '{}'", schema_name))?;

        let port = match var("PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", p))?,
            None => 5000,
        };

        let workers = match var("WORKERS") {
            Some(w) => w
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| anyhow!("WORKERS must be a positive integer, got '{}'", w))?,
            None => num_cpus::get(),
        };

        let meta_style = match var("META_STYLE") {
            Some(s) => MetaStyle::parse(&s)
                .ok_or_else(|| anyhow!("META_STYLE must be 'metadata' or 'analysis', got '{}'", s))?,
            None => MetaStyle::default(),
        };

        let model_path = var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("models/{}_model.json", schema.name)));

        let training_data = var("TRAINING_DATA").map(PathBuf::from).or_else(|| {
            (schema.name == "passenger").then(|| PathBuf::from("data/titanic.csv"))
        });

        Ok(AppConfig {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            workers,
            schema,
            model_path,
            training_data,
            meta_style,
            static_dir: var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./static")),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_address(), "127.0.0.1:5000");
        assert_eq!(cfg.schema.name, "passenger");
        assert_eq!(cfg.model_path, PathBuf::from("models/passenger_model.json"));
        assert_eq!(cfg.training_data, Some(PathBuf::from("data/titanic.csv")));
        assert_eq!(cfg.meta_style, MetaStyle::Metadata);
        assert!(cfg.workers > 0);
    }

    #[test]
    fn dwelling_has_no_default_training_data() {
        let cfg = config(&[("SCHEMA", "dwelling"), ("MODEL_PATH", "models/house.onnx")]).unwrap();
        assert_eq!(cfg.schema.name, "dwelling");
        assert_eq!(cfg.model_path, PathBuf::from("models/house.onnx"));
        assert_eq!(cfg.training_data, None);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("WORKERS", "3"),
            ("META_STYLE", "analysis"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.meta_style, MetaStyle::Analysis);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("WORKERS", "0")]).is_err());
        assert!(config(&[("SCHEMA", "wine")]).is_err());
        assert!(config(&[("META_STYLE", "yaml")]).is_err());
    }
}
