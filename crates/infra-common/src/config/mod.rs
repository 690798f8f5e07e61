//! Layered configuration loading.
//!
//! Sources are merged in order: compiled defaults (the `Default` impl of the
//! target type via `#[serde(default)]`), an optional TOML file, then
//! environment variables with the given prefix. Nested keys in the
//! environment use a double underscore, e.g. `VRS_TIMERS__PLEASE_WAIT_SECS=8`.

use crate::errors::types::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Environment prefix used by the VRS binaries
pub const DEFAULT_ENV_PREFIX: &str = "VRS";

/// Load `T` from an optional TOML file plus `PREFIX_*` environment variables
pub fn load_config<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::config(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .separator("__")
            .try_parsing(true),
    );

    let settings = builder.build()?;
    let loaded = settings.try_deserialize::<T>()?;
    tracing::debug!(
        "Loaded configuration (file: {}, env prefix: {})",
        path.map(|p| p.display().to_string()).unwrap_or_else(|| "<none>".into()),
        env_prefix
    );
    Ok(loaded)
}

/// Parse `T` from an inline TOML document
pub fn from_toml_str<T: DeserializeOwned>(document: &str) -> Result<T> {
    Ok(toml::from_str(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        limits: Limits,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Limits {
        max_calls: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self { name: "default".into(), limits: Limits::default() }
        }
    }

    impl Default for Limits {
        fn default() -> Self {
            Self { max_calls: 2 }
        }
    }

    #[test]
    fn inline_toml_fills_missing_fields_with_defaults() {
        let parsed: Sample = from_toml_str("name = \"lobby\"").unwrap();
        assert_eq!(parsed.name, "lobby");
        assert_eq!(parsed.limits.max_calls, 2);
    }

    #[test]
    fn malformed_toml_is_a_serialization_error() {
        let parsed: Result<Sample> = from_toml_str("name = ");
        assert!(matches!(parsed, Err(Error::Serialization(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let parsed: Result<Sample> = load_config(Some(Path::new("/nonexistent/vrs.toml")), "VRSTEST_MISSING");
        assert!(matches!(parsed, Err(Error::Config(_))));
    }

    #[test]
    fn file_values_are_loaded() {
        let dir = std::env::temp_dir().join(format!("vrs-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "name = \"desk\"\n[limits]\nmax_calls = 5").unwrap();

        let parsed: Sample = load_config(Some(&path), "VRSTEST_FILE").unwrap();
        assert_eq!(parsed, Sample { name: "desk".into(), limits: Limits { max_calls: 5 } });

        let _ = std::fs::remove_dir_all(&dir);
    }
}
