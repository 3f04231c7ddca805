//! Configuration loading for the nearby CLI
//!
//! The file format is the TOML rendering of [`NearbyConfig`]; every section
//! and field is optional and falls back to its default.

use std::path::Path;

use anyhow::Context;
use nearby_core::NearbyConfig;
use tracing::info;

use crate::error::Result;

/// Load and validate configuration from a TOML file
pub fn load_from_file(path: &Path) -> Result<NearbyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = parse(&text)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Use the file when given, defaults otherwise
pub fn load(path: Option<&Path>) -> Result<NearbyConfig> {
    match path {
        Some(path) => load_from_file(path),
        None => {
            info!("Using default configuration");
            Ok(NearbyConfig::default())
        }
    }
}

pub fn parse(text: &str) -> Result<NearbyConfig> {
    let config: NearbyConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn to_toml(config: &NearbyConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use nearby_core::{ConnectionStrategy, ConnectionType};

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = parse(
            r#"
            [session]
            nickname = "Kitchen"
            strategy = "P2P_CLUSTER"

            [policy]
            auto_browse = true
            "#,
        )
        .unwrap();

        assert_eq!(config.session.nickname, "Kitchen");
        assert_eq!(config.session.strategy, ConnectionStrategy::Cluster);
        assert_eq!(config.session.connection_type, ConnectionType::Disruptive);
        assert!(config.policy.auto_browse);
        assert!(!config.policy.auto_advertise);
        assert_eq!(config.channels, NearbyConfig::default().channels);
    }

    #[test]
    fn test_rendered_defaults_parse_back() {
        let rendered = to_toml(&NearbyConfig::default()).unwrap();
        assert!(rendered.contains("[session]"));
        assert_eq!(parse(&rendered).unwrap(), NearbyConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = parse("[session]\nnickname = \"\"\n").unwrap_err();
        assert!(matches!(err, CliError::Nearby(_)));

        let err = parse("[session]\nstrategy = \"P2P_MESH\"\n").unwrap_err();
        assert!(matches!(err, CliError::TomlParsing(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load(Some(Path::new("/nonexistent/nearby.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(message) if message.contains("reading")));
    }
}
