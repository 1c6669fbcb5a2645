//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Apply command-line overrides
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Overrides are validated together with the file

use std::path::Path;

use crate::config::{load_config, validate_config, ConfigError, RelayConfig};

/// Resolve the effective configuration.
///
/// Without a path the defaults are used. `bind` replaces the listener address.
pub fn resolve_config(path: Option<&Path>, bind: Option<&str>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    if let Some(bind) = bind {
        config.listener.bind_address = bind.to_string();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_with_override() {
        let config = resolve_config(None, Some("127.0.0.1:1234")).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:1234");
    }

    #[test]
    fn test_bad_override_rejected() {
        assert!(matches!(
            resolve_config(None, Some("not-an-address")),
            Err(ConfigError::Validation(_))
        ));
    }
}
