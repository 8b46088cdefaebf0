//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. All problems are
//! collected before returning so a bad file is reported in one pass.

use std::fmt;
use std::net::ToSocketAddrs;

use crate::config::schema::SiteConfig;
use crate::observability::logging::parse_level;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SiteConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.as_str().to_socket_addrs() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("cannot resolve {:?}: {}", config.listener.bind_address, e),
        ));
    }

    if let Err(e) = parse_level(&config.log.level) {
        errors.push(ValidationError::new("log.level", e.to_string()));
    }

    if config.log.send_to_file && config.log.file_path.trim().is_empty() {
        errors.push(ValidationError::new(
            "log.file_path",
            "required when send_to_file is set",
        ));
    }

    if config.access_log.enabled && config.access_log.file_path.trim().is_empty() {
        errors.push(ValidationError::new(
            "access_log.file_path",
            "required when the access log is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SiteConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = SiteConfig::default();
        config.listener.bind_address = "localhost".into();
        config.log.level = "chatty".into();
        config.log.send_to_file = true;
        config.log.file_path = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "log.level",
                "log.file_path",
            ]
        );
    }

    #[test]
    fn test_bind_address_accepts_host_names() {
        for address in ["0.0.0.0:8080", "127.0.0.1:0", "[::1]:9000", "localhost:8080"] {
            let mut config = SiteConfig::default();
            config.listener.bind_address = address.into();
            assert!(validate_config(&config).is_ok(), "{address} rejected");
        }

        let mut config = SiteConfig::default();
        config.listener.bind_address = "8080".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_path_only_checked_when_enabled() {
        let mut config = SiteConfig::default();
        config.log.file_path.clear();
        config.access_log.enabled = false;
        config.access_log.file_path.clear();
        assert!(validate_config(&config).is_ok());
    }
}
