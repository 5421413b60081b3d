//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::domain(
            domain,
            format!("{} cannot be empty", field_name),
        ));
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::domain(
            domain,
            format!("{} must be greater than 0, got {}", field_name, value),
        ));
    }
    Ok(())
}

/// Validate a finite, non-negative float
pub fn validate_non_negative(value: f64, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::domain(
            domain,
            format!("{} must be a non-negative number, got {}", field_name, value),
        ));
    }
    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::domain(
            domain,
            format!("{} cannot be empty", field_name),
        ));
    }

    url::Url::parse(url).map_err(|e| {
        ConfigError::domain(
            domain,
            format!("{} has invalid URL format: {}", field_name, e),
        )
    })?;

    Ok(())
}

/// Validate a URL when one is configured
pub fn validate_optional_url(url: Option<&str>, field_name: &str, domain: &str) -> ConfigResult<()> {
    match url {
        Some(url) => validate_url(url, field_name, domain),
        None => Ok(()),
    }
}

/// Validate a port number
pub fn validate_port_range(port: u16, field_name: &str, domain: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::domain(domain, format!("{} cannot be 0", field_name)));
    }

    // Port 1-1023 are typically reserved for system services
    if port <= 1023 {
        log::warn!("{} port {} is in the reserved range (1-1023)", field_name, port);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_string() {
        assert!(validate_required_string("localhost", "host", "server.app").is_ok());
        assert!(validate_required_string("", "host", "server.app").is_err());
        assert!(validate_required_string("   ", "host", "server.app").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u32, "top_n", "dataset.diffexp").is_ok());
        assert!(validate_positive(0u32, "top_n", "dataset.diffexp").is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative(0.0, "lfc_cutoff", "dataset.diffexp").is_ok());
        assert!(validate_non_negative(-0.1, "lfc_cutoff", "dataset.diffexp").is_err());
        assert!(validate_non_negative(f64::NAN, "lfc_cutoff", "dataset.diffexp").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.org/tos", "about_legal_tos", "dataset.app").is_ok());
        assert!(validate_url("not a url", "about_legal_tos", "dataset.app").is_err());
        assert!(validate_optional_url(None, "about_legal_tos", "dataset.app").is_ok());
    }

    #[test]
    fn test_validate_port_range() {
        assert!(validate_port_range(5005, "port", "server.app").is_ok());
        assert!(validate_port_range(80, "port", "server.app").is_ok());
        assert!(validate_port_range(0, "port", "server.app").is_err());
    }

    #[test]
    fn test_domain_error_message() {
        let err = validate_positive(0, "max_categories", "dataset.presentation").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Domain configuration error in dataset.presentation: max_categories must be greater than 0, got 0"
        );
    }
}
