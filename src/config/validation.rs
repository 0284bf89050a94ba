//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses and origins parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let prefix = &config.proxy.prefix;
    if !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.len() < 2 {
        errors.push(ValidationError::new(
            "proxy.prefix",
            format!("'{}' must start and end with '/' and name a segment", prefix),
        ));
    } else if matches!(prefix.as_str(), "/download/" | "/healthz/") {
        errors.push(ValidationError::new(
            "proxy.prefix",
            format!("'{}' collides with a built-in route", prefix),
        ));
    }

    if let Some(origin) = &config.proxy.public_origin {
        match url::Url::parse(origin) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(
                "proxy.public_origin",
                format!("'{}' is not an http(s) origin", origin),
            )),
        }
    }

    for (field, scheme) in [
        ("proxy.public_scheme", &config.proxy.public_scheme),
        ("proxy.default_scheme", &config.proxy.default_scheme),
    ] {
        if !matches!(scheme.as_str(), "http" | "https") {
            errors.push(ValidationError::new(field, format!("'{}' must be http or https", scheme)));
        }
    }

    if config.proxy.max_rewrite_bytes == 0 {
        errors.push(ValidationError::new("proxy.max_rewrite_bytes", "must be greater than 0"));
    }

    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be greater than 0"));
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.request_timeout_secs", "must be greater than 0"));
    }

    if config.safety.blocked_hosts.iter().any(|h| h.trim().is_empty()) {
        // An empty entry is a prefix of every host.
        errors.push(ValidationError::new("safety.blocked_hosts", "entries must not be empty"));
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0 when enabled"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
