//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and address formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("discovery.path '{0}' must start with '/'")]
    DiscoveryPath(String),

    #[error("discovery.base_path '{0}' must start with '/'")]
    BasePath(String),

    #[error("streaming.control_thread_name must not be empty")]
    ThreadName,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if !config.discovery.path.starts_with('/') {
        errors.push(ValidationError::DiscoveryPath(config.discovery.path.clone()));
    }
    if !config.discovery.base_path.starts_with('/') {
        errors.push(ValidationError::BasePath(config.discovery.base_path.clone()));
    }
    if config.streaming.control_thread_name.trim().is_empty() {
        errors.push(ValidationError::ThreadName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
