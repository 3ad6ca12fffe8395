//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (throttle rate, token budget, log level)
//! - Check that referenced certificate bundles exist
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientSettings → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ClientSettings;

/// Shortest accepted interval between throttled admissions.
pub const MIN_THROTTLE_RATE: Duration = Duration::from_secs(1);

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("throttle rate {0:?} is below the minimum of {min:?}", min = MIN_THROTTLE_RATE)]
    InvalidThrottleRate(Duration),

    #[error("throttle total_tokens must be at least 1")]
    ZeroTokenBudget,

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),

    #[error("certificate bundle {0:?} does not exist")]
    MissingCertificate(PathBuf),
}

/// Check a throttle interval on its own; used by transport construction.
pub fn validate_throttle_rate(rate: Duration) -> Result<(), ValidationError> {
    if rate < MIN_THROTTLE_RATE {
        return Err(ValidationError::InvalidThrottleRate(rate));
    }
    Ok(())
}

pub fn validate_config(config: &ClientSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(throttle) = &config.throttle {
        if let Err(err) = validate_throttle_rate(Duration::from_millis(throttle.rate_ms)) {
            errors.push(err);
        }
        if throttle.total_tokens == 0 {
            errors.push(ValidationError::ZeroTokenBudget);
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    for path in &config.tls.extra_root_certs {
        if !path.exists() {
            errors.push(ValidationError::MissingCertificate(path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
