use super::models::Config;
use thiserror::Error;

const MAX_PAYLOAD_BYTES: u64 = 5 * 1024 * 1024;
const MAX_BATCH_URLS: usize = 100;
const MAX_PLAYLIST_ENTRIES: usize = 500;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_payload_bytes ({actual}) exceeds limit of 5MB ({limit})")]
    PayloadSizeExceedsLimit { actual: u64, limit: u64 },

    #[error("{field} must be between 1 and {max}, got {value}")]
    LimitOutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },

    #[error("downloads.stream_interval_ms must be positive")]
    InvalidStreamInterval,

    #[error("engine.binary must not be empty")]
    MissingEngineBinary,

    #[error("engine.socket_timeout_secs must be positive")]
    InvalidSocketTimeout,

    #[error("telemetry.log_filter must not be empty")]
    EmptyLogFilter,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_api_limits(config)?;
    validate_downloads(config)?;
    validate_engine(config)?;

    if config.telemetry.log_filter.trim().is_empty() {
        return Err(ValidationError::EmptyLogFilter);
    }

    Ok(())
}

fn validate_api_limits(config: &Config) -> Result<(), ValidationError> {
    let api = &config.server.api;

    if api.max_payload_bytes.as_u64() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadSizeExceedsLimit {
            actual: api.max_payload_bytes.as_u64(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    check_range("server.api.max_batch_urls", api.max_batch_urls, MAX_BATCH_URLS)?;
    check_range(
        "server.api.max_playlist_entries",
        api.max_playlist_entries,
        MAX_PLAYLIST_ENTRIES,
    )?;

    Ok(())
}

fn check_range(field: &'static str, value: usize, max: usize) -> Result<(), ValidationError> {
    if value == 0 || value > max {
        return Err(ValidationError::LimitOutOfRange { field, value, max });
    }
    Ok(())
}

fn validate_downloads(config: &Config) -> Result<(), ValidationError> {
    if config.downloads.stream_interval_ms == 0 {
        return Err(ValidationError::InvalidStreamInterval);
    }
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.binary.trim().is_empty() {
        return Err(ValidationError::MissingEngineBinary);
    }
    if config.engine.socket_timeout_secs == 0 {
        return Err(ValidationError::InvalidSocketTimeout);
    }
    Ok(())
}
