use thiserror::Error;

use crate::jobs::JobOptions;

pub const AUDIO_FORMATS: &[&str] = &["mp3", "m4a", "aac", "opus", "flac", "wav", "vorbis"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("URL is required")]
    MissingUrl,
    #[error("URL must be an http/https URL: {0}")]
    InvalidUrl(String),
    #[error("URLs array is required")]
    MissingUrls,
    #[error("quality '{0}' must be 1-16 alphanumeric characters")]
    InvalidQuality(String),
    #[error("audio_format '{0}' is not supported")]
    UnsupportedAudioFormat(String),
    #[error("sub_lang '{0}' must be 1-16 characters of letters, digits or '-'")]
    InvalidSubtitleLanguage(String),
}

pub fn validate_url(url: &str) -> Result<(), RequestValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RequestValidationError::MissingUrl);
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| RequestValidationError::InvalidUrl(url.to_string()))?;
    if rest.is_empty() || rest.starts_with('/') || url.chars().any(char::is_whitespace) {
        return Err(RequestValidationError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Every non-blank entry must be a valid URL; blank entries are skipped later.
pub fn validate_urls(urls: &[String]) -> Result<(), RequestValidationError> {
    if urls.is_empty() {
        return Err(RequestValidationError::MissingUrls);
    }
    urls.iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .try_for_each(validate_url)
}

pub fn validate_options(options: &JobOptions) -> Result<(), RequestValidationError> {
    let quality = &options.quality;
    if quality.is_empty() || quality.len() > 16 || !quality.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(RequestValidationError::InvalidQuality(quality.clone()));
    }

    if !AUDIO_FORMATS.contains(&options.audio_format.as_str()) {
        return Err(RequestValidationError::UnsupportedAudioFormat(
            options.audio_format.clone(),
        ));
    }

    let lang = &options.subtitles.language;
    if lang.is_empty()
        || lang.len() > 16
        || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(RequestValidationError::InvalidSubtitleLanguage(lang.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_accepts_http_and_https() {
        assert!(validate_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(validate_url("http://example.com/video").is_ok());
        assert!(validate_url("  https://example.com/padded  ").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_other_schemes() {
        assert_eq!(validate_url(""), Err(RequestValidationError::MissingUrl));
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(RequestValidationError::InvalidUrl(_))
        ));
        assert!(validate_url("https://").is_err());
        assert!(validate_url("https://exa mple.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_validate_urls_skips_blank_entries() {
        let urls = vec!["https://example.com/a".to_string(), "  ".to_string()];
        assert!(validate_urls(&urls).is_ok());
        assert_eq!(validate_urls(&[]), Err(RequestValidationError::MissingUrls));

        let urls = vec!["https://example.com/a".to_string(), "nope".to_string()];
        assert!(validate_urls(&urls).is_err());
    }

    #[test]
    fn test_validate_options_checks_tokens() {
        assert!(validate_options(&JobOptions::default()).is_ok());

        let mut options = JobOptions::default();
        options.quality = "720p; rm".into();
        assert!(matches!(
            validate_options(&options),
            Err(RequestValidationError::InvalidQuality(_))
        ));

        let mut options = JobOptions::default();
        options.audio_format = "exe".into();
        assert!(matches!(
            validate_options(&options),
            Err(RequestValidationError::UnsupportedAudioFormat(_))
        ));

        let mut options = JobOptions::default();
        options.subtitles.language = "pt-BR".into();
        assert!(validate_options(&options).is_ok());
        options.subtitles.language = "en,--exec".into();
        assert!(validate_options(&options).is_err());
    }
}
