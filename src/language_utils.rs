use anyhow::{Result, anyhow};
use isolang::Language;

/// Locale utilities for the site's `language_REGION` codes
///
/// This module validates locale codes such as `en_US` or `zh_CN` by checking
/// the language part against ISO 639-1 and the region part for shape.
/// A parsed locale code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// ISO 639-1 (2-letter) language code, lowercase
    pub language: String,
    /// Region code, uppercase, if present
    pub region: Option<String>,
}

/// Split a locale code into language and region parts
pub fn parse_locale(code: &str) -> Result<Locale> {
    let trimmed = code.trim();
    let mut parts = trimmed.splitn(2, ['_', '-']);
    let language = parts.next().unwrap_or_default().to_lowercase();
    let region = parts.next().map(|r| r.to_uppercase());

    if language.len() != 2 || Language::from_639_1(&language).is_none() {
        return Err(anyhow!("Invalid language in locale: {}", code));
    }

    if let Some(region) = &region {
        if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(anyhow!("Invalid region in locale: {}", code));
        }
    }

    Ok(Locale { language, region })
}

/// Validate a locale code
pub fn validate_locale(code: &str) -> Result<()> {
    parse_locale(code).map(|_| ())
}

/// Get the English language name for a locale code
pub fn get_language_name(code: &str) -> Result<String> {
    let locale = parse_locale(code)?;
    Language::from_639_1(&locale.language)
        .map(|lang| lang.to_name().to_string())
        .ok_or_else(|| anyhow!("Unknown language: {}", code))
}

/// Check whether two locale codes name the same language
pub fn locales_share_language(code1: &str, code2: &str) -> bool {
    match (parse_locale(code1), parse_locale(code2)) {
        (Ok(a), Ok(b)) => a.language == b.language,
        _ => false,
    }
}
