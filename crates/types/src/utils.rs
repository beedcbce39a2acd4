//! Utility functions and helpers

use std::path::Path;
use std::{fs, io};

/// Check whether a string is a canonical hyphenated UUID, the form UpCloud
/// uses for storage identifiers
pub fn is_valid_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::parse_str(s).is_ok()
}

/// Check whether a zone identifier looks like `fi-hel1` or `us-nyc1`
pub fn is_valid_zone(zone: &str) -> bool {
    let Some((country, location)) = zone.split_once('-') else {
        return false;
    };

    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_lowercase()) {
        return false;
    }

    let city_len = location.chars().take_while(|c| c.is_ascii_lowercase()).count();
    let number = &location[city_len..];

    city_len >= 3 && !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
}

/// Sanitize string for logging (remove sensitive data)
pub fn sanitize_for_logging(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let prefix: String = s.chars().take(2).collect();
    if s.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}

/// Whether `path` is known not to exist. Other stat failures, such as a
/// permission error, do not count as missing.
pub fn is_missing_file<P: AsRef<Path>>(path: P) -> bool {
    matches!(fs::metadata(path), Err(e) if e.kind() == io::ErrorKind::NotFound)
}

/// Split a `key=value` pair, as given on the command line for user variables
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", s));
    }

    Ok((key.to_string(), value.to_string()))
}
