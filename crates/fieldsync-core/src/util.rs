//! Small helpers shared by the config, gateway and store layers.

/// Normalize optional text by trimming whitespace and removing empties.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Validate and normalize an HTTP base URL (no trailing slash).
pub fn normalize_http_base_url(raw: &str, field: &str) -> Result<String, String> {
    let value = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| format!("{field} must not be empty"))?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(format!("{field} must include http:// or https://"))
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current time as an RFC 3339 string (queue entry timestamps).
pub fn rfc3339_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
