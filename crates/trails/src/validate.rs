use url::Url;

use crate::config::NamePolicy;
use crate::error::ValidationError;

pub const MAX_TRAIL_NAME_CHARS: usize = 100;

/// Returns `true` when the trimmed name holds between 1 and 100 characters
/// and no control characters, so it always fits on one markdown line.
/// 名稱去除前後空白後長度介於 1 到 100 字元且不含控制字元時回傳 `true`。
pub fn validate_trail_name(name: &str) -> bool {
    let count = name.trim().chars().count();
    (1..=MAX_TRAIL_NAME_CHARS).contains(&count) && !name.chars().any(char::is_control)
}

/// Replaces control characters (line breaks, tabs) with spaces.
/// 將換行與定位等控制字元替換為空白。
pub fn single_line(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

/// `true` when `candidate` parses as an absolute URL exactly as written.
/// The URL parser silently drops embedded tabs and newlines, so those are
/// refused up front.
pub(crate) fn is_absolute_url(candidate: &str) -> bool {
    !candidate.chars().any(char::is_control) && Url::parse(candidate).is_ok()
}

/// Resolves the name to store for a new trail under the given policy.
/// 依名稱規則決定新路徑實際使用的名稱。
pub fn normalize_trail_name(
    name: Option<&str>,
    policy: NamePolicy,
    default_name: &str,
) -> Result<String, ValidationError> {
    match name {
        None => Ok(default_name.to_string()),
        Some(candidate) if validate_trail_name(candidate) => Ok(candidate.to_string()),
        Some(candidate) => match policy {
            NamePolicy::Fallback => Ok(default_name.to_string()),
            NamePolicy::Reject => Err(ValidationError::InvalidName(candidate.to_string())),
        },
    }
}

/// Accepts only absolute `http`/`https` URLs.
pub fn validate_url(candidate: &str) -> bool {
    if candidate.chars().any(char::is_control) {
        return false;
    }
    Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Turns address-bar input into a URL: explicit http(s) URLs are parsed as-is,
/// bare hosts such as `example.com/docs` get an `https://` prefix.
/// 將網址列輸入轉為 URL；無協定的主機名稱會補上 `https://`。
pub fn parse_address(input: &str) -> Option<Url> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        return Url::parse(input).ok();
    }
    if input.contains('.') && !input.contains(' ') {
        return Url::parse(&format!("https://{input}")).ok();
    }
    None
}

/// Short display form of a URL for sidebar rows.
pub fn abbreviate_url(url: &Url) -> String {
    let Some(host) = url.host_str() else {
        return url.as_str().to_string();
    };
    let path = url.path();
    if path.is_empty() || path == "/" {
        return host.to_string();
    }
    let components: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    match components.last() {
        Some(last) if components.len() > 2 => format!("{host}/…/{last}"),
        _ => format!("{host}{path}"),
    }
}
