// Endpoint address normalization

use url::Url;

/// Upgrade an insecure scheme to its secure counterpart when the hosting
/// origin is itself secure (`ws` -> `wss`, `http` -> `https`).
///
/// Addresses that do not parse as URLs are returned unchanged; they fail at
/// handshake time and surface as a connection error instead.
pub fn resolve_address(address: &str, secure_origin: bool) -> String {
    let trimmed = address.trim();
    if !secure_origin {
        return trimmed.to_string();
    }

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    let upgraded = match url.scheme() {
        "ws" => "wss",
        "http" => "https",
        _ => return trimmed.to_string(),
    };

    if url.set_scheme(upgraded).is_err() {
        return trimmed.to_string();
    }

    // Keep the caller's spelling when the input had no path; Url always
    // normalizes an empty path to "/".
    let resolved = url.to_string();
    if !trimmed.ends_with('/') && url.path() == "/" && url.query().is_none() {
        resolved.trim_end_matches('/').to_string()
    } else {
        resolved
    }
}
