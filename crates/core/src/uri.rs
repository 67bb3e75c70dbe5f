#![forbid(unsafe_code)]

use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UriError {
    #[error("invalid URI: {0}")]
    Invalid(String),
    #[error("URI has no host: {0}")]
    MissingHost(String),
}

/// Normalise a URI for comparison: lowercase scheme and host, no default
/// port, no trailing slash on paths except the root. Non-hierarchical URIs
/// (`did:key:...`, URNs) are returned unchanged.
pub fn normalize_uri(raw: &str) -> Result<String, UriError> {
    let url = Url::parse(raw).map_err(|_| UriError::Invalid(raw.to_owned()))?;
    if url.cannot_be_a_base() {
        return Ok(raw.to_owned());
    }

    let host = url
        .host_str()
        .ok_or_else(|| UriError::MissingHost(raw.to_owned()))?;
    let mut out = format!("{}://{}", url.scheme(), host);
    // Url::port() is None when the port is the scheme default.
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(strip_trailing_slash(url.path()));
    Ok(out)
}

/// Audience-containment rule for access tokens: the audience and the
/// requested resource must share an origin, and the resource path must equal
/// the audience path or be a descendant of it.
pub fn audience_contains(aud: &str, resource: &str) -> Result<bool, UriError> {
    let aud = parse_hierarchical(aud)?;
    let resource = parse_hierarchical(resource)?;

    if !same_origin(&aud, &resource) {
        return Ok(false);
    }

    let aud_path = strip_trailing_slash(aud.path());
    let resource_path = strip_trailing_slash(resource.path());
    if aud_path == "/" {
        return Ok(true);
    }
    Ok(resource_path == aud_path || resource_path.starts_with(&format!("{aud_path}/")))
}

fn parse_hierarchical(raw: &str) -> Result<Url, UriError> {
    let url = Url::parse(raw).map_err(|_| UriError::Invalid(raw.to_owned()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(UriError::MissingHost(raw.to_owned()));
    }
    Ok(url)
}

fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}

fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
