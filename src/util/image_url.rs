use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons an article image URL is unusable for the byte feed.
#[derive(Error, Debug)]
pub enum ImageUrlError {
    /// The string is empty or not an absolute URL (relative paths land here).
    #[error("Invalid image URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("Image URL has no host")]
    MissingHost,
    /// The URL points at localhost or a private network address.
    #[error("Non-public image host: {0}")]
    NonPublicHost(String),
}

/// Validates an article image URL.
///
/// Accepts absolute `http`/`https` URLs whose host is a public name or
/// address. Relative paths, data URIs and private-network hosts are
/// rejected, since the device could never load them from a CDN.
///
/// # Examples
///
/// ```
/// use newsbyte::util::validate_image_url;
///
/// assert!(validate_image_url("https://cdn.example.com/a.jpg").is_ok());
/// assert!(validate_image_url("/uploads/a.jpg").is_err());
/// assert!(validate_image_url("data:image/png;base64,AAAA").is_err());
/// ```
pub fn validate_image_url(url_str: &str) -> Result<Url, ImageUrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(ImageUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(ImageUrlError::MissingHost)?;
    if host.is_empty() {
        return Err(ImageUrlError::MissingHost);
    }
    if host == "localhost" {
        return Err(ImageUrlError::NonPublicHost(host.to_owned()));
    }

    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if is_non_public_ip(&ip) {
            return Err(ImageUrlError::NonPublicHost(ip.to_string()));
        }
    }

    Ok(url)
}

/// Convenience wrapper for filters: true when [`validate_image_url`] accepts
/// the value.
pub fn is_absolute_image_url(url_str: &str) -> bool {
    validate_image_url(url_str).is_ok()
}

fn is_non_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
