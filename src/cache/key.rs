//! Cache fingerprint generation.

use url::Url;

/// Fingerprint for `url`: host (plus explicit port) and path, optionally
/// followed by the raw query string. The scheme is not part of the key.
pub fn fingerprint(url: &Url, include_query: bool) -> String {
    let mut fp = String::with_capacity(url.as_str().len());
    if let Some(host) = url.host_str() {
        fp.push_str(host);
    }
    if let Some(port) = url.port() {
        fp.push(':');
        fp.push_str(&port.to_string());
    }
    fp.push_str(url.path());
    if include_query {
        if let Some(q) = url.query().filter(|q| !q.is_empty()) {
            fp.push('?');
            fp.push_str(q);
        }
    }
    fp
}
