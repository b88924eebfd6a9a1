//! Registrable base-domain computation.

/// Multi-label public suffixes the registry knows about. Not a full
/// public suffix list - a small, hand-maintained set covering the
/// vendors this proxy actually matches against (see DESIGN.md's Open
/// Question resolution).
const MULTI_LABEL_SUFFIXES: &[&str] = &["co.uk", "com.au", "co.nz", "co.jp", "com.br"];

/// Computes the registrable base domain for `host`, per spec: IPv4
/// literals pass through unchanged; hosts whose last two labels match
/// a known multi-label suffix keep three labels; everything else
/// keeps two.
pub fn base_domain(host: &str) -> String {
    let host = host.to_lowercase();

    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) && labels.len() >= 3 {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_label_host_is_unchanged() {
        assert_eq!(base_domain("api.segment.io"), "segment.io");
    }

    #[test]
    fn subdomain_collapses_to_base() {
        assert_eq!(base_domain("www.app.example.com"), "example.com");
    }

    #[test]
    fn multi_label_suffix_keeps_three_labels() {
        assert_eq!(base_domain("shop.example.co.uk"), "example.co.uk");
        assert_eq!(base_domain("example.com.au"), "example.com.au");
    }

    #[test]
    fn ipv4_literal_passes_through() {
        assert_eq!(base_domain("192.168.1.1"), "192.168.1.1");
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(base_domain("API.SEGMENT.IO"), "segment.io");
    }

    #[test]
    fn base_domain_is_idempotent() {
        let once = base_domain("api.segment.io");
        assert_eq!(base_domain(&once), once);
    }
}
