//! Post-login redirect validation.
//!
//! The login page round-trips a destination URL through an untrusted client
//! (query parameter, cookie, client-side redirect). Everything here exists
//! to keep that round trip from becoming an open-redirect primitive.

use url::Url;

/// Check whether a user-supplied redirect URL is safe to honor.
///
/// Rules, first match wins:
/// 1. Empty or unparseable URLs are unsafe. A purely relative path fails
///    absolute-URL parsing and is therefore unsafe by default.
/// 2. Only `http` and `https` schemes are considered.
/// 3. A hostname equal to the public URL's hostname is safe (same-origin
///    exemption, case-insensitive).
/// 4. Otherwise the hostname must match the allow-list: exact match, or a
///    true subdomain (`sub.example.com` matches `example.com`, while
///    `evilexample.com` does not).
pub fn is_allowed_redirect(
    url: &str,
    allowed_domains: Option<&str>,
    public_url: Option<&str>,
) -> bool {
    if url.is_empty() {
        return false;
    }

    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let Some(hostname) = parsed.host_str() else {
        return false;
    };
    let hostname = hostname.to_ascii_lowercase();

    // Same-origin exemption. An unparseable public URL falls through to the
    // allow-list check.
    if let Some(public_url) = public_url
        && let Ok(public_parsed) = Url::parse(public_url)
        && let Some(public_host) = public_parsed.host_str()
        && hostname == public_host.to_ascii_lowercase()
    {
        return true;
    }

    if let Some(allowed_domains) = allowed_domains {
        return allowed_domains
            .split(',')
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .any(|domain| {
                hostname == domain || hostname.ends_with(&format!(".{domain}"))
            });
    }

    false
}

/// Validate a redirect URL, returning `default` when it is absent or unsafe.
pub fn safe_redirect_url(
    url: Option<&str>,
    allowed_domains: Option<&str>,
    public_url: Option<&str>,
    default: &str,
) -> String {
    match url {
        Some(url) if is_allowed_redirect(url, allowed_domains, public_url) => url.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("https://sub.example.com/x", true)]
    #[case("https://example.com/", true)]
    #[case("https://EXAMPLE.COM/", true)]
    #[case("http://example.com/path?q=1", true)]
    #[case("https://evilexample.com/", false)]
    #[case("https://evil.com/", false)]
    #[case("javascript:alert(1)", false)]
    #[case("file:///etc/passwd", false)]
    #[case("ftp://example.com/", false)]
    #[case("/dashboard", false)]
    #[case("//evil.com/x", false)]
    #[case("", false)]
    #[case("not a url", false)]
    fn allow_list_rules(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_allowed_redirect(url, Some("example.com"), None), expected);
    }

    #[test]
    fn no_configuration_rejects_everything() {
        assert!(!is_allowed_redirect("https://example.com/", None, None));
    }

    #[test]
    fn same_origin_exemption() {
        assert!(is_allowed_redirect(
            "https://auth.mysite.io/after-login",
            None,
            Some("https://auth.mysite.io"),
        ));
        // Different host: exemption does not apply.
        assert!(!is_allowed_redirect(
            "https://other.mysite.io/",
            None,
            Some("https://auth.mysite.io"),
        ));
    }

    #[test]
    fn same_origin_is_case_insensitive() {
        assert!(is_allowed_redirect(
            "https://AUTH.MYSITE.IO/x",
            None,
            Some("https://auth.mysite.io"),
        ));
    }

    #[test]
    fn invalid_public_url_falls_through_to_allow_list() {
        assert!(is_allowed_redirect(
            "https://example.com/",
            Some("example.com"),
            Some("not a url"),
        ));
    }

    #[test]
    fn allow_list_entries_are_trimmed_and_empties_dropped() {
        assert!(is_allowed_redirect(
            "https://b.org/",
            Some(" a.com , , b.org "),
            None,
        ));
    }

    #[test]
    fn sanitize_returns_input_when_safe() {
        assert_eq!(
            safe_redirect_url(Some("https://sub.example.com/x"), Some("example.com"), None, "/"),
            "https://sub.example.com/x"
        );
    }

    #[test]
    fn sanitize_falls_back_to_default() {
        assert_eq!(safe_redirect_url(None, Some("example.com"), None, "/"), "/");
        assert_eq!(
            safe_redirect_url(Some("https://evil.com/"), Some("example.com"), None, "/home"),
            "/home"
        );
    }
}
