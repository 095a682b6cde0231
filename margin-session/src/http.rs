//! Response headers derived from session parameters

use margin_core::SessionConfig;

/// Render the `Set-Cookie` value that delivers a session id
pub fn cookie_header(params: &SessionConfig, id: &str) -> String {
    let mut cookie = format!("{}={}; Path={}", params.name, id, params.path);

    if !params.domain.is_empty() {
        cookie.push_str(&format!("; Domain={}", params.domain));
    }
    if params.lifetime_secs > 0 {
        cookie.push_str(&format!("; Max-Age={}", params.lifetime_secs));
    }
    if params.secure {
        cookie.push_str("; Secure");
    }
    if params.http_only {
        cookie.push_str("; HttpOnly");
    }

    cookie
}

/// Caching headers for a cache limiter name
///
/// Unknown limiters and the empty string produce no headers.
pub fn cache_limiter_headers(limiter: &str, max_age_secs: u64) -> Vec<(&'static str, String)> {
    const PAST: &str = "Thu, 19 Nov 1981 08:52:00 GMT";

    match limiter {
        "nocache" => vec![
            ("Expires", PAST.to_string()),
            (
                "Cache-Control",
                "no-store, no-cache, must-revalidate".to_string(),
            ),
            ("Pragma", "no-cache".to_string()),
        ],
        "private" => vec![
            ("Expires", PAST.to_string()),
            (
                "Cache-Control",
                format!("private, max-age={}", max_age_secs),
            ),
        ],
        "private_no_expire" => vec![(
            "Cache-Control",
            format!("private, max-age={}", max_age_secs),
        )],
        "public" => vec![(
            "Cache-Control",
            format!("public, max-age={}", max_age_secs),
        )],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cookie() {
        let params = SessionConfig::default();
        assert_eq!(
            cookie_header(&params, "abc"),
            "Margin=abc; Path=/; Max-Age=86400; HttpOnly"
        );
    }

    #[test]
    fn test_secure_cookie_with_domain() {
        let params = SessionConfig {
            domain: "example.org".to_string(),
            secure: true,
            http_only: false,
            lifetime_secs: 0,
            ..SessionConfig::default()
        };
        assert_eq!(
            cookie_header(&params, "abc"),
            "Margin=abc; Path=/; Domain=example.org; Secure"
        );
    }

    #[test]
    fn test_cache_limiters() {
        let nocache = cache_limiter_headers("nocache", 60);
        assert!(nocache.iter().any(|(name, _)| *name == "Pragma"));
        assert_eq!(
            cache_limiter_headers("public", 60),
            vec![("Cache-Control", "public, max-age=60".to_string())]
        );
        assert!(cache_limiter_headers("", 60).is_empty());
    }
}
