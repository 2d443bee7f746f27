use http::HeaderMap;
use http::header::SET_COOKIE;

/// A cookie sent with a request or captured from `Set-Cookie`.
///
/// Attributes are kept for inspection only; the request side sends `name=value`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Parses one `Set-Cookie` header value. Returns `None` when the name/value
    /// pair is missing or malformed.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let parsed = ::cookie::Cookie::parse(header).ok()?;
        Some(Self {
            name: parsed.name().to_owned(),
            value: parsed.value_trimmed().to_owned(),
            path: parsed.path().map(str::to_owned),
            domain: parsed.domain().map(str::to_owned),
            expires: parsed.expires_datetime().map(|expires| expires.to_string()),
            max_age: parsed.max_age().map(|max_age| max_age.whole_seconds()),
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            same_site: parsed.same_site().map(|same_site| same_site.to_string()),
        })
    }

    pub(crate) fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Every parseable cookie set by a response, in header order.
pub(crate) fn response_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(Cookie::parse_set_cookie)
        .collect()
}

/// Renders a single `Cookie` request header value.
pub(crate) fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(Cookie::pair)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;
    use http::header::SET_COOKIE;

    use super::{Cookie, cookie_header, response_cookies};

    #[test]
    fn parses_set_cookie_attributes() {
        let cookie = Cookie::parse_set_cookie(
            "session=\"abc123\"; Path=/; Domain=.example.com; Max-Age=60; Secure; HttpOnly; SameSite=Lax",
        )
        .expect("valid cookie");
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cookie.max_age, Some(60));
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }

    #[test]
    fn rejects_malformed_set_cookie() {
        assert!(Cookie::parse_set_cookie("no-equals-sign").is_none());
        assert!(Cookie::parse_set_cookie("   ").is_none());
        assert!(Cookie::parse_set_cookie("=value").is_none());
    }

    #[test]
    fn collects_response_cookies_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "a=1; Path=/".parse().expect("header"));
        headers.append(SET_COOKIE, "broken".parse().expect("header"));
        headers.append(SET_COOKIE, "b=2".parse().expect("header"));

        let cookies = response_cookies(&headers);
        let names: Vec<_> = cookies.iter().map(|cookie| cookie.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn renders_single_cookie_header() {
        assert_eq!(cookie_header(&[]), None);
        let cookies = [Cookie::new("a", "1"), Cookie::new("b", "2")];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("a=1; b=2"));
    }
}
