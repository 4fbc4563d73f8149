// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! `Cookie` / `Set-Cookie` header codec.
//!
//! Parsing never fails: malformed pairs are skipped and the last value wins
//! for duplicate names. Values are percent-encoded on write and decoded on
//! read when they decode cleanly.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expiry stamp written alongside `Max-Age=0` for clients that ignore Max-Age.
const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes for a `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    /// Lifetime in seconds; `None` makes a session cookie, `Some(0)` expires it now
    pub max_age: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            http_only: false,
            secure: true,
            same_site: SameSite::Lax,
            max_age: None,
        }
    }
}

/// Parse a `Cookie` header value into a name -> value map.
pub fn parse(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"');
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.insert(name.to_string(), value);
    }
    cookies
}

/// Collect every `Cookie` header on a request into one map.
pub fn from_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        if let Ok(raw) = value.to_str() {
            cookies.extend(parse(raw));
        }
    }
    cookies
}

/// Render a `Set-Cookie` header value.
pub fn serialize(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut out = format!("{}={}", name, urlencoding::encode(value));

    out.push_str("; Path=");
    out.push_str(if options.path.is_empty() { "/" } else { &options.path });

    if let Some(domain) = options.domain.as_deref().filter(|d| !d.is_empty()) {
        out.push_str("; Domain=");
        out.push_str(domain);
    }

    if let Some(max_age) = options.max_age {
        out.push_str(&format!("; Max-Age={max_age}"));
        if max_age == 0 {
            out.push_str("; Expires=");
            out.push_str(EPOCH_EXPIRES);
        }
    }

    if options.http_only {
        out.push_str("; HttpOnly");
    }
    if options.secure {
        out.push_str("; Secure");
    }
    out.push_str("; SameSite=");
    out.push_str(options.same_site.as_str());

    out
}

/// Expired `Set-Cookie` values for every name across every domain variant.
///
/// An empty domain variant clears the host-only cookie.
pub fn clear_all<S: AsRef<str>>(
    names: &[S],
    domains: &[String],
    template: &CookieOptions,
) -> Vec<String> {
    let host_only = [String::new()];
    let domains = if domains.is_empty() { &host_only[..] } else { domains };

    let mut headers = Vec::with_capacity(names.len() * domains.len());
    for name in names {
        for domain in domains {
            let options = CookieOptions {
                domain: (!domain.is_empty()).then(|| domain.clone()),
                max_age: Some(0),
                ..template.clone()
            };
            headers.push(serialize(name.as_ref(), "", &options));
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_basic() {
        let cookies = parse("a=1; b=two ;c=3");
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_parse_skips_malformed_and_keeps_last() {
        let cookies = parse("junk; a=1; =nameless; a=2; b=x=y");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["a"], "2");
        assert_eq!(cookies["b"], "x=y");
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse("").is_empty());
        assert!(parse(";;;").is_empty());
        assert!(parse("no pairs here").is_empty());
    }

    #[test]
    fn test_parse_keeps_undecodable_value() {
        let cookies = parse("a=%E0%A4%A");
        assert_eq!(cookies["a"], "%E0%A4%A");
    }

    #[test]
    fn test_serialize_defaults() {
        let header = serialize("dl_email", "a@b.com", &CookieOptions::default());
        assert_eq!(header, "dl_email=a%40b.com; Path=/; Secure; SameSite=Lax");
    }

    #[test]
    fn test_serialize_session_cookie_attributes() {
        let options = CookieOptions {
            http_only: true,
            max_age: Some(3600),
            domain: Some(".example.com".to_string()),
            same_site: SameSite::Strict,
            ..Default::default()
        };
        let header = serialize("session", "tok", &options);
        assert!(header.starts_with("session=tok; Path=/"));
        assert!(header.contains("; Domain=.example.com"));
        assert!(header.contains("; Max-Age=3600"));
        assert!(header.contains("; HttpOnly"));
        assert!(header.contains("; SameSite=Strict"));
        assert!(!header.contains("Expires"));
    }

    #[test]
    fn test_serialize_max_age_zero_expires() {
        let options = CookieOptions {
            max_age: Some(0),
            ..Default::default()
        };
        let header = serialize("session", "", &options);
        assert!(header.contains("Max-Age=0"));
        assert!(header.contains(EPOCH_EXPIRES));
    }

    #[test]
    fn test_round_trip() {
        for value in ["plain", "a@b.com", "with space", "x=y", "ünïcode", ""] {
            let header = serialize("k", value, &CookieOptions::default());
            let pair = header.split(';').next().unwrap();
            assert_eq!(parse(pair)["k"], value);
        }
    }

    #[test]
    fn test_clear_all_covers_names_and_domains() {
        let domains = vec![String::new(), ".example.com".to_string()];
        let headers = clear_all(&["session", "sid"], &domains, &CookieOptions::default());
        assert_eq!(headers.len(), 4);
        assert!(headers.iter().all(|h| h.contains("Max-Age=0")));
        assert_eq!(
            headers.iter().filter(|h| h.contains("Domain=.example.com")).count(),
            2
        );
        assert!(headers[0].starts_with("session=;"));
    }

    #[test]
    fn test_clear_all_defaults_to_host_only() {
        let headers = clear_all(&["a"], &[], &CookieOptions::default());
        assert_eq!(headers.len(), 1);
        assert!(!headers[0].contains("Domain"));
    }

    #[test]
    fn test_from_headers_merges_multiple() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2; a=3"));
        let cookies = from_headers(&headers);
        assert_eq!(cookies["a"], "3");
        assert_eq!(cookies["b"], "2");
    }
}
