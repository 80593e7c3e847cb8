use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::util::is_token;
use crate::Error;

// Everything but the characters a uri component keeps as is.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A cookie parsed from a `set-cookie` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "is_false", default)]
    pub secure: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub http_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !v
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Parse one `set-cookie` header value. `None` if there is no `name=value`.
    pub fn parse(header: &str) -> Option<Cookie> {
        let mut parts = header.split(';');

        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, decode(value.trim()));

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };

            match key.to_ascii_lowercase().as_str() {
                "expires" => cookie.expires = Some(val.to_string()),
                "max-age" => cookie.max_age = val.parse().ok(),
                "domain" => cookie.domain = Some(val.to_string()),
                "path" => cookie.path = Some(val.to_string()),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "samesite" => cookie.same_site = Some(val.to_string()),
                _ => trace!("Ignore cookie attribute: {}", key),
            }
        }

        Some(cookie)
    }
}

fn decode(v: &str) -> String {
    match percent_decode_str(v).decode_utf8() {
        Ok(s) => s.into_owned(),
        Err(_) => v.to_string(),
    }
}

/// `name=value` for a request cookie header, the value percent encoded.
pub(crate) fn serialize(name: &str, value: &str) -> Result<String, Error> {
    if !is_token(name) {
        return Err(Error::InvalidCookie(name.to_string()));
    }

    Ok(format!("{}={}", name, utf8_percent_encode(value, COMPONENT)))
}
