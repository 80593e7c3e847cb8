use std::time::SystemTime;

use chrono::{DateTime, Utc};

pub(crate) fn compare_lowercase_ascii(a: &str, lowercased: &str) -> bool {
    a.len() == lowercased.len()
        && a.bytes()
            .zip(lowercased.bytes())
            .all(|(a, b)| a.is_ascii() && a.to_ascii_lowercase() == b)
}

/// Comma separated header value contains `token`, ignoring case.
pub(crate) fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .map(|v| v.trim())
        .any(|v| compare_lowercase_ascii(v, token))
}

/// RFC 7230 token, the grammar for methods and cookie names.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(
                    c,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

/// IMF-fixdate, as used for the `Date` header.
pub(crate) fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
