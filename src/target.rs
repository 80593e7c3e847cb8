//! Resolving the target url and merging query parameters.

use url::{form_urlencoded, Url};

use crate::Error;

/// Authority used for paths given without one.
pub(crate) const BASE_URL: &str = "http://localhost";

/// The target of an injected request.
#[derive(Debug, Clone)]
pub enum UrlInput {
    /// A path such as `/hello?a=b`, or an absolute url.
    Str(String),
    /// A url given in parts.
    Parts(UrlParts),
}

/// A url given in parts. Unset parts fall back to `http://localhost`.
#[derive(Debug, Clone, Default)]
pub struct UrlParts {
    pub protocol: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub pathname: String,
    pub query: Option<Query>,
}

#[derive(Debug, Clone)]
pub enum Query {
    /// `a=1&b=2`, with or without the leading `?`.
    Raw(String),
    /// Parameters in insertion order.
    Map(Vec<(String, QueryValue)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    One(String),
    /// Replaces every existing value for the name.
    Many(Vec<String>),
}

impl Query {
    pub fn new() -> Self {
        Query::Map(vec![])
    }

    /// Add a single valued parameter.
    pub fn param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name.into(), QueryValue::One(value.into()))
    }

    /// Add a multi valued parameter.
    pub fn values<I, V>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(name.into(), QueryValue::Many(values))
    }

    fn with(self, name: String, value: QueryValue) -> Self {
        let mut entries = self.into_entries();
        assign(&mut entries, vec![(name, value)]);
        Query::Map(entries)
    }

    pub(crate) fn into_entries(self) -> Vec<(String, QueryValue)> {
        match self {
            Query::Map(v) => v,
            Query::Raw(s) => {
                let mut entries: Vec<(String, QueryValue)> = vec![];
                let raw = s.strip_prefix('?').unwrap_or(&s);

                for (name, value) in form_urlencoded::parse(raw.as_bytes()).into_owned() {
                    match entries.iter_mut().find(|(n, _)| *n == name) {
                        Some((_, existing)) => existing.push(value),
                        None => entries.push((name, QueryValue::One(value))),
                    }
                }

                entries
            }
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Query::new()
    }
}

impl QueryValue {
    fn push(&mut self, value: String) {
        match self {
            QueryValue::One(v) => {
                let first = std::mem::take(v);
                *self = QueryValue::Many(vec![first, value]);
            }
            QueryValue::Many(v) => v.push(value),
        }
    }
}

/// Later entries replace earlier ones with the same name, keeping the position.
fn assign(into: &mut Vec<(String, QueryValue)>, from: Vec<(String, QueryValue)>) {
    for (name, value) in from {
        match into.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => into.push((name, value)),
        }
    }
}

/// Resolve the input against `http://localhost` and merge in `query`.
pub(crate) fn resolve(input: &UrlInput, query: Option<&Query>) -> Result<Url, Error> {
    let mut entries = vec![];

    let mut url = match input {
        UrlInput::Str(s) => parse_str(s)?,
        UrlInput::Parts(parts) => {
            if let Some(q) = &parts.query {
                assign(&mut entries, q.clone().into_entries());
            }
            from_parts(parts)?
        }
    };

    if let Some(q) = query {
        assign(&mut entries, q.clone().into_entries());
    }

    if !entries.is_empty() {
        merge_query(&mut url, entries);
    }

    trace!("Resolved url: {}", url);

    Ok(url)
}

fn parse_str(s: &str) -> Result<Url, Error> {
    // Joining would read `//path` as a scheme relative url with host `path`.
    if s.starts_with('/') {
        return Ok(Url::parse(&format!("{}{}", BASE_URL, s))?);
    }

    match Url::parse(s) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Url::parse(BASE_URL)?.join(s)?),
        Err(e) => Err(e.into()),
    }
}

fn from_parts(parts: &UrlParts) -> Result<Url, Error> {
    let mut url = Url::parse(BASE_URL)?;

    if let Some(protocol) = &parts.protocol {
        let scheme = protocol.trim_end_matches(':');
        url.set_scheme(scheme)
            .map_err(|_| Error::UrlPart("protocol"))?;
    }

    if let Some(hostname) = &parts.hostname {
        url.set_host(Some(hostname.as_str()))?;
    }

    if parts.port.is_some() {
        url.set_port(parts.port)
            .map_err(|_| Error::UrlPart("port"))?;
    }

    if parts.pathname.starts_with('/') {
        url.set_path(&parts.pathname);
    } else {
        url.set_path(&format!("/{}", parts.pathname));
    }

    Ok(url)
}

fn merge_query(url: &mut Url, entries: Vec<(String, QueryValue)>) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    for (name, value) in entries {
        match value {
            QueryValue::Many(values) => {
                pairs.retain(|(n, _)| *n != name);
                pairs.extend(values.into_iter().map(|v| (name.clone(), v)));
            }
            QueryValue::One(v) => match pairs.iter().position(|(n, _)| *n == name) {
                Some(pos) => {
                    pairs[pos].1 = v;
                    let mut index = 0;
                    pairs.retain(|(n, _)| {
                        let keep = *n != name || index == pos;
                        index += 1;
                        keep
                    });
                }
                None => pairs.push((name, v)),
            },
        }
    }

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

/// The request target, path and search.
pub(crate) fn request_target(url: &Url) -> String {
    match url.query() {
        Some(q) if !q.is_empty() => format!("{}?{}", url.path(), q),
        _ => url.path().to_string(),
    }
}

/// Host header value derived from the url, always with a port.
pub(crate) fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or("localhost");

    let port = match url.port() {
        Some(p) => p,
        None if url.scheme() == "https" => 443,
        None => 80,
    };

    format!("{}:{}", host, port)
}

impl From<&str> for UrlInput {
    fn from(s: &str) -> Self {
        UrlInput::Str(s.to_string())
    }
}

impl From<String> for UrlInput {
    fn from(s: String) -> Self {
        UrlInput::Str(s)
    }
}

impl From<UrlParts> for UrlInput {
    fn from(p: UrlParts) -> Self {
        UrlInput::Parts(p)
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::Raw(s.to_string())
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::Raw(s)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Query
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        let mut entries = vec![];
        assign(
            &mut entries,
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        Query::Map(entries)
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::One(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::One(s)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(v: Vec<String>) -> Self {
        QueryValue::Many(v)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(v: Vec<&str>) -> Self {
        QueryValue::Many(v.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for QueryValue {
    fn from(v: [&str; N]) -> Self {
        QueryValue::Many(v.into_iter().map(String::from).collect())
    }
}
