//! Request, response and statistics types shared by every module

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::error::Result;

pub use reqwest::Method;

/// Header carrying the time an entry was written to a partition
pub const CACHED_AT_HEADER: &str = "sw-cached-date";

/// An intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    /// Build a GET request from an absolute URL string
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Key under which the response is stored in a partition
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }

    /// Only reads are intercepted; everything else passes through
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// A response as seen by the page and as stored in a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    /// Header names are stored lower-cased
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Synthesized 503 returned when neither network nor cache can answer
    pub fn offline(message: &str) -> Self {
        let mut response = Self::new(503, message.as_bytes().to_vec())
            .with_header("content-type", "text/plain; charset=utf-8");
        response.status_text = "Service Unavailable".to_string();
        response
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Copy of this response carrying the cached-at stamp
    pub fn stamped(&self, at: DateTime<Utc>) -> Self {
        self.clone().with_header(
            CACHED_AT_HEADER,
            &at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// Insertion time recorded by [`Response::stamped`], if present and parsable
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.header(CACHED_AT_HEADER)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Counters describing how requests were resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub offline: u64,
    pub revalidations: u64,
    pub revalidation_failures: u64,
}
