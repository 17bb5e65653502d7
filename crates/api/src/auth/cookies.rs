//! Request cookie jar and `Set-Cookie` builder

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// Cookies sent with a request, in header order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    /// Parse every `Cookie` header on a request.
    ///
    /// Malformed pairs are skipped; a later duplicate name does not override
    /// the first one (browsers send the most specific cookie first).
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::default();
        for header in headers.get_all(COOKIE) {
            let Ok(value) = header.to_str() else {
                continue;
            };
            for pair in value.split(';') {
                let Some((name, val)) = pair.trim().split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() || jar.get(name).is_some() {
                    continue;
                }
                jar.pairs.push((name.to_string(), val.trim().to_string()));
            }
        }
        jar
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.pairs.iter_mut().find(|(n, _)| n == name) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.pairs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(n, _)| n != name);
    }

    /// Mirror response cookies into the jar so downstream handlers see the
    /// values the browser will hold after this response.
    pub fn apply(&mut self, cookies: &[SetCookie]) {
        for cookie in cookies {
            if cookie.is_removal() {
                self.remove(&cookie.name);
            } else {
                self.set(&cookie.name, &cookie.value);
            }
        }
    }

    /// Render the jar as a single `Cookie` header value
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        if self.pairs.is_empty() {
            return None;
        }
        let joined = self
            .pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
}

/// A cookie to write back to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            domain: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    /// A cookie that deletes `name` in the browser
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }

    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        let same_site = match self.same_site {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
        };
        write!(f, "; SameSite={same_site}")?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Cookies queued by extractors and handlers for the current response.
///
/// The tenant gate inserts one per request and writes whatever was queued
/// once the inner service has produced its response.
#[derive(Debug, Clone, Default)]
pub struct ResponseCookies(Arc<Mutex<Vec<SetCookie>>>);

impl ResponseCookies {
    pub fn extend(&self, cookies: impl IntoIterator<Item = SetCookie>) {
        if let Ok(mut queued) = self.0.lock() {
            queued.extend(cookies);
        }
    }

    /// Drain the queue
    pub fn take(&self) -> Vec<SetCookie> {
        self.0
            .lock()
            .map(|mut queued| std::mem::take(&mut *queued))
            .unwrap_or_default()
    }
}
