//! Cross-origin resource sharing for browser clients.
//!
//! When enabled, every response to a request carrying an `Origin` header
//! from an allowed origin gets `Access-Control-*` headers. `OPTIONS` is the
//! preflight and already needs no credentials, so it is answered directly
//! with the allowed methods and headers.

use crate::config::{ConfigError, CorsSection};
use hyper::header::{self, HeaderMap, HeaderValue};

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    any_origin: bool,
    origins: Vec<String>,
    methods: HeaderValue,
    headers: HeaderValue,
    exposed: Option<HeaderValue>,
    credentials: bool,
    max_age: Option<HeaderValue>,
}

fn joined(field: &str, values: &[String]) -> Result<HeaderValue, ConfigError> {
    let value = values.join(", ");
    HeaderValue::from_str(&value)
        .map_err(|_| ConfigError::Invalid(format!("cors.{field} is not a valid header value")))
}

impl CorsPolicy {
    pub fn new(section: &CorsSection) -> Result<Self, ConfigError> {
        if section.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid(
                "cors.allowed_origins must name at least one origin or \"*\"".to_string(),
            ));
        }
        let exposed = if section.exposed_headers.is_empty() {
            None
        } else {
            Some(joined("exposed_headers", &section.exposed_headers)?)
        };
        Ok(Self {
            any_origin: section.allowed_origins.iter().any(|o| o == "*"),
            origins: section
                .allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
            methods: joined("allowed_methods", &section.allowed_methods)?,
            headers: joined("allowed_headers", &section.allowed_headers)?,
            exposed,
            credentials: section.allow_credentials,
            max_age: (section.max_age > 0).then(|| HeaderValue::from(section.max_age)),
        })
    }

    /// Value for `Access-Control-Allow-Origin`, if `origin` is allowed.
    fn allow_origin(&self, origin: &HeaderValue) -> Option<HeaderValue> {
        // `*` cannot be combined with credentials, so the origin is echoed
        if self.any_origin && !self.credentials {
            return Some(HeaderValue::from_static("*"));
        }
        let requested = origin.to_str().ok()?;
        if self.any_origin || self.origins.iter().any(|o| o == requested) {
            Some(origin.clone())
        } else {
            None
        }
    }

    /// Add CORS headers to a response.
    pub fn apply(&self, origin: Option<&HeaderValue>, preflight: bool, headers: &mut HeaderMap) {
        let Some(origin) = origin else { return };
        let Some(allowed) = self.allow_origin(origin) else {
            return;
        };

        if allowed != "*" {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
        if self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        if preflight {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
            if let Some(max_age) = &self.max_age {
                headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
            }
        } else if let Some(exposed) = &self.exposed {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
        }
    }
}
