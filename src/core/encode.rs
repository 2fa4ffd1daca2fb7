//! Response shaping for endpoint results
//!
//! Actions return a [`Reply`]; [`encode_response`] turns it into an axum
//! [`Response`] with a JSON body.

use crate::core::entity::Model;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone};
use serde_json::Value;
use std::fmt::Display;

/// What an action hands back to the pipeline
#[derive(Debug)]
pub enum Reply {
    /// A fully built response, passed through unchanged
    Response(Response),
    /// A bare status; the body becomes the standard reason phrase
    Status(StatusCode),
    /// A JSON body with status and extra headers
    Payload {
        body: Value,
        status: StatusCode,
        headers: HeaderMap,
    },
}

impl Reply {
    /// `(value, 200)`
    pub fn json(body: Value) -> Self {
        Self::payload(body, StatusCode::OK)
    }

    pub fn payload(body: Value, status: StatusCode) -> Self {
        Reply::Payload {
            body,
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Reply::Status(status)
    }

    /// `(null, 204)`
    pub fn no_content() -> Self {
        Self::payload(Value::Null, StatusCode::NO_CONTENT)
    }

    /// Encode an entity through its dictionary projection
    pub fn entity<M: Model>(model: &M) -> Self {
        Self::json(model.to_dict())
    }

    /// Attach an extra header; ignored for pass-through responses
    pub fn with_header(self, name: HeaderName, value: HeaderValue) -> Self {
        match self {
            Reply::Payload {
                body,
                status,
                mut headers,
            } => {
                headers.insert(name, value);
                Reply::Payload {
                    body,
                    status,
                    headers,
                }
            }
            Reply::Status(status) => {
                let mut headers = HeaderMap::new();
                headers.insert(name, value);
                Reply::Payload {
                    body: Value::String(reason_phrase(status).to_string()),
                    status,
                    headers,
                }
            }
            response @ Reply::Response(_) => response,
        }
    }

    /// Status the encoded response will carry
    pub fn status_code(&self) -> StatusCode {
        match self {
            Reply::Response(r) => r.status(),
            Reply::Status(s) => *s,
            Reply::Payload { status, .. } => *status,
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<Value> for Reply {
    fn from(body: Value) -> Self {
        Reply::json(body)
    }
}

impl From<StatusCode> for Reply {
    fn from(status: StatusCode) -> Self {
        Reply::Status(status)
    }
}

fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

fn body_allowed(status: StatusCode) -> bool {
    !(status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || status.is_informational())
}

/// Turn a [`Reply`] into a response
///
/// Content-Type is always `application/json`, extra headers win over it.
/// Statuses that forbid a body get an empty one.
pub fn encode_response(reply: Reply) -> Response {
    let (body, status, extra) = match reply {
        Reply::Response(response) => return response,
        Reply::Status(status) => (
            Value::String(reason_phrase(status).to_string()),
            status,
            HeaderMap::new(),
        ),
        Reply::Payload {
            body,
            status,
            headers,
        } => (body, status, headers),
    };

    let bytes = if body_allowed(status) {
        // Value serialization cannot fail: keys are always strings
        serde_json::to_vec(&body).unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra.iter() {
        headers.insert(name.clone(), value.clone());
    }
    response
}

/// ISO-8601 with a literal `Z` for UTC and the numeric offset otherwise
pub fn zulu_isoformat<Tz>(dt: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let formatted = dt.to_rfc3339_opts(SecondsFormat::AutoSi, false);
    match formatted.strip_suffix("+00:00") {
        Some(stripped) => format!("{}Z", stripped),
        None => formatted,
    }
}

/// ISO-8601 without any zone designator
pub fn naive_isoformat(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Serde adapter writing `DateTime<Utc>` fields in zulu form
///
/// ```rust,ignore
/// #[serde(with = "voog::core::encode::iso8601")]
/// pub created_at: DateTime<Utc>,
/// ```
pub mod iso8601 {
    use super::zulu_isoformat;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&zulu_isoformat(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
