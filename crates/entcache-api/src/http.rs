// reqwest-backed implementation of the transport contract.
//
// Resolves descriptors against a base URL, attaches the opaque access
// token, and turns non-2xx statuses into structured errors.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::request::{Method, RequestDescriptor};
use crate::transport::{Transport, TransportConfig};

// ── Error response shape ─────────────────────────────────────────────

/// Error bodies seen in the wild: `{message}`, `{msg}`, optionally `{code}`.
#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    /// String or numeric, depending on the service.
    #[serde(default)]
    code: Option<Value>,
}

impl ErrorResponse {
    fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async HTTP transport for a REST-style API.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Build from a base URL, an optional bearer token, and transport config.
    ///
    /// The token is sent as `Authorization: Bearer <token>` and marked
    /// sensitive so it never shows up in debug output.
    pub fn new(
        base_url: Url,
        access_token: Option<&SecretString>,
        config: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(token) = access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| Error::Authentication {
                    status: 0,
                    message: format!("invalid access token header value: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = config.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url,
            timeout_secs: config.timeout.as_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            timeout_secs: 0,
        })
    }

    /// The API base URL every descriptor is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn execute(&self, request: RequestDescriptor) -> Result<Value, Error> {
        let url = request.resolve(&self.base_url)?;
        debug!("{} {url}", request.method);

        let builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Put => self.http.put(url),
            Method::Patch => self.http.patch(url),
            Method::Delete => self.http.delete(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        handle_response(resp).await
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: RequestDescriptor,
    ) -> impl std::future::Future<Output = Result<Value, Error>> + Send {
        self.execute(request)
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(parse_error(status, &body));
    }

    if body.trim().is_empty() {
        trace!(%status, "empty response body");
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

fn parse_error(status: reqwest::StatusCode, raw: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorResponse>(raw).ok();
    let code = parsed.as_ref().and_then(ErrorResponse::code);
    let message = parsed
        .and_then(|e| e.message.or(e.msg))
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.to_string()
            } else {
                raw.chars().take(200).collect()
            }
        });

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Error::Authentication {
            status: status.as_u16(),
            message,
        };
    }

    Error::Api {
        status: status.as_u16(),
        message,
        code,
    }
}
