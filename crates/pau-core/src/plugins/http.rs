//! HTTP basic authentication: `Authorization` header extraction and the
//! `WWW-Authenticate` challenge.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use pau_common::Credentials;
use tracing::debug;

use crate::error::Result;
use crate::plugin::{Challenger, Extractor};
use crate::request::{AuthRequest, AuthResponse};

pub const HTTP_AUTH_PROTOCOL: &str = "http auth";

pub struct BasicAuthPlugin {
    realm: String,
}

impl BasicAuthPlugin {
    pub fn new(realm: impl Into<String>) -> Self {
        Self { realm: realm.into() }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Decode `Basic base64(login:password)`. The password may contain `:`.
    fn parse_header(value: &str) -> Option<Credentials> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (login, password) = decoded.split_once(':')?;
        Some(Credentials::new(login, password))
    }
}

impl Default for BasicAuthPlugin {
    fn default() -> Self {
        Self::new("pau")
    }
}

#[async_trait]
impl Extractor for BasicAuthPlugin {
    async fn extract_credentials(&self, request: &AuthRequest) -> Result<Option<Credentials>> {
        let Some(header) = request.header("authorization") else {
            return Ok(None);
        };

        let credentials = Self::parse_header(header);
        if credentials.is_none() {
            debug!("Ignoring non-basic or malformed Authorization header");
        }
        Ok(credentials)
    }
}

#[async_trait]
impl Challenger for BasicAuthPlugin {
    fn protocol(&self) -> Option<&str> {
        Some(HTTP_AUTH_PROTOCOL)
    }

    async fn challenge(&self, _request: &AuthRequest, response: &mut AuthResponse) -> Result<bool> {
        response.set_header("WWW-Authenticate", format!("basic realm=\"{}\"", self.realm));
        response.set_status(401);
        Ok(true)
    }
}
