//! Anonymous customer identity cookie

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;

use shop_core::CustomerToken;

pub const COOKIE_NAME: &str = "customer_token";

const MAX_TOKEN_LEN: usize = 64;
const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

/// Token for this request and whether it was just issued
pub struct ResolvedToken {
    pub token: CustomerToken,
    pub issued: bool,
}

/// Read the customer token cookie, issuing a fresh token when absent or
/// malformed
pub fn resolve(headers: &HeaderMap) -> ResolvedToken {
    read(headers).map_or_else(
        || ResolvedToken {
            token: CustomerToken::generate(),
            issued: true,
        },
        |token| ResolvedToken {
            token,
            issued: false,
        },
    )
}

/// Customer token from the request's `Cookie` headers
pub fn read(headers: &HeaderMap) -> Option<CustomerToken> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|value| is_well_formed(value))
        .map(CustomerToken::from_string)
}

fn is_well_formed(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TOKEN_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `Set-Cookie` value for a token
pub fn cookie(token: &CustomerToken) -> String {
    format!(
        "{COOKIE_NAME}={token}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    )
}

/// Attach the cookie to a response if the token was just issued
pub fn attach(mut response: Response, resolved: &ResolvedToken) -> Response {
    if resolved.issued {
        match HeaderValue::from_str(&cookie(&resolved.token)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Could not encode customer token cookie"),
        }
    }
    response
}
