//! HTTP surface for registering name to address overrides at runtime.
//!
//! - `POST /` with `[{"addr": ..., "ip": ...}]` installs the bindings and
//!   answers `{"processed": N}`.
//! - `GET /list` returns the live override table in the same shape.
//!
//! The surface is unauthenticated and meant for a trusted operator network.

use std::net::IpAddr;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use warden_policy::OverrideTable;

use crate::error::RegistrationError;

/// One name to address binding on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub addr: String,

    #[serde(default)]
    pub ip: String,
}

/// Answer to a registration batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedResponse {
    pub processed: usize,
}

#[derive(Clone)]
struct RegistrationState {
    overrides: OverrideTable,
}

/// Build the registration routes over `overrides`.
pub fn routes(overrides: OverrideTable) -> Router {
    Router::new()
        .route("/", post(register).fallback(method_not_supported))
        .route("/list", get(list))
        .layer(TraceLayer::new_for_http())
        .with_state(RegistrationState { overrides })
}

async fn register(
    State(state): State<RegistrationState>,
    body: Bytes,
) -> Result<Json<ProcessedResponse>, RegistrationError> {
    let batch: Vec<Registration> =
        serde_json::from_slice(&body).map_err(|e| RegistrationError::Parse(e.to_string()))?;

    let bindings = validate(batch)?;
    let processed = state.overrides.insert_all(bindings.iter().cloned());
    for (name, address) in &bindings {
        info!("registered: {} - {}", name, address);
    }

    Ok(Json(ProcessedResponse { processed }))
}

async fn list(State(state): State<RegistrationState>) -> Json<Vec<Registration>> {
    let entries = state
        .overrides
        .entries()
        .into_iter()
        .map(|(addr, ip)| Registration {
            addr,
            ip: ip.to_string(),
        })
        .collect();
    Json(entries)
}

async fn method_not_supported(method: Method) -> RegistrationError {
    RegistrationError::MethodNotSupported(method.to_string())
}

/// Check every entry before any is applied. Indexes in errors are 1-based.
fn validate(batch: Vec<Registration>) -> Result<Vec<(String, IpAddr)>, RegistrationError> {
    let mut bindings = Vec::with_capacity(batch.len());
    for (i, entry) in batch.into_iter().enumerate() {
        let index = i + 1;
        if entry.addr.is_empty() {
            return Err(RegistrationError::MissingName(index));
        }
        if entry.ip.is_empty() {
            return Err(RegistrationError::MissingAddress(index));
        }
        let address = entry
            .ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| RegistrationError::InvalidAddress(index, entry.ip.clone()))?;
        bindings.push((entry.addr, address));
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(addr: &str, ip: &str) -> Registration {
        Registration {
            addr: addr.to_string(),
            ip: ip.to_string(),
        }
    }

    #[test]
    fn test_validate_reports_first_bad_index() {
        let batch = vec![
            registration("a", "1.1.1.1"),
            registration("", "2.2.2.2"),
            registration("c", ""),
        ];
        assert_eq!(validate(batch), Err(RegistrationError::MissingName(2)));
    }

    #[test]
    fn test_validate_missing_address() {
        let batch = vec![registration("a", "")];
        assert_eq!(validate(batch), Err(RegistrationError::MissingAddress(1)));
    }

    #[test]
    fn test_validate_bad_address() {
        let batch = vec![registration("a", "1.1.1.1"), registration("b", "nope")];
        assert_eq!(
            validate(batch),
            Err(RegistrationError::InvalidAddress(2, "nope".to_string()))
        );
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(validate(vec![]), Ok(vec![]));
    }
}
