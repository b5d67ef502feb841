//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation ID
//! - `CallerIdentity`: the identity the caller claims, if any

use crate::middleware::header_correlation_id;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use occupancy_core::IdentityId;
use uuid::Uuid;

/// Header carrying the caller's identity ID.
///
/// Authentication is out of scope for this service; an upstream gateway is
/// expected to set this header after verifying the caller.
pub const IDENTITY_HEADER: &str = "X-Identity-Id";

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation middleware ran,
/// otherwise from the `X-Correlation-ID` header, otherwise freshly generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }
        Ok(Self(
            header_correlation_id(&parts.headers).unwrap_or_else(Uuid::new_v4),
        ))
    }
}

/// The caller's identity, when the request carries one.
///
/// A missing or unparsable header yields `CallerIdentity(None)`; handlers
/// decide whether that is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub Option<IdentityId>);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<IdentityId>().ok());

        Ok(Self(identity))
    }
}
