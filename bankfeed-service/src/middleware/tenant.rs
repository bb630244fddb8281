//! Tenant context extraction for multi-tenancy.
//!
//! The authenticating BFF sets `X-Tenant-ID` / `X-User-ID` after validating
//! the caller's session and tenant membership; this service trusts those
//! headers and scopes every query by the tenant id. Requests without a
//! tenant are rejected before any lookup happens.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use service_core::error::AppError;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// User making the request; absent for service-to-service calls.
    pub user_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_tenant = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing X-Tenant-ID header (required from BFF)"
                ))
            })?;

        let tenant_id = raw_tenant
            .parse::<Uuid>()
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid tenant id")))?;

        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let span = tracing::Span::current();
        span.record("tenant_id", raw_tenant);
        if let Some(ref uid) = user_id {
            span.record("user_id", uid.as_str());
        }

        Ok(TenantContext { tenant_id, user_id })
    }
}
