use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, Claims, Role};
use crate::core::state::AppState;

/// Authenticated student; carries the student id from the token subject.
pub(crate) struct CurrentStudent(pub(crate) String);

/// Teacher or admin token, for maintenance endpoints.
pub(crate) struct CurrentStaff(pub(crate) Claims);

struct Authenticated(Claims);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        if claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized("Invalid authentication credentials"));
        }

        Ok(Authenticated(claims))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(claims) = Authenticated::from_request_parts(parts, state).await?;

        if claims.role == Role::Student {
            Ok(CurrentStudent(claims.sub))
        } else {
            Err(ApiError::Forbidden("Student access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(claims) = Authenticated::from_request_parts(parts, state).await?;

        if claims.role.is_staff() {
            Ok(CurrentStaff(claims))
        } else {
            Err(ApiError::Forbidden("Staff access required"))
        }
    }
}
