use chrono::{DateTime, Utc};
use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;

use crate::api::ApiResponse;
use crate::error::AppError;

use super::{Claims, TokenIssuer};

/// Caller identity taken from a verified bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            expires_at: claims.expires_at(),
            id: claims.id,
            email: claims.email,
        }
    }
}

fn bearer_token<'a>(header: Option<&'a str>) -> Option<&'a str> {
    let mut parts = header?.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("bearer_auth_guard");
        let _guard = auth_span.enter();

        let issuer = match request.rocket().state::<TokenIssuer>() {
            Some(issuer) => issuer,
            _ => {
                tracing::error!("Token issuer not found in managed state");
                return Outcome::Error((
                    Status::InternalServerError,
                    AppError::Internal("Token issuer missing".to_string()),
                ));
            }
        };

        let Some(token) = bearer_token(request.headers().get_one("Authorization")) else {
            tracing::warn!("Missing or malformed Authorization header");
            return Outcome::Error((
                Status::Unauthorized,
                AppError::Token("Missing bearer token".to_string()),
            ));
        };

        match issuer.verify(token) {
            Ok(claims) => {
                tracing::info!(user_id = %claims.id, "User authenticated via bearer token");
                Outcome::Success(AuthUser::from(claims))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Rejected bearer token");
                Outcome::Error((Status::Unauthorized, err))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    Custom(
        Status::Unauthorized,
        Json(ApiResponse::message("Unauthorized")),
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    Custom(Status::NotFound, Json(ApiResponse::message("Not found")))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    Custom(Status::BadRequest, Json(ApiResponse::message("Invalid request")))
}

// Rocket reports undeserializable JSON bodies as 422.
#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    Custom(Status::BadRequest, Json(ApiResponse::message("Invalid request")))
}
