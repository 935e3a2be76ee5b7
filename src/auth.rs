use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;

/// Claims carried by the bearer tokens the auth service issues. Only the
/// subject (the user id) is consumed here; issuance lives outside this
/// service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtDecoder {
    key: DecodingKey,
}

impl JwtDecoder {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn decode_user(&self, token: &str) -> Result<Uuid, ApiError> {
        let data = decode::<Claims>(token, &self.key, &Validation::default()).map_err(|e| {
            tracing::info!("rejected bearer token: {}", e);
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;

        Ok(data.claims.sub)
    }
}

/// Extractor for the authenticated caller. Every scoped route takes this
/// first, so no handler can touch the database without a verified user id.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtDecoder: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;

        let decoder = JwtDecoder::from_ref(state);
        let user_id = decoder.decode_user(token)?;

        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(sub: Uuid, exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub,
                exp: exp as usize,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn decode_round_trips_the_subject() {
        let user_id = Uuid::new_v4();
        let token = token_for(user_id, chrono::Utc::now().timestamp() + 3600);

        let decoded = JwtDecoder::new(SECRET).decode_user(&token).unwrap();
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = token_for(Uuid::new_v4(), chrono::Utc::now().timestamp() - 3600);

        let result = JwtDecoder::new(SECRET).decode_user(&token);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn token_signed_with_wrong_secret_is_rejected() {
        let token = token_for(Uuid::new_v4(), chrono::Utc::now().timestamp() + 3600);

        let result = JwtDecoder::new("other-secret").decode_user(&token);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn extractor_accepts_a_valid_bearer_header() {
        let user_id = Uuid::new_v4();
        let token = token_for(user_id, chrono::Utc::now().timestamp() + 3600);

        let request: Request<()> = Request::builder()
            .uri("/advanced-health")
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let (mut parts, _body) = request.into_parts();

        let AuthUser(extracted) =
            AuthUser::from_request_parts(&mut parts, &JwtDecoder::new(SECRET))
                .await
                .unwrap();
        assert_eq!(extracted, user_id);
    }

    #[tokio::test]
    async fn extractor_rejects_a_missing_header() {
        let request: Request<()> = Request::builder()
            .uri("/advanced-health")
            .body(())
            .unwrap();
        let (mut parts, _body) = request.into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &JwtDecoder::new(SECRET)).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn extractor_rejects_a_non_bearer_scheme() {
        let request: Request<()> = Request::builder()
            .uri("/advanced-health")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        let (mut parts, _body) = request.into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &JwtDecoder::new(SECRET)).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }
}
