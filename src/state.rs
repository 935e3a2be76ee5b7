use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::JwtDecoder;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt: JwtDecoder,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

impl FromRef<AppState> for JwtDecoder {
    fn from_ref(state: &AppState) -> JwtDecoder {
        state.jwt.clone()
    }
}
