pub(crate) mod analysis;
pub(crate) mod health;
pub(crate) mod portfolios;
pub(crate) mod stocks;

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// `Json<T>` whose rejections (bad syntax, wrong types, missing content
/// type) surface as 400 validation errors in the standard error body.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Parses a positive integer path id.
pub fn parse_id(raw: &str, what: &str) -> Result<i32, AppError> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation(format!("{} must be a positive integer", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "Stock ID").unwrap(), 42);
        assert!(matches!(parse_id("0", "Stock ID"), Err(AppError::Validation(_))));
        assert!(matches!(parse_id("abc", "Stock ID"), Err(AppError::Validation(_))));
    }
}
