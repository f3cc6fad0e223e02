use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::audit::Operator;
use crate::error::AppError;

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const OPERATOR_NAME_HEADER: &str = "x-operator-name";

/// The operator must identify themselves on every mutating call; there is no
/// anonymous fallback.
#[async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let user_id = header(OPERATOR_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(format!("Missing {} header", OPERATOR_ID_HEADER))
        })?;
        let name = header(OPERATOR_NAME_HEADER).ok_or_else(|| {
            AppError::Unauthorized(format!("Missing {} header", OPERATOR_NAME_HEADER))
        })?;

        Ok(Operator { user_id, name })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Operator, AppError> {
        let (mut parts, _) = request.into_parts();
        Operator::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_both_headers() {
        let request = Request::builder()
            .header(OPERATOR_ID_HEADER, "u-42")
            .header(OPERATOR_NAME_HEADER, " Mei Lin ")
            .body(())
            .unwrap();
        let operator = extract(request).await.unwrap();
        assert_eq!(operator.user_id, "u-42");
        assert_eq!(operator.name, "Mei Lin");
    }

    #[tokio::test]
    async fn missing_or_blank_identity_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));

        let request = Request::builder()
            .header(OPERATOR_ID_HEADER, "u-42")
            .header(OPERATOR_NAME_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));
    }
}
