use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use validator::{Validate, ValidationErrors};

/// JSON body extractor that also runs `validator` rules
///
/// Both malformed JSON and failed field rules are answered with the standard
/// `{"error": {code, message, category}}` body instead of axum's plain text.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidationJsonRejection::Json)?;
        value.validate().map_err(ValidationJsonRejection::Rules)?;
        Ok(ValidatedJson(value))
    }
}

pub enum ValidationJsonRejection {
    Json(JsonRejection),
    Rules(ValidationErrors),
}

impl ValidationJsonRejection {
    fn describe(&self) -> (&'static str, String) {
        match self {
            ValidationJsonRejection::Json(rejection) => {
                let text = rejection.body_text();
                if let Some(field) = text
                    .split("missing field `")
                    .nth(1)
                    .and_then(|s| s.split('`').next())
                {
                    ("VALIDATION_MISSING_FIELD", format!("Missing required field: {}", field))
                } else {
                    ("VALIDATION_INVALID_INPUT", "Invalid request body".to_string())
                }
            }
            ValidationJsonRejection::Rules(errors) => {
                let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
                fields.sort_unstable();
                let code = if fields.contains(&"amount") {
                    "VALIDATION_INVALID_AMOUNT"
                } else if fields.contains(&"address") {
                    "VALIDATION_INVALID_ADDRESS"
                } else {
                    "VALIDATION_INVALID_INPUT"
                };
                (code, format!("Invalid fields: {}", fields.join(", ")))
            }
        }
    }
}

impl IntoResponse for ValidationJsonRejection {
    fn into_response(self) -> Response {
        let (code, message) = self.describe();
        let original = match &self {
            ValidationJsonRejection::Json(rejection) => rejection.body_text(),
            ValidationJsonRejection::Rules(errors) => errors.to_string(),
        };

        tracing::warn!(
            error_code = code,
            error_message = %message,
            original_error = %original,
            "Request validation failed"
        );
        metrics::counter!("errors_total", "category" => "Validation", "code" => code).increment(1);

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "category": "Validation",
            }
        }));

        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
