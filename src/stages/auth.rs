//! Bearer-credential authentication.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::warn;

use crate::http::{Request, Response, StatusCode};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Validates a presented bearer credential.
///
/// Injected into [`AuthStage`] per deployment; swap in a fake for tests or a
/// JWT verifier in production without touching the stage.
pub trait TokenValidator: Send + Sync {
    /// Returns `true` if the credential is acceptable.
    fn validate(&self, token: &str) -> bool;
}

/// Compares the presented token against a single configured secret in
/// constant time.
///
/// `subtle::ConstantTimeEq` already yields false for length mismatches
/// without an early data-dependent exit.
pub struct StaticTokenValidator {
    secret: String,
}

impl StaticTokenValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> bool {
        self.secret.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

/// Rejects requests whose `Authorization` header does not carry a valid
/// bearer credential.
///
/// A missing header, or one the injected [`TokenValidator`] rejects, short-
/// circuits with a 401 and a structured error body. Valid requests pass
/// through unchanged.
pub struct AuthStage {
    validator: Arc<dyn TokenValidator>,
}

impl AuthStage {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }
}

impl Middleware for AuthStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let validator = Arc::clone(&self.validator);
        Box::pin(async move {
            let token = request
                .headers()
                .get("authorization")
                .map(|header| header.strip_prefix("Bearer ").unwrap_or(header));

            match token {
                Some(token) if validator.validate(token) => next.run(request).await,
                _ => {
                    warn!(
                        path = %request.path(),
                        ip = %request.remote_addr(),
                        "rejected request with invalid credential"
                    );
                    Response::error(StatusCode::Unauthorized, "Invalid token")
                }
            }
        })
    }
}
