//! Secure-transport enforcement.

use tracing::{debug, warn};

use crate::http::{Request, Response, StatusCode};
use crate::pipeline::{Middleware, Next, ResponseFuture};

/// Redirects insecure requests to their https equivalent.
///
/// Path and query string are preserved; the host is taken from the `Host`
/// header. An insecure request without a `Host` header is rejected with a
/// 400 — there is no correct origin to redirect to, and RFC 9112 §3.2
/// requires a 400 for host-less HTTP/1.1 requests anyway. Requests that
/// already arrived over a secure transport pass through untouched, so
/// re-invoking the stage after the redirect is a no-op.
pub struct SslEnforcerStage;

impl Middleware for SslEnforcerStage {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        Box::pin(async move {
            if request.is_secure() {
                return next.run(request).await;
            }

            let Some(host) = request.headers().get("host") else {
                warn!(path = %request.path(), "insecure request without Host header");
                return Response::error(StatusCode::BadRequest, "Host header required");
            };
            let location = format!("https://{}{}", host, request.full_path());
            debug!(%location, "redirecting insecure request");
            Response::permanent_redirect(location)
        })
    }
}
