//! Built-in pipeline stages.
//!
//! Each stage implements [`Middleware`](crate::pipeline::Middleware) and owns
//! nothing mutable itself — shared state (cache, counter, dispatcher) is
//! injected at construction.

pub mod auth;
pub mod caching;
pub mod guard;
pub mod observe;
pub mod rate_limit;
pub mod transport;

pub use auth::{AuthStage, StaticTokenValidator, TokenValidator};
pub use caching::CachingStage;
pub use guard::ExceptionGuardStage;
pub use observe::{LoggingStage, MonitoringStage, TimingStage, DURATION_HEADER};
pub use rate_limit::RateLimitStage;
pub use transport::SslEnforcerStage;
