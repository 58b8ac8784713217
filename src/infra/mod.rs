pub mod http_client;
pub mod rate_limiter;

pub use http_client::{HttpClientPort, HttpMethod, HttpRequest, HttpResponse, ReqwestHttp};
pub use rate_limiter::RateLimiter;
