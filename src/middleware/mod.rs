/// Middleware module
///
/// Custom middleware for authentication and the CORS policy.

mod cors;
mod jwt_middleware;

pub use cors::cors;
pub use jwt_middleware::JwtMiddleware;
