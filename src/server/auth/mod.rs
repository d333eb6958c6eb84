pub mod factory;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod routes;

pub use factory::{build_client_factory, ClientFactory};
pub use identity::{AuthError, AuthMethod, BearerToken, RequestIdentity};
