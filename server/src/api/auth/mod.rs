//! Authentication and endpoint authorization

pub mod api_key;
pub mod endpoint;
pub mod error;
mod extractors;
pub mod jwt;
pub mod keys;
pub mod middleware;
pub mod policy;

pub use api_key::{ApiKeyConfigError, ApiKeyGate};
pub use endpoint::{EndpointAccess, EndpointAuthorizationMatrix, EndpointPolicy};
pub use error::{AuthError, AuthenticationError, AuthorizationError};
pub use extractors::Auth;
pub use jwt::IdentityClaimsExtractor;
pub use middleware::{AuthState, require_auth};
pub use policy::{AuthPolicy, PolicyHandle};
