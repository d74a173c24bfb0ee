//! `rdpstore-auth`: bearer-token boundary.
//!
//! Decoupled from HTTP and storage: decode a token, check its time window and
//! answer role questions.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use authorize::{AuthzError, require_role};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
