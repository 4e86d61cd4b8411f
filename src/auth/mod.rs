mod helpers;
mod middleware;
pub mod provision;
mod token;

pub use helpers::{
    TokenValidationError, ValidatedToken, basic_auth_token, extract_token_from_header,
    validate_token,
};
pub use middleware::{AuthError, RequireAdmin, RequireUser};
pub use token::{MintedToken, TokenGenerator, build_token, parse_token};
