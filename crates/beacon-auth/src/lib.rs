//! # beacon-auth
//!
//! Bearer token handling for WebSocket upgrades.
//!
//! Tokens are HS256 JWTs carrying a numeric `user_id` claim. The hub only
//! needs that id; the optional `email` claim is carried through for logging.

#![deny(unsafe_code)]

pub mod error;
pub mod token;

pub use error::AuthError;
pub use token::{
    Claims, DEFAULT_TOKEN_TTL, TokenVerifier, bearer_token_from_header, extract_token,
    token_from_query,
};
