//! Authentication and identity module.
//!
//! Every route shares the same pipeline:
//!
//! - **Extract** a bearer credential from `?access_token=` or `Authorization`
//! - **Verify** it with the [`TokenCodec`] (HMAC, zero leeway)
//! - **Resolve** the claims to an identity through the [`UserStore`]
//!
//! Domain routes use [`resolve`], which never fails once the token verifies.
//! Account routes use [`resolve_member`], which rejects unknown or inactive
//! accounts.

mod context;
mod extractor;
pub mod password;
mod resolver;
mod token;
mod user_store;

pub use context::{CanonicalClaims, ResolvedIdentity, grade_from_value};
pub use extractor::{AuthError, extract_credential};
pub use resolver::{resolve, resolve_member};
pub use token::{AuthConfig, DEFAULT_TOKEN_TTL_MINUTES, TokenClaims, TokenCodec, parse_hmac_algorithm};
pub use user_store::{
    MAX_CLASS_STD, MIN_CLASS_STD, StoreError, StoreResult, UserStore, is_plausible_email,
    parse_user_record_id,
};
