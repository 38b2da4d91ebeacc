//! Authentication and session core.
//!
//! - [`TokenService`]: HS256 bearer tokens bound to `(account, session)`.
//! - [`SessionManager`]: the session list stored on each account.
//! - [`VerificationCodeService`]: throttled one-time email codes.
//! - [`AuthFacade`]: login, session verification and logout.
//!
//! A token is only honoured while its session is still on the account and
//! younger than the validity window, so removing a session revokes every token
//! bound to it even though the signature keeps verifying.

mod clock;
pub mod code;
mod error;
mod facade;
mod session;
pub mod token;

use sha2::{Digest, Sha512};

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{CodePurpose, CodeSource, RandomCodeSource, SequenceCodeSource, VerificationCodeService};
pub use error::AuthError;
pub use facade::{AuthFacade, AuthenticatedAccount, LogoutOutcome};
pub use session::SessionManager;
pub use token::{TokenClaims, TokenError, TokenService};

/// One-way password function. Deterministic so logins can look accounts up by hash.
#[must_use]
pub fn hash_credential(password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
