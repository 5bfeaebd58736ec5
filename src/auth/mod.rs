/// Authentication module
///
/// Handles the session token lifecycle: JWT signing/verification,
/// password hashing, the refresh token ledger, and session orchestration.

mod claims;
mod jwt;
mod ledger;
mod password;
mod session;

pub use claims::AccessClaims;
pub use claims::RefreshClaims;
pub use jwt::decode_refresh_unverified;
pub use jwt::issue_access_token;
pub use jwt::issue_refresh_token;
pub use jwt::verify_access_token;
pub use jwt::verify_refresh_token;
pub use ledger::hash_token;
pub use ledger::insert_refresh_token;
pub use ledger::list_active_for_user;
pub use ledger::revoke_all_for_user;
pub use ledger::revoke_if_active;
pub use ledger::RefreshTokenRecord;
pub use password::hash_password;
pub use password::verify_password;
pub use session::SessionManager;
pub use session::SessionUser;
pub use session::TokenPair;
