//! Identity: bearer credentials, password hashing, second factor and login throttling.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod resolver;
mod token;
pub mod password;
pub mod totp;
mod throttle;

pub use principal::{Principal, ADMIN_ROLE};
pub use resolver::{strip_bearer, IdentityResolver, TokenIssuer};
pub use token::{JwtAuthority, TOKEN_TTL_HOURS};
pub use throttle::LoginThrottle;
