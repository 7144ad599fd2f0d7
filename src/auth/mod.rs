pub mod middleware;
pub mod session;

pub use session::{current_user, AuthUser, CachedProfile, CurrentUser};
