pub mod auth;
pub mod recover;

pub use auth::require_permission;
pub use recover::recover_panic;
