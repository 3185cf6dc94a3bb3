pub mod oauth_manager;
pub mod oauth_provider;
pub mod session;
pub mod sleep;
pub mod summary;

pub use oauth_manager::OAuthManager;
pub use session::SessionService;
pub use sleep::SleepService;
