pub mod session;
pub mod sleep;
