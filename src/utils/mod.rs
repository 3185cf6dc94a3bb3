pub mod fernet;
pub mod html;
pub mod time;
