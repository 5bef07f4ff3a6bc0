pub mod extract;
pub mod password_reset;

pub use password_reset::{request_password_reset, reset_password};
