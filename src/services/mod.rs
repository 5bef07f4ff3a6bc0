pub mod email;
pub mod password;
pub mod password_reset;
pub mod reset_token;
pub mod token_sweeper;

pub use email::EmailService;
pub use password_reset::PasswordResetService;
pub use reset_token::ResetTokenSigner;
