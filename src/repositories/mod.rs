pub mod user;

pub use user::{UserFilter, UserRepository, UserStore};
