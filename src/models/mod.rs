pub mod auth;
pub mod session;
pub mod tokens;
pub mod user;
