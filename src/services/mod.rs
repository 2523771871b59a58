pub mod auth;
pub mod email;
pub mod ephemeral;
pub mod metrics;
pub mod notifications;
pub mod password;
pub mod session_sweeper;
pub mod token_issuer;
