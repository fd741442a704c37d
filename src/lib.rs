//! Profile Intake: chat-driven CV intake with a versioned profile history.

pub mod channels;
pub mod config;
pub mod error;
pub mod parser;
pub mod profiles;
pub mod router;
pub mod routes;
pub mod store;
