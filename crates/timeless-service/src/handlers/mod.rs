//! HTTP request handlers.

pub mod credits;
pub mod generations;
pub mod health;
pub mod profiles;
pub mod tickets;
pub mod tools;
