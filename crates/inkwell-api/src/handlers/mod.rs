//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod authors;
pub mod health;
pub mod notifications;
pub mod posts;
