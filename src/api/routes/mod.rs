//! API Routes
//!
//! Route handlers organized by functionality.

pub mod export;
pub mod feeds;
pub mod health;
