//! Route handlers

pub mod clients;
pub mod health;
