//! API route handlers

pub mod debug;
pub mod entries;
pub mod health;
pub mod revalidate;
