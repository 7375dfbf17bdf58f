// trait definitions for ports

mod client_registry;
mod database;

pub use client_registry::*;
pub use database::*;
