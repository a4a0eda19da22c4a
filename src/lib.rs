pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pricing;
pub mod session;
pub mod tree_render;

pub use error::{Error, Result};
