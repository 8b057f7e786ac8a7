#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;
mod wire;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::error::*;
