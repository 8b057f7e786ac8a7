mod sleep_provider;
mod strategy;

pub use sleep_provider::*;
pub use strategy::*;
