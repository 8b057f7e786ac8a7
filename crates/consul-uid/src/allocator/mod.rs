mod config;
mod lease;
mod uid;

pub use config::*;
pub use uid::*;
