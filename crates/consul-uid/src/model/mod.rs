mod agent;
mod kv;
mod session;

pub use agent::*;
pub use kv::*;
pub use session::*;
