mod allocator;
mod backoff;
mod coordinator;
mod error;
mod identity;
mod model;
mod namespace;

pub use crate::allocator::*;
pub use crate::backoff::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::identity::*;
pub use crate::model::*;
pub use crate::namespace::*;
