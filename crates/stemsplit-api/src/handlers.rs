//! Route handlers, one module per endpoint.

pub mod health;
pub mod split;
pub mod status;

pub use health::health;
pub use split::submit_split;
pub use status::queue_status;
