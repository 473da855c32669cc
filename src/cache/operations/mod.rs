pub mod connection;
pub mod presence;

pub use connection::{ConnectionRegistry, RedisConnectionRegistry};
pub use presence::{PresenceStore, RedisPresenceStore, WriteOutcome};
