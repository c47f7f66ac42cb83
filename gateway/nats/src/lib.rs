pub mod natsclient;

pub use natsclient::{NatsBroker, NatsConfig};
