//! Dispatch targets — the two ways a fired job delivers its payload.

pub mod http;
pub mod pubsub;

pub use http::HttpDispatcher;
pub use pubsub::PubsubDispatcher;
