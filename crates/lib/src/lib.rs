//! pushrelay core library: routes received push messages to a relay queue, the notification
//! presenter, and an optional host observer.

pub mod config;
pub mod message;
pub mod metadata;
pub mod notify;
pub mod probe;
pub mod relay;
pub mod resolver;
pub mod router;

pub use message::InboundMessage;
pub use probe::AppState;
pub use router::{MessageRouter, Presentation, RouteReport};
