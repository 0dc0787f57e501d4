//! Progress event transports.

pub mod fanout;
pub mod hub;
pub mod webhook;

pub use fanout::FanoutNotifier;
pub use hub::EventHub;
pub use webhook::WebhookNotifier;
