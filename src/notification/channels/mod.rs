//! 具体渠道实现

pub mod pushover;
pub mod webhook;

#[cfg(test)]
mod test_server;

pub use pushover::PushoverChannel;
pub use webhook::WebhookChannel;
