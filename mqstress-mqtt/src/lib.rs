#![forbid(unsafe_code)]

mod connector;
mod endpoint;
mod session;

pub use connector::MqttConnector;
pub use endpoint::{Endpoint, Scheme};
