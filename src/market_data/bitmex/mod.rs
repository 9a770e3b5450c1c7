pub mod connector;
pub mod message;
