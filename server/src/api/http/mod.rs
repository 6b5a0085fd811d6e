pub mod request;
pub mod server;
pub mod service;
