pub mod gateway;

#[cfg(test)]
pub mod mock;

pub use gateway::{Gateway, ProxyGateway};
