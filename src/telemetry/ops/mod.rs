pub mod init;
pub mod generate;
pub mod campaign;
pub mod quota;
pub mod plan;
pub mod profile;
pub mod proxy;
