pub mod data;
pub mod health;
pub mod health_proxy;
pub mod upload;
