pub mod component;
pub mod config;
pub mod error;
pub mod handler;
pub mod online;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod world;
