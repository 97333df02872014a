pub mod api;
pub mod board;
pub mod config;
pub mod db;
pub mod errors;
pub mod scope;
pub mod server;
