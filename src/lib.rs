pub mod app;
pub mod config;
pub mod db;
pub mod env;
pub mod github;
pub mod models;
pub mod paths;
pub mod ports;
pub mod remote;
pub mod shell;
