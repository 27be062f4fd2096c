pub mod account;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod geo;
pub mod session;
pub mod state;
pub mod store;
pub mod validation;
