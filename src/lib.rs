pub mod api;
pub mod config;
pub mod database;
pub mod http_response;
pub mod image_api;
pub mod logging;
pub mod models;
pub mod services;
pub mod store;
