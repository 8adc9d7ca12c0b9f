pub mod config;
pub mod events;
pub mod logger;
pub mod model;
pub mod routes;
