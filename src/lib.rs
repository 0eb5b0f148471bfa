pub mod audit;
pub mod auth;
pub mod configuration;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod security;
pub mod services;
pub mod startup;
pub mod store;
pub mod sweeper;
pub mod telemetry;
pub mod validators;
