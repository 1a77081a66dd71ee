pub mod analytics;
pub mod api;
pub mod auth;
pub mod store;
pub mod upload;
pub mod validation;
