//! Fyuse try-on job client
//!
//! This library drives the asynchronous jobs behind the virtual try-on and
//! styling recommendation flows: it submits a pair of image references to
//! the backend, polls the job until it settles, and reports each step as a
//! view the UI can render.

pub mod config;
pub mod models;
pub mod services;
pub mod workflow;
