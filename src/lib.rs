pub mod auth;
pub mod capture;
pub mod comments;
pub mod config;
pub mod error;
pub mod ids;
pub mod kv;
pub mod models;
pub mod openapi;
pub mod persist;
pub mod routes;
pub mod storage; // photo bytes behind /images
pub mod store;
pub mod validation;

// Re-export commonly used items for tests / external users
pub use routes::AppState;
pub use store::{PostStore, StoreConfig, StoreError};
