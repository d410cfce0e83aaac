pub mod api;
pub mod config;
pub mod debounce;
pub mod error;
pub mod models;
pub mod navigation;
pub mod session;
pub mod state;
pub mod store;
pub mod view;
