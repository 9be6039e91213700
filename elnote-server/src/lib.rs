pub mod config;
pub mod domain;
pub mod handlers;
pub mod object_store;
pub mod scheduler;
pub mod services;
pub mod url_signer;

mod app;
mod router;

pub use app::AppState;
pub use router::build_router;
