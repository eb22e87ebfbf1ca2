pub mod api;
pub mod app_state;
pub mod config;
pub mod router;
pub mod store;

pub use app_state::AppState;
pub use router::build_router;
