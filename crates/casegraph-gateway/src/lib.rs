mod display;
mod pages;
mod routes;
mod server;
mod state;
mod store;

pub use display::{format_for_display, DisplayStats};
pub use server::{router, GatewayServer};
pub use state::AppState;
pub use store::InMemoryResultStore;
