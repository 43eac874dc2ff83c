// HTTP surface: the accept-invite endpoint and a health probe

pub mod routes;

pub use routes::{build_router, AppState};
