pub mod applications;
pub mod auth;
pub mod files;
pub mod responses;
pub mod router;
pub mod session;
pub mod state;
pub mod subjects;
pub mod uploads;

pub use state::AppState;
