pub mod auth;
pub mod habits;

pub use auth::*;
pub use habits::*;
