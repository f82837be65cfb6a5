//! Handlers of the local callback server.

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
