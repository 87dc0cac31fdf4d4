//! Request handlers.

pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod uploads;

pub use artifacts::*;
pub use health::*;
pub use jobs::*;
pub use uploads::*;
