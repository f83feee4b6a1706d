//! Credential, secret, and cookie models shared across the session layers.

pub mod cookie;
pub mod credentials;
pub mod secret;

pub use cookie::*;
pub use credentials::*;
pub use secret::*;
