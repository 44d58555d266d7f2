// === MODULE DEFINITION ===
pub mod module;
pub use module::{CatsModule, StorageModule, StorageOptions};

// === INTERNAL MODULES ===
// Exposed for integration tests and the demo binary; not a stable API.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
