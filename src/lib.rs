pub mod audio;
pub mod kernel;
pub mod services;

// Re-exports for the binaries and tests
pub use kernel::config::PacerConfig;
pub use kernel::reactor::{Bindings, Reactor};
