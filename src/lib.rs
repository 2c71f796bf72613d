// Flagpole - feature flag resolution for Rust services
//
// This crate bundles the resolution engine with its optional logging and
// testing companions behind cargo features.

// Re-export core functionality
pub use flagpole_core::*;

// Re-export optional crates
#[cfg(feature = "log")]
pub use flagpole_log;

#[cfg(feature = "testing")]
pub use flagpole_testing;
