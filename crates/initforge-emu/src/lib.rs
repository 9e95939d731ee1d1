//! Emulator-based boot testing for built initramfs images
//!
//! Wraps a QEMU invocation assembled from the store's `test_*` keys. A test
//! passes when the booted image prints the configured flag token before the
//! emulator exits within the timeout.

pub mod error;
pub mod runner;

pub use error::{EmuError, Result};
pub use runner::{TestReport, TestRunner};
