//! Hook phase names
//!
//! The pipeline runs the build phases in a fixed order; the init phases are
//! the expansion of the init-generation step and become sections of the
//! generated init script.

pub const BUILD_PRE: &str = "build_pre";
pub const BUILD_TASKS: &str = "build_tasks";
pub const BUILD_FINAL: &str = "build_final";
pub const PACK: &str = "pack";
pub const CHECKS: &str = "checks";
pub const TESTS: &str = "tests";

pub const INIT_PRE: &str = "init_pre";
pub const INIT_FINAL: &str = "init_final";

/// Init phases between `init_pre` and `init_final`, replaced wholesale by a
/// registered custom-init function.
pub const INIT_SEQUENCE: [&str; 8] = [
    "init_debug",
    "init_early",
    "init_main",
    "init_late",
    "init_premount",
    "init_mount",
    "init_mount_late",
    "init_cleanup",
];
