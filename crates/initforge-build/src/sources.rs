//! Built-in function sources
//!
//! These bridge the archive and emulator crates into the hook pipeline.
//! Shipped module descriptors import them through the `fs.cpio` and
//! `base.test` source identifiers.

use initforge_archive::make_cpio;
use initforge_config::ConfigStore;
use initforge_emu::TestRunner;
use initforge_modules::{FunctionSource, HookFunction, ScriptOutput, SourceRegistry};

/// The registry of built-in sources, populated at process start.
pub fn builtin_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(
        FunctionSource::new("fs.cpio")
            .with_function(HookFunction { name: "make_cpio", run: make_cpio_hook }),
    );
    registry.register(
        FunctionSource::new("base.test")
            .with_function(HookFunction { name: "test_image", run: test_image_hook }),
    );
    registry
}

/// Pack hook: archive the build directory.
fn make_cpio_hook(store: &mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>> {
    let path = make_cpio(store)?;
    tracing::info!("Created archive: {}", path.display());
    Ok(None)
}

/// Tests hook: boot the packed archive and check for the flag token.
fn test_image_hook(store: &mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>> {
    let runner = TestRunner::from_store(store)?;
    let report = runner.run()?;
    match report.elapsed {
        Some(seconds) => tracing::info!("Boot test passed in {:.3}s", seconds),
        None => tracing::info!("Boot test passed"),
    }
    Ok(None)
}
