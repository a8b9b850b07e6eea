//! Instrumented toolchain

use razorkit_core::compile::{
    BuildOutput, CompileOptions, IrToolchain, ReferenceHandle, Toolchain,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Wraps [`IrToolchain`], counting builds and optionally slowing them down
/// so concurrent callers overlap
#[derive(Debug, Default)]
pub struct CountingToolchain {
    builds: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    /// Number of builds started so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Toolchain for CountingToolchain {
    fn build(
        &self,
        source: &str,
        options: &CompileOptions,
        references: &[ReferenceHandle],
    ) -> BuildOutput {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        IrToolchain.build(source, options, references)
    }
}
