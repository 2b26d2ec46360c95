//! An in-process kernel module: a plain name-to-function registry.

use std::collections::HashMap;
use std::sync::Arc;

use graphrt::module::{KernelError, KernelModule, PackedArgs, PackedFunc};

/// Maps kernel names to Rust closures obeying the packed-call convention.
/// Register everything up front, then hand the module to the executor.
#[derive(Default)]
pub struct HostKernelModule {
    kernels: HashMap<String, PackedFunc>,
}

impl HostKernelModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, kernel: F)
    where
        F: Fn(PackedArgs<'_>) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        self.kernels.insert(name.into(), Arc::new(kernel));
    }
}

impl KernelModule for HostKernelModule {
    fn lookup(&self, name: &str) -> Option<PackedFunc> {
        self.kernels.get(name).cloned()
    }
}
