//! Kernel modules backed by compiled shared libraries.
//!
//! A producer toolchain emits kernels as C symbols with a uniform
//! signature: parallel argument-value and type-code arrays plus a count,
//! returning zero on success. `DylibModule` opens such a library and
//! resolves kernel names to [`PackedFunc`]s; each resolved function keeps
//! the library mapped for as long as it circulates.

use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use thiserror::Error;

use graphrt::module::{KernelError, KernelModule, PackedArgs, PackedFunc, PackedValue};

/// C signature of a kernel entry point inside a compiled module.
pub type RawPackedKernel =
    unsafe extern "C" fn(values: *const PackedValue, type_codes: *const i32, num_args: i32) -> i32;

#[derive(Debug, Error)]
pub enum DylibError {
    #[error("failed to load kernel library: {0}")]
    Open(#[from] libloading::Error),
}

/// A kernel module loaded from a shared library on disk.
pub struct DylibModule {
    lib: Arc<Library>,
}

impl DylibModule {
    /// Opens the shared library at `path`.
    ///
    /// # Safety
    /// Loading a library runs its initializers; the caller must trust the
    /// module to be a well-formed kernel library produced for this
    /// convention.
    pub unsafe fn open(path: impl AsRef<Path>) -> Result<Self, DylibError> {
        let lib = Library::new(path.as_ref())?;
        Ok(Self { lib: Arc::new(lib) })
    }
}

impl KernelModule for DylibModule {
    fn lookup(&self, name: &str) -> Option<PackedFunc> {
        let raw: RawPackedKernel = unsafe {
            let symbol = self.lib.get::<RawPackedKernel>(name.as_bytes()).ok()?;
            *symbol
        };
        let lib = Arc::clone(&self.lib);
        Some(Arc::new(move |args: PackedArgs<'_>| {
            let _keep_loaded = &lib;
            let status =
                unsafe { raw(args.values.as_ptr(), args.type_codes.as_ptr(), args.len() as i32) };
            if status != 0 {
                return Err(KernelError::Status(status));
            }
            Ok(())
        }))
    }
}
