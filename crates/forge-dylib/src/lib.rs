// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Loads shared libraries and resolves typed symbols from them, wrapping
//! `libloading` in the crate's thiserror/tracing conventions.

use std::{marker::PhantomData, ops::Deref, path::Path};

pub type Result<T, E = DylibError> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DylibError {
    #[error("failed to load shared library: {0}")]
    LoadFailed(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
}

/// An owned handle to a loaded shared library image.
pub struct Library {
    inner: libloading::Library,
    path: String,
}

impl Library {
    /// Loads the shared library at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = unsafe { libloading::Library::new(path) }
            .map_err(|err| DylibError::LoadFailed(err.to_string()))?;
        tracing::debug!(path = %path.display(), "loaded shared library");
        Ok(Self {
            inner,
            path: path.display().to_string(),
        })
    }

    /// Opens a handle to the current process image, for resolving symbols
    /// already linked into the running binary.
    pub fn open_self() -> Result<Self> {
        let inner = unsafe { libloading::Library::this() };
        Ok(Self {
            inner,
            path: "<self>".to_string(),
        })
    }

    /// Resolves `name` to a typed symbol. `T` is typically an `unsafe
    /// extern "C" fn(...)` pointer type or a `#[repr(C)]` data type; the
    /// caller is responsible for the type actually matching the symbol.
    ///
    /// # Safety
    /// The caller must ensure `T` accurately describes the memory or
    /// function the named symbol points to.
    pub unsafe fn get<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>> {
        let symbol = self.inner.get::<T>(name).map_err(|_| {
            DylibError::SymbolNotFound(String::from_utf8_lossy(name).into_owned())
        })?;
        Ok(Symbol {
            inner: symbol,
            _marker: PhantomData,
        })
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path, "released shared library");
    }
}

/// A resolved, typed symbol borrowed from a [`Library`]. Cannot outlive the
/// library it came from.
pub struct Symbol<'lib, T> {
    inner: libloading::Symbol<'lib, T>,
    _marker: PhantomData<&'lib ()>,
}

impl<'lib, T> Deref for Symbol<'lib, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_self_succeeds() {
        Library::open_self().expect("the current process image should always be loadable");
    }

    #[test]
    fn missing_symbol_reports_symbol_not_found() {
        let lib = Library::open_self().unwrap();
        let result = unsafe { lib.get::<extern "C" fn()>(b"forge_dylib_definitely_missing_symbol\0") };
        assert!(matches!(result, Err(DylibError::SymbolNotFound(_))));
    }
}
