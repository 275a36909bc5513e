// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the ADGEN project (Algorithmic Differentiation code GENeration).

//! Typed symbol resolution and calls across the library boundary.
//!
//! Every `unsafe` block of the crate lives in this file. Function pointers
//! handed out by [`SymbolTable`] are valid only while the table is open;
//! callers guard that with the handle liveness flags in the parent module.

use std::ffi::{c_char, CStr};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::NativeError;

pub(crate) type VersionFn = unsafe extern "C" fn() -> u64;
pub(crate) type ModelsFn = unsafe extern "C" fn(*mut *const *const c_char, *mut u64);
pub(crate) type VoidFn = unsafe extern "C" fn();
pub(crate) type SetThreadsFn = unsafe extern "C" fn(u64);
pub(crate) type GetThreadsFn = unsafe extern "C" fn() -> u64;
pub(crate) type InfoFn = unsafe extern "C" fn(*mut u64, *mut u64);
pub(crate) type ForwardFn = unsafe extern "C" fn(*const f64, *mut f64);

pub(crate) struct SymbolTable {
    library: Library,
    path: PathBuf,
}

impl SymbolTable {
    pub(crate) fn open(path: &Path) -> Result<Self, NativeError> {
        // SAFETY: loading runs the library's initializers. Generated bundles
        // have none; arbitrary libraries are the caller's responsibility.
        let library = unsafe { Library::new(path) }.map_err(|err| NativeError::Load {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Resolve `name` as a function pointer of type `T`.
    ///
    /// `T` must be one of the `extern "C"` function pointer aliases above and
    /// must match the C signature of the symbol.
    pub(crate) fn optional<T: Copy>(&self, name: &str) -> Option<T> {
        // SAFETY: the aliases mirror the declarations in the generated header.
        unsafe { self.library.get::<T>(name.as_bytes()) }
            .ok()
            .map(|symbol| *symbol)
    }

    pub(crate) fn required<T: Copy>(&self, name: &str) -> Result<T, NativeError> {
        self.optional(name).ok_or_else(|| NativeError::MissingSymbol {
            symbol: name.to_string(),
        })
    }

    pub(crate) fn close(self) -> Result<(), NativeError> {
        let path = self.path;
        self.library.close().map_err(|err| NativeError::Load {
            path,
            message: err.to_string(),
        })
    }
}

pub(crate) fn call_version(f: VersionFn) -> u64 {
    // SAFETY: no arguments; the library is open.
    unsafe { f() }
}

pub(crate) fn call_models(f: ModelsFn) -> Vec<String> {
    let mut names: *const *const c_char = std::ptr::null();
    let mut count: u64 = 0;
    // SAFETY: both out-pointers are valid for writes.
    unsafe { f(&mut names, &mut count) };
    if names.is_null() {
        return Vec::new();
    }
    (0..count as usize)
        .filter_map(|i| {
            // SAFETY: the directory holds `count` entries of static,
            // nul-terminated strings.
            let entry = unsafe { *names.add(i) };
            if entry.is_null() {
                None
            } else {
                Some(unsafe { CStr::from_ptr(entry) }.to_string_lossy().into_owned())
            }
        })
        .collect()
}

pub(crate) fn call_void(f: VoidFn) {
    // SAFETY: no arguments; the library is open.
    unsafe { f() }
}

pub(crate) fn call_set_threads(f: SetThreadsFn, n: u64) {
    // SAFETY: plain value argument; the library is open.
    unsafe { f(n) }
}

pub(crate) fn call_get_threads(f: GetThreadsFn) -> u64 {
    // SAFETY: no arguments; the library is open.
    unsafe { f() }
}

pub(crate) fn call_info(f: InfoFn) -> (usize, usize) {
    let (mut n, mut m) = (0u64, 0u64);
    // SAFETY: both out-pointers are valid for writes.
    unsafe { f(&mut n, &mut m) };
    (n as usize, m as usize)
}

/// `x` and `y` must have the lengths the entry point was generated for.
pub(crate) fn call_forward(f: ForwardFn, x: &[f64], y: &mut [f64]) {
    // SAFETY: lengths are checked by the caller against the model info.
    unsafe { f(x.as_ptr(), y.as_mut_ptr()) }
}
