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

//! Loader for compiled model libraries.
//!
//! A [`NativeModule`] moves through `Closed -> Open -> Validated`; it reports
//! `Serving` while model handles are alive. Handles keep only a weak
//! reference to the module's registry. Closing the module marks every live
//! handle dead before the teardown hook runs and the library is unloaded, so
//! a handle that outlives its module fails with [`NativeError::ModuleClosed`]
//! instead of calling into unmapped code.
//!
//! That check is only sound on one thread: handles are neither `Send` nor
//! `Sync`, and a module cannot be sent away from its handles.
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<adgen::ModelHandle>();
//! ```
//!
//! ```compile_fail
//! fn assert_sync<T: Sync>() {}
//! assert_sync::<adgen::ModelHandle>();
//! ```
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<adgen::NativeModule>();
//! ```

mod symbols;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::bundle::{
    API_VERSION, FORWARD_ZERO_SUFFIX, GET_THREADS_SYMBOL, INFO_SUFFIX, JACOBIAN_SUFFIX,
    MODELS_SYMBOL, ON_CLOSE_SYMBOL, SET_THREADS_SYMBOL, VERSION_SYMBOL,
};

use symbols::{
    call_forward, call_get_threads, call_info, call_models, call_set_threads, call_version,
    call_void, ForwardFn, GetThreadsFn, InfoFn, ModelsFn, SetThreadsFn, SymbolTable, VersionFn,
    VoidFn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Closed,
    Open,
    Validated,
    /// Validated with at least one live model handle.
    Serving,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("failed to load {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },
    #[error("ABI version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("required symbol '{symbol}' not found")]
    MissingSymbol { symbol: String },
    #[error("model '{name}' is not provided by this module")]
    NotFound { name: String },
    #[error("cannot {operation} a module in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ModuleState,
    },
    #[error("the module backing model '{model}' has been closed")]
    ModuleClosed { model: String },
    #[error("expected {expected} values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Liveness flag shared between a module and one handle.
#[derive(Debug)]
struct HandleLink {
    open: AtomicBool,
    notices: AtomicUsize,
}

impl HandleLink {
    fn notify(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.notices.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct HandleRegistry {
    live: Mutex<BTreeMap<u64, Arc<HandleLink>>>,
    next_key: AtomicU64,
}

impl HandleRegistry {
    fn register(&self) -> (u64, Arc<HandleLink>) {
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        let link = Arc::new(HandleLink {
            open: AtomicBool::new(true),
            notices: AtomicUsize::new(0),
        });
        self.lock().insert(key, Arc::clone(&link));
        (key, link)
    }

    fn deregister(&self, key: u64) {
        self.lock().remove(&key);
    }

    /// Mark every live handle dead and forget it; returns how many were live.
    fn notify_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        for link in drained.values() {
            link.notify();
        }
        drained.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Arc<HandleLink>>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Symbols resolved by [`NativeModule::validate`].
struct Abi {
    version: u64,
    models: Vec<String>,
    on_close: Option<VoidFn>,
    set_threads: Option<SetThreadsFn>,
    get_threads: Option<GetThreadsFn>,
}

pub struct NativeModule {
    path: PathBuf,
    symbols: Option<SymbolTable>,
    abi: Option<Abi>,
    registry: Arc<HandleRegistry>,
    /// `!Send`, still `Sync` so handles can be bound from scoped threads.
    _pinned: PhantomData<std::sync::MutexGuard<'static, ()>>,
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("models", &self.model_names())
            .finish()
    }
}

impl NativeModule {
    /// A closed module for `path`. Bare file names resolve against the
    /// current directory rather than the system library search path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: resolve_path(path.as_ref()),
            symbols: None,
            abi: None,
            registry: Arc::new(HandleRegistry::default()),
            _pinned: PhantomData,
        }
    }

    /// `new`, `open` and `validate` in one step.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NativeError> {
        let mut module = Self::new(path);
        module.open()?;
        module.validate()?;
        Ok(module)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ModuleState {
        match (&self.symbols, &self.abi) {
            (None, _) => ModuleState::Closed,
            (Some(_), None) => ModuleState::Open,
            (Some(_), Some(_)) if self.registry.len() > 0 => ModuleState::Serving,
            (Some(_), Some(_)) => ModuleState::Validated,
        }
    }

    pub fn open(&mut self) -> Result<(), NativeError> {
        self.expect_state("open", &[ModuleState::Closed])?;
        if !self.path.exists() {
            return Err(NativeError::Load {
                path: self.path.clone(),
                message: "no such file".to_string(),
            });
        }
        self.symbols = Some(SymbolTable::open(&self.path)?);
        info!(path = %self.path.display(), "opened native module");
        Ok(())
    }

    /// Check the ABI version and read the model directory. On failure the
    /// module is closed again.
    pub fn validate(&mut self) -> Result<(), NativeError> {
        self.expect_state("validate", &[ModuleState::Open])?;
        match self.resolve_abi() {
            Ok(abi) => {
                info!(
                    path = %self.path.display(),
                    version = abi.version,
                    models = abi.models.len(),
                    "validated native module"
                );
                self.abi = Some(abi);
                Ok(())
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "rejected native module");
                if let Err(close_err) = self.unload() {
                    warn!(
                        path = %self.path.display(),
                        error = %close_err,
                        "failed to unload rejected native module"
                    );
                }
                Err(err)
            }
        }
    }

    fn resolve_abi(&self) -> Result<Abi, NativeError> {
        let Some(symbols) = &self.symbols else {
            return Err(NativeError::InvalidState {
                operation: "validate",
                state: ModuleState::Closed,
            });
        };
        let version = call_version(symbols.required::<VersionFn>(VERSION_SYMBOL)?);
        if version != API_VERSION {
            return Err(NativeError::VersionMismatch {
                expected: API_VERSION,
                found: version,
            });
        }
        let models = call_models(symbols.required::<ModelsFn>(MODELS_SYMBOL)?);
        Ok(Abi {
            version,
            models,
            on_close: symbols.optional::<VoidFn>(ON_CLOSE_SYMBOL),
            set_threads: symbols.optional::<SetThreadsFn>(SET_THREADS_SYMBOL),
            get_threads: symbols.optional::<GetThreadsFn>(GET_THREADS_SYMBOL),
        })
    }

    /// Bind a handle to the model `name`.
    pub fn model(&self, name: &str) -> Result<ModelHandle, NativeError> {
        self.expect_state("create a model from", &[ModuleState::Validated, ModuleState::Serving])?;
        let (Some(symbols), Some(abi)) = (&self.symbols, &self.abi) else {
            return Err(NativeError::InvalidState {
                operation: "create a model from",
                state: self.state(),
            });
        };
        if !abi.models.iter().any(|m| m == name) {
            return Err(NativeError::NotFound {
                name: name.to_string(),
            });
        }

        let info = symbols.required::<InfoFn>(&format!("{name}{INFO_SUFFIX}"))?;
        let forward = symbols.required::<ForwardFn>(&format!("{name}{FORWARD_ZERO_SUFFIX}"))?;
        let jacobian = symbols.optional::<ForwardFn>(&format!("{name}{JACOBIAN_SUFFIX}"));
        let (domain, range) = call_info(info);

        let (key, link) = self.registry.register();
        debug!(model = name, domain, range, key, "bound model handle");
        Ok(ModelHandle {
            name: name.to_string(),
            domain,
            range,
            forward,
            jacobian,
            link,
            registry: Arc::downgrade(&self.registry),
            key,
            _not_send: PhantomData,
        })
    }

    /// Notify live handles, run the teardown hook and unload. Closing a
    /// closed module is a no-op.
    pub fn close(&mut self) -> Result<(), NativeError> {
        if self.symbols.is_none() {
            return Ok(());
        }
        self.unload()
    }

    fn unload(&mut self) -> Result<(), NativeError> {
        let notified = self.registry.notify_all();
        if let Some(on_close) = self.abi.take().and_then(|abi| abi.on_close) {
            call_void(on_close);
        }
        if let Some(symbols) = self.symbols.take() {
            symbols.close()?;
        }
        info!(path = %self.path.display(), handles = notified, "closed native module");
        Ok(())
    }

    /// Model names from the directory; empty until validated.
    pub fn model_names(&self) -> &[String] {
        self.abi.as_ref().map_or(&[][..], |abi| abi.models.as_slice())
    }

    pub fn api_version(&self) -> Option<u64> {
        self.abi.as_ref().map(|abi| abi.version)
    }

    pub fn live_handles(&self) -> usize {
        self.registry.len()
    }

    /// Worker threads of the loaded library; 1 when it has no thread pool.
    pub fn thread_number(&self) -> usize {
        match self.abi.as_ref().and_then(|abi| abi.get_threads) {
            Some(get) => call_get_threads(get) as usize,
            None => 1,
        }
    }

    /// Ignored when the library has no thread pool.
    pub fn set_thread_number(&self, n: usize) {
        if let Some(set) = self.abi.as_ref().and_then(|abi| abi.set_threads) {
            call_set_threads(set, n as u64);
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[ModuleState],
    ) -> Result<(), NativeError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(NativeError::InvalidState { operation, state })
        }
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to close native module");
        }
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() || path.starts_with(".") || path.starts_with("..") {
        path.to_path_buf()
    } else {
        Path::new(".").join(path)
    }
}

/// Callable model bound to a [`NativeModule`].
pub struct ModelHandle {
    name: String,
    domain: usize,
    range: usize,
    forward: ForwardFn,
    jacobian: Option<ForwardFn>,
    link: Arc<HandleLink>,
    registry: Weak<HandleRegistry>,
    key: u64,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("range", &self.range)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> usize {
        self.domain
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.link.open.load(Ordering::SeqCst)
    }

    /// Teardown notices received from the module (0 or 1).
    pub fn teardown_notices(&self) -> usize {
        self.link.notices.load(Ordering::SeqCst)
    }

    pub fn forward_zero(&self, x: &[f64]) -> Result<Vec<f64>, NativeError> {
        self.invoke(self.forward, x, self.range)
    }

    /// Dense row-major `range x domain` Jacobian.
    pub fn jacobian(&self, x: &[f64]) -> Result<Vec<f64>, NativeError> {
        let Some(jacobian) = self.jacobian else {
            return Err(NativeError::MissingSymbol {
                symbol: format!("{}{JACOBIAN_SUFFIX}", self.name),
            });
        };
        self.invoke(jacobian, x, self.range * self.domain)
    }

    fn invoke(&self, f: ForwardFn, x: &[f64], outputs: usize) -> Result<Vec<f64>, NativeError> {
        if !self.is_alive() {
            return Err(NativeError::ModuleClosed {
                model: self.name.clone(),
            });
        }
        if x.len() != self.domain {
            return Err(NativeError::DimensionMismatch {
                expected: self.domain,
                found: x.len(),
            });
        }
        let mut y = vec![0.0; outputs];
        call_forward(f, x, &mut y);
        Ok(y)
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_resolve_against_the_working_directory() {
        assert_eq!(resolve_path(Path::new("libm.so")), Path::new("./libm.so"));
        assert_eq!(resolve_path(Path::new("../x.so")), Path::new("../x.so"));
        assert_eq!(resolve_path(Path::new("/tmp/x.so")), Path::new("/tmp/x.so"));
    }

    #[test]
    fn missing_files_fail_to_open() {
        let mut module = NativeModule::new("./definitely/not/here.so");
        assert!(matches!(module.open(), Err(NativeError::Load { .. })));
        assert_eq!(module.state(), ModuleState::Closed);
    }

    #[test]
    fn operations_check_the_state() {
        let mut module = NativeModule::new("nothing.so");
        assert_eq!(
            module.validate().unwrap_err(),
            NativeError::InvalidState {
                operation: "validate",
                state: ModuleState::Closed
            }
        );
        assert!(matches!(
            module.model("m"),
            Err(NativeError::InvalidState { .. })
        ));
        assert_eq!(module.thread_number(), 1);
        assert!(module.close().is_ok());
    }

    #[test]
    fn modules_can_be_shared_with_scoped_threads() {
        let module = NativeModule::new("nothing.so");
        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(matches!(
                    module.model("m"),
                    Err(NativeError::InvalidState { .. })
                ));
            });
        });
    }

    #[test]
    fn notices_are_delivered_once() {
        let registry = HandleRegistry::default();
        let (_, a) = registry.register();
        let (_, b) = registry.register();
        assert_eq!(registry.notify_all(), 2);
        assert_eq!(registry.notify_all(), 0);
        a.notify();
        assert_eq!(a.notices.load(Ordering::SeqCst), 1);
        assert_eq!(b.notices.load(Ordering::SeqCst), 1);
        assert!(!b.open.load(Ordering::SeqCst));
    }
}
