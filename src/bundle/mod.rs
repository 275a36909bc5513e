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

//! Aggregation of model sources into one compilable library.
//!
//! Besides the per-model files, [`ModuleBundle::build`] synthesizes the
//! library ABI consumed by [`NativeModule`](crate::native::NativeModule):
//!
//! | symbol | C signature |
//! |---|---|
//! | `adgen_library_version` | `uint64_t (void)` |
//! | `adgen_library_models` | `void (const char* const** names, uint64_t* count)` |
//! | `adgen_library_on_close` (optional) | `void (void)` |
//! | `adgen_library_set_thread_number` (optional) | `void (uint64_t)` |
//! | `adgen_library_get_thread_number` (optional) | `uint64_t (void)` |
//!
//! Each model `m` exports `m_info`, `m_forward_zero` and optionally
//! `m_jacobian`.

mod header;
mod model;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::eval::EvalError;
use crate::ir::GraphError;
use crate::naming::NameClash;

pub use header::generate_header;
pub use model::{ModelOptions, ModelSource, JACOBIAN_OUTPUT};

use model::validate_identifier;

/// ABI version stamped into every generated library. Loaders accept exactly
/// this value.
pub const API_VERSION: u64 = 1;

pub const VERSION_SYMBOL: &str = "adgen_library_version";
pub const MODELS_SYMBOL: &str = "adgen_library_models";
pub const ON_CLOSE_SYMBOL: &str = "adgen_library_on_close";
pub const SET_THREADS_SYMBOL: &str = "adgen_library_set_thread_number";
pub const GET_THREADS_SYMBOL: &str = "adgen_library_get_thread_number";

pub const FORWARD_ZERO_SUFFIX: &str = "_forward_zero";
pub const INFO_SUFFIX: &str = "_info";
pub const JACOBIAN_SUFFIX: &str = "_jacobian";

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("model '{0}' is already registered")]
    DuplicateModelName(String),
    #[error("source file '{0}' is already present in the bundle")]
    DuplicateSource(String),
    #[error("source file name is empty")]
    EmptyFileName,
    #[error("'{0}' is not a valid C identifier")]
    InvalidIdentifier(String),
    #[error(transparent)]
    NameClash(#[from] NameClash),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Stem of the generated header and, by convention, of the library.
    pub library_name: String,
    pub on_close: bool,
    /// C statements placed in the teardown hook.
    pub on_close_body: Option<String>,
    pub thread_pool: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            library_name: "adgen_models".to_string(),
            on_close: true,
            on_close_body: None,
            thread_pool: false,
        }
    }
}

/// Registered models plus custom sources, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModuleBundle {
    options: BundleOptions,
    models: Vec<ModelSource>,
    custom: BTreeMap<String, String>,
}

impl ModuleBundle {
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            models: Vec::new(),
            custom: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn add_model(&mut self, model: ModelSource) -> Result<(), BundleError> {
        if self.models.iter().any(|m| m.name() == model.name()) {
            return Err(BundleError::DuplicateModelName(model.name().to_string()));
        }
        debug!(model = model.name(), "registered model");
        self.models.push(model);
        Ok(())
    }

    /// Merge a user file verbatim under `file_name`.
    pub fn add_custom_source(
        &mut self,
        file_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), BundleError> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(BundleError::EmptyFileName);
        }
        if self.custom.contains_key(&file_name) {
            return Err(BundleError::DuplicateSource(file_name));
        }
        self.custom.insert(file_name, content.into());
        Ok(())
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(ModelSource::name).collect()
    }

    pub fn models(&self) -> &[ModelSource] {
        &self.models
    }

    /// All files of the library: model sources, ABI boilerplate, header and
    /// custom sources.
    pub fn build(&self) -> Result<BTreeMap<String, String>, BundleError> {
        let library = &self.options.library_name;
        validate_identifier(library)?;

        let mut files = BTreeMap::new();
        for model in &self.models {
            for (name, content) in model.files() {
                insert_unique(&mut files, name.clone(), content.clone())?;
            }
        }

        insert_unique(
            &mut files,
            format!("{VERSION_SYMBOL}.c"),
            format!(
                "#include <stdint.h>\n\nuint64_t {VERSION_SYMBOL}(void) {{\n    return {API_VERSION};\n}}\n"
            ),
        )?;
        insert_unique(&mut files, format!("{MODELS_SYMBOL}.c"), self.models_source())?;
        if self.options.on_close {
            insert_unique(&mut files, format!("{ON_CLOSE_SYMBOL}.c"), self.on_close_source())?;
        }
        if self.options.thread_pool {
            insert_unique(
                &mut files,
                "adgen_library_thread_pool.c".to_string(),
                thread_pool_source(),
            )?;
        }
        insert_unique(
            &mut files,
            format!("{library}.h"),
            generate_header(
                library,
                &self.models,
                self.options.on_close,
                self.options.thread_pool,
            ),
        )?;

        for (name, content) in &self.custom {
            insert_unique(&mut files, name.clone(), content.clone())?;
        }

        info!(
            library = library.as_str(),
            models = self.models.len(),
            files = files.len(),
            "built module bundle"
        );
        Ok(files)
    }

    /// Write every file of [`ModuleBundle::build`] into `dir`.
    pub fn save_sources(&self, dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
        let files = self.build()?;
        fs::create_dir_all(dir).map_err(|source| BundleError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let path = dir.join(&name);
            fs::write(&path, content).map_err(|source| BundleError::Io {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        info!(dir = %dir.display(), files = written.len(), "saved bundle sources");
        Ok(written)
    }

    fn models_source(&self) -> String {
        let mut src = String::from("#include <stdint.h>\n\n");
        let names: Vec<String> = self
            .models
            .iter()
            .map(|m| format!("\"{}\"", m.name()))
            .collect();
        let initializer = if names.is_empty() {
            "0".to_string()
        } else {
            names.join(", ")
        };
        writeln!(src, "static const char* const models[] = {{{initializer}}};\n").ok();
        writeln!(
            src,
            "void {MODELS_SYMBOL}(const char* const** names, uint64_t* count) {{"
        )
        .ok();
        writeln!(src, "    *names = models;\n    *count = {};\n}}", names.len()).ok();
        src
    }

    fn on_close_source(&self) -> String {
        let body = self.options.on_close_body.as_deref().unwrap_or("");
        let mut src = format!("void {ON_CLOSE_SYMBOL}(void) {{\n");
        for line in body.lines() {
            writeln!(src, "    {line}").ok();
        }
        src.push_str("}\n");
        src
    }
}

fn thread_pool_source() -> String {
    format!(
        r#"#include <stdint.h>

static uint64_t thread_number = 1;

void {SET_THREADS_SYMBOL}(uint64_t n) {{
    thread_number = n == 0 ? 1 : n;
}}

uint64_t {GET_THREADS_SYMBOL}(void) {{
    return thread_number;
}}
"#
    )
}

fn insert_unique(
    files: &mut BTreeMap<String, String>,
    name: String,
    content: String,
) -> Result<(), BundleError> {
    if files.contains_key(&name) {
        return Err(BundleError::DuplicateSource(name));
    }
    files.insert(name, content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Graph, UnaryOp};

    fn model(name: &str) -> ModelSource {
        let mut g = Graph::new();
        let x = g.independent();
        let s = g.unary(UnaryOp::Sin, x).unwrap();
        g.mark_dependent(s).unwrap();
        ModelSource::new(name, &g).unwrap()
    }

    #[test]
    fn duplicate_model_names_are_rejected() {
        let mut bundle = ModuleBundle::default();
        bundle.add_model(model("a")).unwrap();
        let err = bundle.add_model(model("a")).unwrap_err();
        assert!(matches!(err, BundleError::DuplicateModelName(name) if name == "a"));
        assert_eq!(bundle.model_names(), vec!["a"]);
    }

    #[test]
    fn directory_lists_models_in_registration_order() {
        let mut bundle = ModuleBundle::new(BundleOptions::default());
        bundle.add_model(model("second")).unwrap();
        bundle.add_model(model("first")).unwrap();
        let files = bundle.build().unwrap();
        let dir = &files["adgen_library_models.c"];
        assert!(dir.contains("{\"second\", \"first\"}"));
        assert!(dir.contains("*count = 2;"));
        assert!(files["adgen_library_version.c"].contains("return 1;"));
    }

    #[test]
    fn custom_sources_cannot_shadow_generated_files() {
        let mut bundle = ModuleBundle::default();
        bundle.add_model(model("m")).unwrap();
        bundle.add_custom_source("m.c", "int x;").unwrap();
        assert!(matches!(
            bundle.build().unwrap_err(),
            BundleError::DuplicateSource(name) if name == "m.c"
        ));
        assert!(matches!(
            bundle.add_custom_source("m.c", "int y;").unwrap_err(),
            BundleError::DuplicateSource(_)
        ));
    }
}
