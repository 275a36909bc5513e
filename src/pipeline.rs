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

//! High-level generation pipeline used by the `adgenc` front-end.
//!
//! The helpers parse and verify graph files, then either bundle them into a
//! C library or render them as typeset equations.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::bundle::{BundleError, ModelSource, ModuleBundle};
use crate::config::{ConfigError, GenConfig};
use crate::emit::{CSyntax, Emitter, LatexSyntax, Syntax};
use crate::eval::EvalError;
use crate::ir::{self, Graph, GraphError, ParseError};
use crate::naming::VariableNamer;

/// Errors surfaced by the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("graph verification failed: {0}")]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A verified graph with the model name derived from its file.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub graph: Graph,
}

/// Parse and verify a graph file.
pub fn load_model(path: &Path) -> Result<LoadedModel, PipelineError> {
    let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let graph = parse_model(&text)?;
    Ok(LoadedModel {
        name: model_name(path),
        graph,
    })
}

pub fn parse_model(text: &str) -> Result<Graph, PipelineError> {
    let graph = ir::parse_graph(text)?;
    ir::verify_graph(&graph)?;
    Ok(graph)
}

/// File stem with every character that cannot appear in a C identifier
/// replaced by `_`.
pub fn model_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Build the library bundle for `models` under `config`.
pub fn generate_library(
    models: &[LoadedModel],
    config: &GenConfig,
) -> Result<ModuleBundle, PipelineError> {
    config.validate()?;
    let options = config.model_options();
    let mut bundle = ModuleBundle::new(config.bundle_options());
    for model in models {
        let source = ModelSource::with_options(&model.name, &model.graph, &options)?;
        bundle.add_model(source)?;
    }
    info!(
        library = config.library.as_str(),
        models = models.len(),
        "generated library"
    );
    Ok(bundle)
}

/// Assignments of `graph` in the given syntax, declarations first.
pub fn render<S: Syntax>(
    graph: &Graph,
    syntax: S,
    namer: &dyn VariableNamer,
    indent: &str,
) -> Result<String, PipelineError> {
    let mut graph = graph.clone();
    let plan = graph.finalize()?;
    let emitter = Emitter::new(syntax, namer);
    let emission = emitter.emit(&plan)?;
    Ok(emission.render(emitter.syntax(), indent))
}

/// Equations of `graph` inside an `align*` environment.
pub fn render_latex(graph: &Graph, namer: &dyn VariableNamer) -> Result<String, PipelineError> {
    let body = render(graph, LatexSyntax, namer, "  ")?;
    Ok(format!("\\begin{{align*}}\n{body}\\end{{align*}}\n"))
}

pub fn render_c(graph: &Graph, namer: &dyn VariableNamer) -> Result<String, PipelineError> {
    render(graph, CSyntax, namer, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::DefaultNamer;

    #[test]
    fn model_names_are_identifiers() {
        assert_eq!(model_name(Path::new("dir/robot-arm.graph")), "robot_arm");
        assert_eq!(model_name(Path::new("2d.graph")), "_2d");
    }

    #[test]
    fn latex_is_wrapped_in_align() {
        let graph = parse_model("%0 = indep 0\n%1 = exp %0\ndep %1\n").unwrap();
        let tex = render_latex(&graph, &DefaultNamer::latex()).unwrap();
        assert_eq!(
            tex,
            "\\begin{align*}\n  y_{0} = e^{x_{0}} \\\\\n\\end{align*}\n"
        );
    }

    #[test]
    fn verification_errors_surface() {
        let err = parse_model("%0 = exp %1\n%1 = indep 0\ndep %0\n").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Graph(GraphError::ForwardReference { .. })
        ));
    }
}
