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

use std::collections::BTreeMap;
use std::fmt::Write;

use tracing::debug;

use crate::emit::{CSyntax, Emission, Emitter, ExternalFunction, ParamKind};
use crate::eval::jacobian_graph;
use crate::ir::Graph;
use crate::naming::{is_c_identifier, DefaultNamer};

use super::{BundleError, FORWARD_ZERO_SUFFIX, INFO_SUFFIX, JACOBIAN_SUFFIX};

/// Output parameter of the Jacobian entry point.
pub const JACOBIAN_OUTPUT: &str = "jac";

/// Per-model generation options.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Also generate `<name>_jacobian`.
    pub jacobian: bool,
    /// Must use [`NameStyle::Indexed`](crate::naming::NameStyle::Indexed):
    /// the prefixes become the C parameter names.
    pub namer: DefaultNamer,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            jacobian: false,
            namer: DefaultNamer::c(),
        }
    }
}

/// Generated C sources of one model.
#[derive(Debug, Clone)]
pub struct ModelSource {
    name: String,
    domain: usize,
    range: usize,
    jacobian: bool,
    files: BTreeMap<String, String>,
}

impl ModelSource {
    pub fn new(name: &str, graph: &Graph) -> Result<Self, BundleError> {
        Self::with_options(name, graph, &ModelOptions::default())
    }

    pub fn with_options(
        name: &str,
        graph: &Graph,
        options: &ModelOptions,
    ) -> Result<Self, BundleError> {
        validate_identifier(name)?;
        let domain = graph.independents().len();
        let range = graph.dependents().len();
        let x = options.namer.independent_prefix().to_string();
        let y = options.namer.dependent_prefix().to_string();

        let mut forward_graph = graph.clone();
        let forward = {
            let plan = forward_graph.finalize()?;
            Emitter::new(CSyntax, &options.namer).emit(&plan)?
        };

        let jacobian = if options.jacobian {
            let mut jac_graph = jacobian_graph(graph)?;
            let namer = options.namer.clone().with_dependent_prefix(JACOBIAN_OUTPUT);
            let plan = jac_graph.finalize()?;
            Some(Emitter::new(CSyntax, &namer).emit(&plan)?)
        } else {
            None
        };

        let mut src = String::new();
        writeln!(src, "/* model {name}: {domain} inputs, {range} outputs */").ok();
        src.push_str("#include <math.h>\n#include <stdint.h>\n\n");

        let mut functions: Vec<&ExternalFunction> = forward.functions.iter().collect();
        for f in jacobian.iter().flat_map(|e| e.functions.iter()) {
            if functions.iter().all(|known| known.name != f.name) {
                functions.push(f);
            }
        }
        let mut reserved: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
        if options.jacobian {
            reserved.push(JACOBIAN_OUTPUT);
        }
        options.namer.check_c_names(&reserved)?;

        if !functions.is_empty() {
            for f in &functions {
                src.push_str(&prototype(f));
            }
            src.push('\n');
        }

        writeln!(src, "void {name}{INFO_SUFFIX}(uint64_t* n, uint64_t* m) {{").ok();
        writeln!(src, "    *n = {domain};\n    *m = {range};\n}}\n").ok();

        write_function(&mut src, name, FORWARD_ZERO_SUFFIX, &x, &y, &forward);
        if let Some(jac) = &jacobian {
            src.push('\n');
            write_function(&mut src, name, JACOBIAN_SUFFIX, &x, JACOBIAN_OUTPUT, jac);
        }

        debug!(
            model = name,
            domain,
            range,
            jacobian = options.jacobian,
            "generated model source"
        );

        let mut files = BTreeMap::new();
        files.insert(format!("{name}.c"), src);
        Ok(Self {
            name: name.to_string(),
            domain,
            range,
            jacobian: options.jacobian,
            files,
        })
    }

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
        self.jacobian
    }

    /// File name to content.
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Header prototypes for the entry points of this model.
    pub fn prototypes(&self) -> Vec<String> {
        let name = &self.name;
        let mut out = vec![
            format!("void {name}{INFO_SUFFIX}(uint64_t* n, uint64_t* m);"),
            format!("void {name}{FORWARD_ZERO_SUFFIX}(const double* x, double* y);"),
        ];
        if self.jacobian {
            out.push(format!(
                "void {name}{JACOBIAN_SUFFIX}(const double* x, double* jac);"
            ));
        }
        out
    }
}

fn write_function(src: &mut String, name: &str, suffix: &str, x: &str, y: &str, body: &Emission) {
    writeln!(src, "void {name}{suffix}(const double* {x}, double* {y}) {{").ok();
    src.push_str(&body.render(&CSyntax, "    "));
    src.push_str("}\n");
}

fn prototype(f: &ExternalFunction) -> String {
    let params: Vec<&str> = f
        .params
        .iter()
        .map(|p| match p {
            ParamKind::Scalar => "double",
            ParamKind::Array(_) => "const double*",
        })
        .collect();
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    format!("extern double {}({});\n", f.name, params)
}

/// C identifiers name symbols in the compiled module.
pub(crate) fn validate_identifier(name: &str) -> Result<(), BundleError> {
    if is_c_identifier(name) {
        Ok(())
    } else {
        Err(BundleError::InvalidIdentifier(name.to_string()))
    }
}
