//! ADGEN core library: expression-graph recording, source generation,
//! native module loading and graph replay.
pub mod bundle;
pub mod config;
pub mod emit;
pub mod eval;
pub mod ir;
pub mod lexer;
pub mod naming;
pub mod native;
pub mod opt;
pub mod pipeline;

pub use bundle::{BundleError, BundleOptions, ModelOptions, ModelSource, ModuleBundle, API_VERSION};
pub use config::{ConfigError, GenConfig};
pub use emit::{CSyntax, Emission, Emitter, LatexSyntax, Syntax};
pub use eval::{jacobian_graph, Arithmetic, Dual, EvalError, GraphEvaluator, Operand};
pub use ir::{BinOp, EmissionPlan, Graph, GraphError, Node, NodeId, Op, UnaryOp};
pub use naming::{CustomNamer, DefaultNamer, NameClash, VariableNamer};
pub use native::{ModelHandle, ModuleState, NativeError, NativeModule};
