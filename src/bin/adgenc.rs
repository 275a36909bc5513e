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

//! ADGEN command-line generator: turn graph files into a C library or
//! typeset equations, and inspect compiled libraries.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adgen::ir::format_graph;
use adgen::pipeline::{generate_library, load_model, render_c, render_latex};
use adgen::{DefaultNamer, GenConfig, NativeModule, API_VERSION};

#[derive(Parser, Debug)]
#[command(name = "adgenc", author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the C sources of a model library.
    Gen {
        /// Graph files; each becomes a model named after its file stem.
        #[arg(value_name = "GRAPH", required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory for the generated sources.
        #[arg(short, long, value_name = "DIR", default_value = "adgen_out")]
        out: PathBuf,
        /// Generation settings (TOML).
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the library name from the configuration.
        #[arg(long, value_name = "NAME")]
        library: Option<String>,
        /// Also generate Jacobian entry points.
        #[arg(long)]
        jacobian: bool,
    },
    /// Render a graph as LaTeX equations.
    Latex {
        #[arg(value_name = "GRAPH")]
        input: PathBuf,
        /// Write to a file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print a verified graph in canonical form, or as C statements.
    Print {
        #[arg(value_name = "GRAPH")]
        input: PathBuf,
        #[arg(long)]
        c: bool,
    },
    /// Load a compiled library and list its models.
    Inspect {
        #[arg(value_name = "LIBRARY")]
        library: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Gen {
            inputs,
            out,
            config,
            library,
            jacobian,
        } => {
            let mut config = match config {
                Some(path) => GenConfig::load(&path)?,
                None => GenConfig::default(),
            };
            if let Some(name) = library {
                config.library = name;
            }
            config.bundle.jacobian |= jacobian;

            let models = inputs
                .iter()
                .map(|path| load_model(path).with_context(|| format!("loading {}", path.display())))
                .collect::<Result<Vec<_>>>()?;
            let bundle = generate_library(&models, &config)?;
            let written = bundle.save_sources(&out)?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Command::Latex { input, out } => {
            let model = load_model(&input)?;
            let tex = render_latex(&model.graph, &DefaultNamer::latex())?;
            match out {
                Some(path) => fs::write(&path, tex)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{tex}"),
            }
        }
        Command::Print { input, c } => {
            let model = load_model(&input)?;
            if c {
                print!("{}", render_c(&model.graph, &DefaultNamer::c())?);
            } else {
                print!("{}", format_graph(&model.graph));
            }
        }
        Command::Inspect { library } => {
            let module = NativeModule::load(&library)
                .with_context(|| format!("loading {}", library.display()))?;
            if module.api_version() != Some(API_VERSION) {
                bail!("unexpected ABI version {:?}", module.api_version());
            }
            println!("api version: {API_VERSION}");
            println!("threads: {}", module.thread_number());
            for name in module.model_names() {
                let handle = module.model(name)?;
                println!(
                    "model {name}: {} -> {}{}",
                    handle.domain(),
                    handle.range(),
                    if handle.has_jacobian() { " (jacobian)" } else { "" }
                );
            }
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
