//! Shared helpers for tests that compile generated sources into a shared
//! library.

use std::path::{Path, PathBuf};
use std::process::Command;

use adgen::ModuleBundle;

/// Compile every `.c` file of `bundle` into `dir/lib<name>.so`.
///
/// Returns `None` (after printing why) when no C compiler is usable, so the
/// calling test can skip.
pub fn compile_bundle(bundle: &ModuleBundle, dir: &Path, name: &str) -> Option<PathBuf> {
    let sources = bundle.save_sources(dir).expect("save sources");
    let c_files: Vec<&PathBuf> = sources
        .iter()
        .filter(|p| p.extension().is_some_and(|e| e == "c"))
        .collect();
    compile_files(&c_files, dir, name)
}

/// Compile hand-written C into `dir/lib<name>.so`.
pub fn compile_source(source: &str, dir: &Path, name: &str) -> Option<PathBuf> {
    let file = dir.join(format!("{name}.c"));
    std::fs::write(&file, source).expect("write source");
    compile_files(&[&file], dir, name)
}

fn compile_files(files: &[&PathBuf], dir: &Path, name: &str) -> Option<PathBuf> {
    let target = env!("ADGEN_TEST_TARGET");
    let compiler = match cc::Build::new()
        .target(target)
        .host(target)
        .opt_level(0)
        .debug(false)
        .cargo_metadata(false)
        .try_get_compiler()
    {
        Ok(compiler) => compiler,
        Err(err) => {
            eprintln!("Skipping: no C compiler available ({err})");
            return None;
        }
    };

    let output = dir.join(format!("lib{name}.so"));
    let mut cmd: Command = compiler.to_command();
    cmd.arg("-shared")
        .arg("-fPIC")
        .arg("-o")
        .arg(&output)
        .args(files)
        .arg("-lm");
    match cmd.status() {
        Ok(status) if status.success() => Some(output),
        Ok(status) => panic!("C compiler failed with {status}"),
        Err(err) => {
            eprintln!("Skipping: failed to run the C compiler ({err})");
            None
        }
    }
}
