use std::fs;

use adgen::bundle::{BundleError, BundleOptions, ModelOptions, ModelSource, ModuleBundle};
use adgen::ir::{BinOp, Graph, UnaryOp};
use tempfile::tempdir;

fn pendulum() -> Graph {
    let mut g = Graph::new();
    let theta = g.independent();
    let length = g.independent();
    let s = g.unary(UnaryOp::Sin, theta).unwrap();
    let c = g.unary(UnaryOp::Cos, theta).unwrap();
    let x = g.binary(BinOp::Mul, length, s).unwrap();
    let y = g.binary(BinOp::Mul, length, c).unwrap();
    let y = g.unary(UnaryOp::Neg, y).unwrap();
    g.mark_dependent(x).unwrap();
    g.mark_dependent(y).unwrap();
    g
}

#[test]
fn saved_sources_cover_models_and_abi() {
    let dir = tempdir().unwrap();
    let mut bundle = ModuleBundle::new(BundleOptions {
        library_name: "mechanics".to_string(),
        thread_pool: true,
        on_close_body: Some("/* release caches */".to_string()),
        ..BundleOptions::default()
    });
    bundle
        .add_model(ModelSource::new("pendulum", &pendulum()).unwrap())
        .unwrap();

    let written = bundle.save_sources(dir.path()).unwrap();
    let mut names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "adgen_library_models.c",
            "adgen_library_on_close.c",
            "adgen_library_thread_pool.c",
            "adgen_library_version.c",
            "mechanics.h",
            "pendulum.c",
        ]
    );

    let header = fs::read_to_string(dir.path().join("mechanics.h")).unwrap();
    assert!(header.contains("#ifndef MECHANICS_H"));
    assert!(header.contains("void pendulum_forward_zero(const double* x, double* y);"));
    assert!(header.contains("void adgen_library_set_thread_number(uint64_t n);"));

    let on_close = fs::read_to_string(dir.path().join("adgen_library_on_close.c")).unwrap();
    assert_eq!(
        on_close,
        "void adgen_library_on_close(void) {\n    /* release caches */\n}\n"
    );

    let model = fs::read_to_string(dir.path().join("pendulum.c")).unwrap();
    assert!(model.contains("y[0] = (x[1] * sin(x[0]));"));
    assert!(model.contains("y[1] = (-(x[1] * cos(x[0])));"));
}

#[test]
fn empty_bundles_still_export_a_directory() {
    let files = ModuleBundle::default().build().unwrap();
    let models = &files["adgen_library_models.c"];
    assert!(models.contains("models[] = {0};"));
    assert!(models.contains("*count = 0;"));
    assert!(!files.contains_key("adgen_library_thread_pool.c"));
}

#[test]
fn custom_sources_are_merged_verbatim() {
    let mut bundle = ModuleBundle::default();
    bundle
        .add_model(ModelSource::new("pendulum", &pendulum()).unwrap())
        .unwrap();
    bundle
        .add_custom_source("helpers.c", "double twice(double v) { return 2 * v; }\n")
        .unwrap();

    let files = bundle.build().unwrap();
    assert_eq!(
        files["helpers.c"],
        "double twice(double v) { return 2 * v; }\n"
    );

    let err = bundle.add_custom_source("helpers.c", "").unwrap_err();
    assert!(matches!(err, BundleError::DuplicateSource(name) if name == "helpers.c"));
    assert!(matches!(
        bundle.add_custom_source("", "int x;"),
        Err(BundleError::EmptyFileName)
    ));

    bundle.add_custom_source("pendulum.c", "").unwrap();
    assert!(matches!(
        bundle.build(),
        Err(BundleError::DuplicateSource(name)) if name == "pendulum.c"
    ));
}

#[test]
fn identifiers_are_checked() {
    assert!(matches!(
        ModelSource::new("2fast", &pendulum()),
        Err(BundleError::InvalidIdentifier(_))
    ));

    let bundle = ModuleBundle::new(BundleOptions {
        library_name: "my-lib".to_string(),
        ..BundleOptions::default()
    });
    assert!(matches!(
        bundle.build(),
        Err(BundleError::InvalidIdentifier(name)) if name == "my-lib"
    ));
}

#[test]
fn jacobian_models_emit_row_major_entries() {
    let options = ModelOptions {
        jacobian: true,
        ..ModelOptions::default()
    };
    let model = ModelSource::with_options("pendulum", &pendulum(), &options).unwrap();
    assert!(model.has_jacobian());
    assert_eq!((model.domain(), model.range()), (2, 2));

    let src = &model.files()["pendulum.c"];
    let body = src
        .split("void pendulum_jacobian(const double* x, double* jac) {")
        .nth(1)
        .unwrap();
    for k in 0..4 {
        assert!(body.contains(&format!("jac[{k}] = ")), "missing jac[{k}]");
    }
    assert!(!body.contains("jac[4]"));
}
