#![cfg(target_os = "linux")]

mod common;

use adgen::bundle::{BundleOptions, ModelOptions, ModelSource, ModuleBundle};
use adgen::eval::{jacobian_graph, GraphEvaluator};
use adgen::ir::{BinOp, Graph, UnaryOp};
use adgen::{ModuleState, NativeError, NativeModule, API_VERSION};
use tempfile::tempdir;

fn damped_oscillator() -> Graph {
    let mut g = Graph::new();
    let t = g.independent();
    let k = g.independent();
    let decay = g.unary(UnaryOp::Neg, t).unwrap();
    let decay = g.binary(BinOp::Mul, decay, k).unwrap();
    let envelope = g.unary(UnaryOp::Exp, decay).unwrap();
    let wave = g.unary(UnaryOp::Cos, t).unwrap();
    let x = g.binary(BinOp::Mul, envelope, wave).unwrap();
    let energy = g.binary(BinOp::Mul, envelope, envelope).unwrap();
    g.mark_dependent(x).unwrap();
    g.mark_dependent(energy).unwrap();
    g
}

fn build_library(dir: &std::path::Path, thread_pool: bool) -> Option<std::path::PathBuf> {
    let options = ModelOptions {
        jacobian: true,
        ..ModelOptions::default()
    };
    let mut bundle = ModuleBundle::new(BundleOptions {
        thread_pool,
        ..BundleOptions::default()
    });
    bundle
        .add_model(ModelSource::with_options("oscillator", &damped_oscillator(), &options).unwrap())
        .unwrap();
    common::compile_bundle(&bundle, dir, "oscillator")
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-12)
}

#[test]
fn compiled_model_matches_the_evaluator() {
    let dir = tempdir().expect("tempdir");
    let Some(lib) = build_library(dir.path(), false) else {
        return;
    };

    let module = NativeModule::load(&lib).expect("load module");
    assert_eq!(module.api_version(), Some(API_VERSION));
    assert_eq!(module.model_names(), ["oscillator".to_string()]);

    let model = module.model("oscillator").expect("bind model");
    assert_eq!((model.domain(), model.range()), (2, 2));
    assert!(model.has_jacobian());

    let graph = damped_oscillator();
    let x = [0.4, 1.3];
    let expected = GraphEvaluator::<f64>::new(&graph)
        .evaluate(&x, &mut ())
        .unwrap();
    assert!(close(&model.forward_zero(&x).unwrap(), &expected));

    let jac = jacobian_graph(&graph).unwrap();
    let expected = GraphEvaluator::<f64>::new(&jac)
        .evaluate(&x, &mut ())
        .unwrap();
    assert!(close(&model.jacobian(&x).unwrap(), &expected));

    assert_eq!(
        model.forward_zero(&[1.0]).unwrap_err(),
        NativeError::DimensionMismatch {
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn unknown_models_are_not_found() {
    let dir = tempdir().expect("tempdir");
    let Some(lib) = build_library(dir.path(), false) else {
        return;
    };
    let module = NativeModule::load(&lib).expect("load module");
    assert_eq!(
        module.model("pendulum").unwrap_err(),
        NativeError::NotFound {
            name: "pendulum".to_string()
        }
    );
}

#[test]
fn closing_notifies_each_handle_once() {
    let dir = tempdir().expect("tempdir");
    let Some(lib) = build_library(dir.path(), false) else {
        return;
    };
    let mut module = NativeModule::load(&lib).expect("load module");
    let first = module.model("oscillator").unwrap();
    let second = module.model("oscillator").unwrap();
    let dropped = module.model("oscillator").unwrap();
    drop(dropped);
    assert_eq!(module.live_handles(), 2);
    assert_eq!(module.state(), ModuleState::Serving);

    module.close().unwrap();
    module.close().unwrap();
    assert_eq!(module.state(), ModuleState::Closed);
    for handle in [&first, &second] {
        assert!(!handle.is_alive());
        assert_eq!(handle.teardown_notices(), 1);
        assert_eq!(
            handle.forward_zero(&[0.0, 0.0]).unwrap_err(),
            NativeError::ModuleClosed {
                model: "oscillator".to_string()
            }
        );
    }
}

#[test]
fn modules_reopen_after_close() {
    let dir = tempdir().expect("tempdir");
    let Some(lib) = build_library(dir.path(), false) else {
        return;
    };
    let mut module = NativeModule::new(&lib);
    assert!(matches!(
        module.validate(),
        Err(NativeError::InvalidState {
            state: ModuleState::Closed,
            ..
        })
    ));
    module.open().unwrap();
    module.validate().unwrap();
    module.close().unwrap();
    module.open().unwrap();
    module.validate().unwrap();
    assert_eq!(module.state(), ModuleState::Validated);
}

#[test]
fn thread_pool_is_optional() {
    let dir = tempdir().expect("tempdir");
    let Some(lib) = build_library(dir.path(), true) else {
        return;
    };
    let module = NativeModule::load(&lib).expect("load module");
    assert_eq!(module.thread_number(), 1);
    module.set_thread_number(4);
    assert_eq!(module.thread_number(), 4);

    let plain = tempdir().expect("tempdir");
    let Some(lib) = build_library(plain.path(), false) else {
        return;
    };
    let module = NativeModule::load(&lib).expect("load module");
    module.set_thread_number(4);
    assert_eq!(module.thread_number(), 1);
}

#[test]
fn version_mismatch_closes_the_module() {
    let dir = tempdir().expect("tempdir");
    let source = r#"#include <stdint.h>

uint64_t adgen_library_version(void) {
    return 99;
}
"#;
    let Some(lib) = common::compile_source(source, dir.path(), "future") else {
        return;
    };

    let mut module = NativeModule::new(&lib);
    for _ in 0..2 {
        module.open().unwrap();
        // the rejection reason survives the unload that follows it
        assert_eq!(
            module.validate().unwrap_err(),
            NativeError::VersionMismatch {
                expected: API_VERSION,
                found: 99
            }
        );
        assert_eq!(module.state(), ModuleState::Closed);
        assert_eq!(module.api_version(), None);
    }
}

#[test]
fn missing_libraries_fail_to_open() {
    let dir = tempdir().expect("tempdir");
    let err = NativeModule::load(dir.path().join("libabsent.so")).unwrap_err();
    assert!(matches!(err, NativeError::Load { .. }));
}
