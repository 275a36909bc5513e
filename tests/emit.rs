use adgen::emit::{CSyntax, Emitter, LatexSyntax, ParamKind};
use adgen::ir::{BinOp, Graph, UnaryOp};
use adgen::naming::{CustomNamer, DefaultNamer};

fn shared_graph() -> Graph {
    let mut g = Graph::new();
    let a = g.independent();
    let b = g.independent();
    let sum = g.binary(BinOp::Add, a, b).unwrap();
    let sq = g.binary(BinOp::Mul, sum, sum).unwrap();
    let root = g.unary(UnaryOp::Sqrt, sq).unwrap();
    let q = g.binary(BinOp::Div, root, sum).unwrap();
    g.mark_dependent(q).unwrap();
    g.mark_dependent(root).unwrap();
    g
}

#[test]
fn c_output_reuses_temporaries() {
    let mut g = shared_graph();
    let namer = DefaultNamer::c();
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(CSyntax, &namer).emit(&plan).unwrap();
    assert_eq!(
        emission.statements,
        vec![
            "v0 = (x[0] + x[1]);",
            "v1 = sqrt((v0 * v0));",
            "y[0] = (v1 / v0);",
            "y[1] = v1;",
        ]
    );
    assert_eq!(
        emission.render(&CSyntax, "  "),
        "  double v0, v1;\n  v0 = (x[0] + x[1]);\n  v1 = sqrt((v0 * v0));\n  y[0] = (v1 / v0);\n  y[1] = v1;\n"
    );
}

#[test]
fn latex_output_shares_the_plan() {
    let mut g = shared_graph();
    let namer = DefaultNamer::latex();
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(LatexSyntax, &namer).emit(&plan).unwrap();
    assert_eq!(
        emission.statements,
        vec![
            "v_{0} = \\left(x_{0} + x_{1}\\right) \\\\",
            "v_{1} = \\sqrt{\\left(v_{0} \\cdot v_{0}\\right)} \\\\",
            "y_{0} = \\frac{v_{1}}{v_{0}} \\\\",
            "y_{1} = v_{1} \\\\",
        ]
    );
}

#[test]
fn emission_is_deterministic() {
    let namer = DefaultNamer::c();
    let mut first = shared_graph();
    let mut second = shared_graph();
    let a = Emitter::new(CSyntax, &namer)
        .emit(&first.finalize().unwrap())
        .unwrap();
    let b = Emitter::new(CSyntax, &namer)
        .emit(&second.finalize().unwrap())
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn consecutive_inputs_become_a_view() {
    let mut g = Graph::new();
    let x: Vec<_> = (0..4).map(|_| g.independent()).collect();
    let tail = g.array(&x[1..4]).unwrap();
    let f = g.call("poly", &[tail]).unwrap();
    let third = g.element(tail, 2).unwrap();
    let y = g.binary(BinOp::Mul, f, third).unwrap();
    g.mark_dependent(y).unwrap();

    let namer = DefaultNamer::c();
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(CSyntax, &namer).emit(&plan).unwrap();
    assert!(emission.arrays.is_empty());
    assert_eq!(emission.statements, vec!["y[0] = (poly(&x[1]) * x[3]);"]);
    assert_eq!(emission.functions[0].params, vec![ParamKind::Array(3)]);
}

#[test]
fn gaps_force_a_copy() {
    let mut g = Graph::new();
    let x0 = g.independent();
    let _x1 = g.independent();
    let x2 = g.independent();
    let arr = g.array(&[x0, x2]).unwrap();
    let f = g.call("poly", &[arr]).unwrap();
    let e = g.element(arr, 1).unwrap();
    let y = g.binary(BinOp::Sub, f, e).unwrap();
    g.mark_dependent(y).unwrap();

    let namer = DefaultNamer::c();
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(CSyntax, &namer).emit(&plan).unwrap();
    assert_eq!(emission.arrays, vec![("a0".to_string(), 2)]);
    assert_eq!(
        emission.statements,
        vec![
            "a0[0] = x[0];",
            "a0[1] = x[2];",
            "y[0] = (poly(a0) - a0[1]);",
        ]
    );
    assert!(emission.warnings.is_empty());
}

#[test]
fn individually_named_inputs_are_never_viewed() {
    let mut g = Graph::new();
    let p = g.independent();
    let q = g.independent();
    let arr = g.array(&[p, q]).unwrap();
    let f = g.call("norm", &[arr]).unwrap();
    g.mark_dependent(f).unwrap();

    let namer = CustomNamer::new(vec!["out".into()], vec!["p".into(), "q".into()]);
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(CSyntax, &namer).emit(&plan).unwrap();
    assert_eq!(
        emission.statements,
        vec!["a0[0] = p;", "a0[1] = q;", "out = norm(a0);"]
    );
}

#[test]
fn constants_are_inlined() {
    let mut g = Graph::new();
    let x = g.independent();
    let c = g.constant(-2.5);
    let y = g.binary(BinOp::Pow, x, c).unwrap();
    let z = g.unary(UnaryOp::Sign, y).unwrap();
    g.mark_dependent(z).unwrap();

    let namer = DefaultNamer::c();
    let plan = g.finalize().unwrap();
    let emission = Emitter::new(CSyntax, &namer).emit(&plan).unwrap();
    assert_eq!(
        emission.statements,
        vec!["y[0] = ((pow(x[0], (-2.5))) > 0 ? 1.0 : ((pow(x[0], (-2.5))) < 0 ? -1.0 : 0.0));"]
    );
}
