use tacit_ir::{builder::FunctionBuilder, Function, Opcode, Operation, Program, Type};
use tacit_middle::{convert_to_ssa, SsaConfig};
use tacit_verifier::{
    verify_function, verify_program, DiagnosticCode, Severity, VerificationReport, VerifierConfig,
};

fn codes(report: &VerificationReport) -> Vec<DiagnosticCode> {
    report.diagnostics.iter().map(|diag| diag.code).collect()
}

fn phi(dest: &str, args: [&str; 2], labels: [&str; 2]) -> Operation {
    Operation::new(Opcode::Phi)
        .with_dest(dest, Type::Int)
        .with_args(args)
        .with_labels(labels)
}

/// `entry` branches to `left` and `right`, both of which fall into `join`. The body
/// of each block is supplied by the caller.
fn diamond(
    name: &str,
    left: impl FnOnce(&mut FunctionBuilder),
    right: impl FnOnce(&mut FunctionBuilder),
    join: impl FnOnce(&mut FunctionBuilder),
) -> Function {
    let mut builder = FunctionBuilder::new(name);
    builder.label("entry");
    builder.constant("c", Type::Bool, true);
    builder.br("c", "left", "right");
    builder.label("left");
    left(&mut builder);
    builder.jmp("join");
    builder.label("right");
    right(&mut builder);
    builder.jmp("join");
    builder.label("join");
    join(&mut builder);
    builder.ret(None);
    builder.finish()
}

fn redefined_diamond() -> Function {
    diamond(
        "diamond",
        |b| {
            b.constant("x", Type::Int, 1);
        },
        |b| {
            b.constant("x", Type::Int, 2);
        },
        |b| {
            b.print(["x"]);
        },
    )
}

#[test]
fn converted_function_verifies() {
    let mut func = redefined_diamond();
    convert_to_ssa(&mut func, &SsaConfig::default()).unwrap();

    let report = verify_function(&func, &VerifierConfig::default());
    assert!(report.diagnostics.is_empty(), "{report}");
}

#[test]
fn converted_loop_verifies() {
    let mut builder = FunctionBuilder::new("count");
    builder.append_parameter("n", Type::Int);
    builder.constant("i", Type::Int, 0);
    builder.label("head");
    builder.binary(Opcode::Lt, "c", Type::Bool, "i", "n");
    builder.br("c", "exit", "body");
    builder.label("body");
    builder.constant("one", Type::Int, 1);
    builder.add("i", "i", "one");
    builder.jmp("head");
    builder.label("exit");
    builder.print(["i"]);
    let mut func = builder.finish();

    let before = verify_function(&func, &VerifierConfig::default());
    assert!(before.has_code(DiagnosticCode::MultipleDefinition));

    convert_to_ssa(&mut func, &SsaConfig::default()).unwrap();
    let after = verify_function(&func, &VerifierConfig::default());
    assert!(after.is_ok(), "{after}");
}

#[test]
fn redefinition_is_reported() {
    let report = verify_function(&redefined_diamond(), &VerifierConfig::default());
    assert_eq!(
        codes(&report),
        [
            DiagnosticCode::MultipleDefinition,
            DiagnosticCode::DefDoesNotDominateUse
        ]
    );

    let redef = &report.diagnostics[0];
    assert_eq!(redef.primary.to_string(), "@diamond:.right:0");
    assert_eq!(redef.notes[0].message, "first defined at @diamond:.left:0");
}

#[test]
fn phi_argument_must_be_available_on_its_edge() {
    let func = diamond(
        "swap",
        |b| {
            b.constant("a", Type::Int, 1);
        },
        |b| {
            b.constant("b", Type::Int, 2);
        },
        |b| {
            b.inst(phi("v", ["b", "a"], ["left", "right"]));
            b.print(["v"]);
        },
    );

    let report = verify_function(&func, &VerifierConfig::default());
    insta::assert_snapshot!(report.to_string(), @r"
    error [SSA0502] `b` is not available at the end of `.left` @ @swap:.join:0 (`v: int = phi b a .left .right`)
      note: `b` is defined at @swap:.right:0
    error [SSA0502] `a` is not available at the end of `.right` @ @swap:.join:0 (`v: int = phi b a .left .right`)
      note: `a` is defined at @swap:.left:0
    ");
}

#[test]
fn phi_slots_must_match_predecessors() {
    let func = diamond(
        "slots",
        |b| {
            b.constant("a", Type::Int, 1);
        },
        |b| {
            b.constant("b", Type::Int, 2);
        },
        |b| {
            b.inst(phi("v", ["a", "b"], ["left", "entry"]));
            b.inst(
                Operation::new(Opcode::Phi)
                    .with_dest("w", Type::Int)
                    .with_args(["a"])
                    .with_labels(["left"]),
            );
            b.print(["v", "w"]);
        },
    );

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(
        codes(&report),
        [
            DiagnosticCode::PhiHasNonPredIncoming,
            DiagnosticCode::PhiArgCountMismatchPreds
        ]
    );
    assert_eq!(
        report.diagnostics[1].notes[0].message,
        "1 argument(s), 1 label(s), 2 predecessor(s)"
    );
}

#[test]
fn phi_must_lead_its_block() {
    let func = diamond(
        "late",
        |b| {
            b.constant("a", Type::Int, 1);
        },
        |b| {
            b.constant("b", Type::Int, 2);
        },
        |b| {
            b.print(["c"]);
            b.inst(phi("v", ["a", "b"], ["left", "right"]));
        },
    );

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(codes(&report), [DiagnosticCode::PhiNotAtBlockTop]);
}

#[test]
fn phi_types_must_agree() {
    let func = diamond(
        "typed",
        |b| {
            b.constant("a", Type::Int, 1);
        },
        |b| {
            b.constant("b", Type::Bool, false);
        },
        |b| {
            b.inst(phi("v", ["a", "b"], ["left", "right"]));
            b.print(["v"]);
        },
    );

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(codes(&report), [DiagnosticCode::PhiIncomingTypeMismatch]);
    assert_eq!(report.diagnostics[0].message, "`b` has type bool, phi expects int");
}

#[test]
fn undefined_marker_is_accepted_on_edges() {
    let func = diamond(
        "partial",
        |b| {
            b.constant("a", Type::Int, 1);
        },
        |_| {},
        |b| {
            b.inst(phi("v", ["a", "__undefined"], ["left", "right"]));
            b.print(["v"]);
        },
    );

    assert!(verify_function(&func, &VerifierConfig::default()).is_ok());

    let config = VerifierConfig {
        undef_name: "undef".to_string(),
        ..VerifierConfig::default()
    };
    let report = verify_function(&func, &config);
    assert_eq!(codes(&report), [DiagnosticCode::UndefinedVariable]);
}

#[test]
fn use_must_be_dominated() {
    let mut builder = FunctionBuilder::new("order");
    builder.label("entry");
    builder.id("y", Type::Int, "x");
    builder.constant("x", Type::Int, 1);
    builder.jmp("next");
    builder.label("next");
    builder.print(["y", "z"]);
    builder.ret(None);
    let func = builder.finish();

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(
        codes(&report),
        [
            DiagnosticCode::UseBeforeDefInBlock,
            DiagnosticCode::UndefinedVariable
        ]
    );
    assert_eq!(report.diagnostics[0].notes[0].message, "defined at index 1, used at 0");
}

#[test]
fn unreachable_blocks() {
    let mut builder = FunctionBuilder::new("dead");
    builder.label("entry");
    builder.ret(None);
    builder.label("island");
    builder.constant("x", Type::Int, 1);
    builder.print(["x"]);
    let func = builder.finish();

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(codes(&report), [DiagnosticCode::UnreachableBlock]);
    assert!(report.has_errors());

    let config = VerifierConfig {
        allow_unreachable_blocks: true,
        ..VerifierConfig::default()
    };
    let report = verify_function(&func, &config);
    assert_eq!(codes(&report), [DiagnosticCode::UnreachableBlock]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
    assert!(report.is_ok());
    assert_eq!(report.warnings().count(), 1);
}

#[test]
fn malformed_function_is_reported() {
    let mut builder = FunctionBuilder::new("broken");
    builder.jmp("nowhere");
    let func = builder.finish();

    let report = verify_function(&func, &VerifierConfig::default());
    assert_eq!(codes(&report), [DiagnosticCode::MalformedFunction]);
    assert_eq!(report.diagnostics[0].primary.to_string(), "@broken");
}

#[test]
fn diagnostics_are_capped() {
    let mut builder = FunctionBuilder::new("many");
    for value in 0..10 {
        builder.constant("x", Type::Int, value);
    }
    builder.print(["x"]);
    let func = builder.finish();

    let config = VerifierConfig {
        max_diagnostics: 3,
        ..VerifierConfig::default()
    };
    assert_eq!(verify_function(&func, &config).diagnostics.len(), 3);

    let config = VerifierConfig {
        max_diagnostics: 0,
        ..VerifierConfig::default()
    };
    assert_eq!(verify_function(&func, &config).diagnostics.len(), 9);
}

#[test]
fn program_reports_follow_function_order() {
    let mut ok = redefined_diamond();
    ok.name = "ok".to_string();
    convert_to_ssa(&mut ok, &SsaConfig::default()).unwrap();

    let mut first = redefined_diamond();
    first.name = "first".to_string();
    let mut last = redefined_diamond();
    last.name = "last".to_string();

    let program = Program::new(vec![first, ok, last]);
    let report = verify_program(&program, &VerifierConfig::default());
    let funcs: Vec<_> = report
        .diagnostics
        .iter()
        .map(|diag| diag.primary.func())
        .collect();
    assert_eq!(funcs, ["first", "first", "last", "last"]);
}
