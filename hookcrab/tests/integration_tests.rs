#[macro_use]
mod common;

use common::{TestResult, load_input, quiet_interpreter};
use hookcrab::program::Instruction;
use hookcrab::runner::{self, FAILURE_STATUS};
use hookcrab::{
    Context, EvalContext, Forward, InstructionCounter, InterpError, Observe, Replace, Tracer,
    TypedValue, loader,
};

check_interpreter!(
    test_simple_success,
    input = "simple_main.ir",
    result = TestResult::Success
);

check_interpreter!(
    test_exit_status,
    input = "exit_status.ir",
    result = TestResult::ExitStatus(42)
);

check_interpreter!(
    test_function_call,
    input = "function_call.ir",
    result = TestResult::ExitStatus(120)
);

check_interpreter!(
    test_recursion,
    input = "recursion.ir",
    result = TestResult::Success
);

check_interpreter!(
    test_floats,
    input = "floats.ir",
    result = TestResult::Success
);

check_interpreter!(
    test_argc_includes_program_name,
    input = "args.ir",
    result = TestResult::ExitStatus(1)
);

check_interpreter!(
    test_exit_builtin_unwinds,
    input = "exit_builtin.ir",
    result = TestResult::ExitStatus(3)
);

check_interpreter!(
    test_division_by_zero,
    input = "arithmetic.ir",
    result = TestResult::ErrorRegex(r"Division by zero".to_string())
);

check_interpreter!(
    test_unreachable,
    input = "unreachable.ir",
    result = TestResult::ErrorRegex(r"Reached unreachable instruction at fn\d+:bb2:0".to_string())
);

check_interpreter!(
    test_stack_overflow,
    input = "overflow.ir",
    result = TestResult::ErrorRegex(r"Stack overflow: call depth exceeds \d+".to_string())
);

check_interpreter!(
    test_missing_main,
    input = "no_main.ir",
    result = TestResult::Error("'main' function not found in module".to_string())
);

check_interpreter!(
    test_parse_error,
    input = "parse_error.ir",
    result = TestResult::ErrorRegex(r"parse error at line 3: unknown opcode `frobnicate`".to_string())
);

check_interpreter!(
    test_unknown_label,
    input = "unknown_label.ir",
    result = TestResult::ErrorRegex(r"materialization error at line 3: unknown label `nowhere`".to_string())
);

// Custom start function tests
check_custom_start!(
    test_valid_custom_start,
    input = "custom_start.ir",
    start_fn = "my_custom_start",
    result = TestResult::SuccessWithValue(TypedValue::from_i32(123))
);

check_custom_start!(
    test_function_with_args_fails,
    input = "custom_start.ir",
    start_fn = "takes_argument",
    result = TestResult::ErrorRegex(r".*takes \d+ arguments.*".to_string())
);

check_custom_start!(
    test_void_custom_start,
    input = "custom_start.ir",
    start_fn = "does_nothing",
    result = TestResult::SuccessWithValue(TypedValue::void())
);

check_custom_start!(
    test_narrow_integers_wrap,
    input = "custom_start.ir",
    start_fn = "wraps",
    result = TestResult::SuccessWithValue(TypedValue::from_i8(-128))
);

check_custom_start!(
    test_float_result,
    input = "floats.ir",
    start_fn = "float_value",
    result = TestResult::SuccessWithValue(TypedValue::from_f64(2.5))
);

check_custom_start!(
    test_nan_is_unordered,
    input = "floats.ir",
    start_fn = "is_ordered",
    result = TestResult::SuccessWithValue(TypedValue::from_bool(false))
);

check_custom_start!(
    test_unknown_start,
    input = "custom_start.ir",
    start_fn = "missing",
    result = TestResult::Error("Function 'missing' not found".to_string())
);

/// Stack depth and the top frame's locals, as seen before an instruction runs.
type Snapshot = (usize, Vec<Option<TypedValue>>);

fn snapshot(ctx: &EvalContext<'_>) -> Snapshot {
    let locals = ctx
        .stack()
        .top()
        .map(|frame| frame.locals().to_vec())
        .unwrap_or_default();
    (ctx.stack().depth(), locals)
}

/// Records the stack depth seen before each instruction.
fn depth_recorder(depths: &mut Vec<usize>) -> Observe<impl FnMut(&Instruction, &EvalContext<'_>) + '_> {
    Observe(move |_: &Instruction, ctx: &EvalContext<'_>| depths.push(ctx.stack().depth()))
}

/// Records a [`Snapshot`] before each instruction.
fn state_recorder(states: &mut Vec<Snapshot>) -> Observe<impl FnMut(&Instruction, &EvalContext<'_>) + '_> {
    Observe(move |_: &Instruction, ctx: &EvalContext<'_>| states.push(snapshot(ctx)))
}

#[test]
fn test_forwarding_hooks_are_equivalent() {
    let baseline = quiet_interpreter(load_input("recursion.ir"), Forward)
        .run_function_by_name("main", &[])
        .unwrap();

    let mut observed = Vec::new();
    let result = quiet_interpreter(load_input("recursion.ir"), depth_recorder(&mut observed))
        .run_function_by_name("main", &[])
        .unwrap();
    assert_eq!(result, baseline);

    let mut forwarded = Vec::new();
    let result = quiet_interpreter(load_input("recursion.ir"), state_recorder(&mut forwarded))
        .run_function_by_name("main", &[])
        .unwrap();
    assert_eq!(result, baseline);

    let mut replaced = Vec::new();
    let hook = Replace(|instr: &Instruction, ctx: &mut EvalContext<'_>| {
        replaced.push(snapshot(ctx));
        ctx.evaluate(instr)
    });
    let result = quiet_interpreter(load_input("recursion.ir"), hook)
        .run_function_by_name("main", &[])
        .unwrap();
    assert_eq!(result, baseline);
    assert_eq!(forwarded, replaced);
    let depths: Vec<usize> = replaced.iter().map(|(depth, _)| *depth).collect();
    assert_eq!(observed, depths);
    assert!(observed.iter().any(|depth| *depth > 5));
    // Locals fill in as the program runs, so the snapshots are not trivially equal.
    assert!(replaced.windows(2).any(|pair| pair[0] != pair[1]));

    let result = quiet_interpreter(load_input("recursion.ir"), Tracer::new(std::io::sink()))
        .run_function_by_name("main", &[])
        .unwrap();
    assert_eq!(result, baseline);

    let mut interp = quiet_interpreter(load_input("recursion.ir"), InstructionCounter::new());
    assert_eq!(interp.run_function_by_name("main", &[]).unwrap(), baseline);
    assert_eq!(interp.hook().total(), observed.len() as u64);
}

#[test]
fn test_straight_line_code_is_seen_in_order() {
    let program = load_input("exit_status.ir");
    let mut seen = Vec::new();
    let hook = Observe(|instr: &Instruction, _: &EvalContext<'_>| seen.push(instr.loc.index));
    let mut interp = quiet_interpreter(program, hook);
    assert_eq!(interp.run_main(&[], &[]).unwrap(), 42);
    drop(interp);
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn test_constant_main_pushes_once() {
    let mut depths = Vec::new();
    let mut interp = quiet_interpreter(load_input("simple_main.ir"), depth_recorder(&mut depths));
    assert_eq!(interp.run_main(&[], &[]).unwrap(), 0);
    assert!(interp.evaluator().stack().is_empty());
    drop(interp);
    assert_eq!(depths, vec![1]);
}

#[test]
fn test_extra_arguments_bind_leading_parameters() {
    let source = "define i32 @sub(i32 %0, i32 %1) {\nentry:\n  %2 = sub i32 %0, %1\n  ret i32 %2\n}\n";
    let program = loader::parse_program(&Context::new(), "sub", source).unwrap();
    let mut interp = quiet_interpreter(program, Forward);
    let sub = interp.program().get_function("sub").unwrap();
    let args = [
        TypedValue::from_i32(9),
        TypedValue::from_i32(4),
        TypedValue::from_i32(1000),
    ];
    assert_eq!(interp.run_function(sub, &args).unwrap(), TypedValue::from_i32(5));

    let err = interp
        .run_function(sub, &[TypedValue::from_i32(9)])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InterpError>(),
        Some(InterpError::ArityMismatch { .. })
    ));
}

#[test]
fn test_missing_entry_point_status() {
    let path = common::input_path("no_main.ir");
    let status = runner::interpret(&Context::new(), &path.to_string_lossy(), &[], &[], Forward);
    assert_eq!(status, FAILURE_STATUS);

    let mut interp = quiet_interpreter(load_input("no_main.ir"), Forward);
    assert!(interp.run_main(&[], &[]).is_err());
    assert!(interp.evaluator().stack().is_empty());
}

#[test]
fn test_repeated_construction() {
    let source = std::fs::read_to_string(common::input_path("function_call.ir")).unwrap();
    let ctx = Context::new();
    for _ in 0..1000 {
        let program = loader::parse_program(&ctx, "function_call", &source).unwrap();
        let mut interp = quiet_interpreter(program, Forward);
        assert_eq!(interp.run_main(&[], &[]).unwrap(), 120);
    }
}

#[test]
fn test_argv0_strips_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.bc");
    std::fs::copy(common::input_path("args.ir"), &path).unwrap();

    let mut argv = None;
    let mut envp = None;
    let hook = Observe(|_: &Instruction, ctx: &EvalContext<'_>| {
        let frame = ctx.stack().top().unwrap();
        argv = frame.read_local(1).ok().and_then(|v| v.as_strings());
        envp = frame.read_local(2).ok().and_then(|v| v.as_strings());
    });
    let env = vec!["HOME=/root".to_string()];
    let status = runner::interpret(&Context::new(), &path.to_string_lossy(), &[], &env, hook);
    assert_eq!(status, 1);

    let argv = argv.unwrap();
    assert_eq!(argv.len(), 1);
    assert!(argv[0].ends_with("app"));
    assert!(!argv[0].ends_with(".bc"));
    assert_eq!(envp.unwrap(), env);
}

#[test]
fn test_trailing_arguments_are_forwarded() {
    let path = common::input_path("args.ir");
    let args = vec!["-v".to_string(), "input.txt".to_string()];
    let status = runner::interpret(&Context::new(), &path.to_string_lossy(), &args, &[], Forward);
    assert_eq!(status, 3);
}

#[test]
fn test_errno_is_reset_per_run() {
    let mut interp = quiet_interpreter(load_input("errno.ir"), Forward);
    assert_eq!(interp.run_main(&[], &[]).unwrap(), 0);
    assert_eq!(interp.evaluator().errno(), 7);
    assert_eq!(interp.run_main(&[], &[]).unwrap(), 0);
}

#[test]
fn test_faulting_hook_stops_the_loop() {
    let mut executed = 0;
    let hook = Replace(|instr: &Instruction, ctx: &mut EvalContext<'_>| {
        if instr.kind.opcode() == "call" {
            anyhow::bail!("calls are not allowed");
        }
        executed += 1;
        ctx.evaluate(instr)
    });
    let mut interp = quiet_interpreter(load_input("function_call.ir"), hook);
    let err = interp.run_main(&[], &[]).unwrap_err();
    assert_eq!(err.to_string(), "calls are not allowed");
    interp.reset();
    assert!(interp.evaluator().stack().is_empty());
    drop(interp);
    assert_eq!(executed, 0);
}

#[test]
fn test_hook_can_cancel_by_clearing_the_stack() {
    let hook = Replace(|instr: &Instruction, ctx: &mut EvalContext<'_>| {
        if ctx.stack().depth() > 1 {
            ctx.stack_mut().clear();
            return Ok(());
        }
        ctx.evaluate(instr)
    });
    let mut interp = quiet_interpreter(load_input("function_call.ir"), hook);
    let result = interp.run_function_by_name("main", &[]).unwrap();
    assert!(result.ty.is_void());
    assert!(interp.evaluator().stack().is_empty());
}
