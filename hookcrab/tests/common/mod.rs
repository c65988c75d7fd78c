//! Common test utilities and macros

use hookcrab::runner::program_name;
use hookcrab::{BaseEvaluator, Context, ExecutionHook, ExtensibleInterpreter, Program, TypedValue, loader};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum TestResult {
    Success,
    ExitStatus(i32),
    SuccessWithValue(TypedValue),
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TestResult::Success, TestResult::Success) => true,
            (TestResult::ExitStatus(a), TestResult::ExitStatus(b)) => a == b,
            (TestResult::SuccessWithValue(a), TestResult::SuccessWithValue(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ErrorRegex(pattern), TestResult::Error(msg)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            (TestResult::Error(msg), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            _ => false,
        }
    }
}

pub fn input_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("inputs")
        .join(name)
}

pub fn load_input(name: &str) -> Program {
    let path = input_path(name);
    loader::load_file(&Context::new(), &path.to_string_lossy()).unwrap()
}

/// Builds an interpreter whose program output is discarded.
pub fn quiet_interpreter<H: ExecutionHook>(program: Program, hook: H) -> ExtensibleInterpreter<H> {
    let evaluator = BaseEvaluator::with_output(&Context::new(), Box::new(std::io::sink()));
    ExtensibleInterpreter::with_evaluator(program, evaluator, hook)
}

pub fn run_interpreter_test(input_file: &Path) -> TestResult {
    let path = input_file.to_string_lossy();
    let program = match loader::load_file(&Context::new(), &path) {
        Ok(program) => program,
        Err(e) => return TestResult::Error(e.to_string()),
    };

    let mut interpreter = quiet_interpreter(program, hookcrab::Forward);
    match interpreter.run_main(&[program_name(&path)], &[]) {
        Ok(0) => TestResult::Success,
        Ok(status) => TestResult::ExitStatus(status),
        Err(e) => TestResult::Error(e.to_string()),
    }
}

pub fn run_custom_start_test(input_file: &Path, start_fn: &str) -> TestResult {
    let program = match loader::load_file(&Context::new(), &input_file.to_string_lossy()) {
        Ok(program) => program,
        Err(e) => return TestResult::Error(e.to_string()),
    };

    let mut interpreter = quiet_interpreter(program, hookcrab::Forward);
    match hookcrab::run_function(&mut interpreter, start_fn) {
        Ok(value) => TestResult::SuccessWithValue(value),
        Err(e) => TestResult::Error(e.to_string()),
    }
}

#[macro_export]
macro_rules! check_interpreter {
    ($test_name:ident, input=$input_file:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let input_path = crate::common::input_path($input_file);
            let result = crate::common::run_interpreter_test(&input_path);
            assert_eq!(result, $expected);
        }
    };
}

#[macro_export]
macro_rules! check_custom_start {
    ($test_name:ident, input=$input_file:expr, start_fn=$start_fn:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let input_path = crate::common::input_path($input_file);
            let result = crate::common::run_custom_start_test(&input_path, $start_fn);
            assert_eq!(result, $expected);
        }
    };
}
