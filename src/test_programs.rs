//! Sample MidIR programs with known output, run through every execution
//! path: the plain interpreter, each optimization on its own, all of them
//! together, and the compiled assembly.

use indoc::indoc;

use crate::{
    backend::{CodegenOptions, compile_to_assembly, interpreter::interpret_assembly_program},
    frontend::{SourceFile, SourceFileOrigin, parser::Parser},
    middle::{
        interpreter::interpret_compilation_unit,
        mir,
        optimization::{
            OptimizationOptions, allocator::OptimizationResourceAllocator, optimize_compilation_unit,
        },
        runtime::InterpretationError,
    },
};

#[derive(Debug, Clone, Copy)]
enum Expected {
    Output(&'static str),
    Panic(&'static str),
}

struct TestProgram {
    name: &'static str,
    expected: Expected,
    source: &'static str,
}

const TEST_PROGRAMS: &[TestProgram] = &[
    TestProgram {
        name: "repeated-division",
        expected: Expected::Output("141\n"),
        source: indoc! {"
            function _compiled_program_main {
              megagrams = 141332443;
              kilograms = (megagrams / 1000);
              grams = ((megagrams / 1000) / 1000);
              s = _builtin_intToString(grams);
              _builtin_println(s);
              return;
            }
        "},
    },
    TestProgram {
        name: "sum-of-logarithms",
        expected: Expected::Output("2181\n"),
        source: indoc! {"
            function log {
              let x = _ARG0;
              let b = _ARG1;

              if ((x <= 0)) goto LOG_ZERO;
              k = 1;
              p = b;
              LOG_LOOP:
              if ((x <= p)) goto LOG_DONE;
              if ((k >= 10)) goto LOG_RECURSE;
              k = (k + 1);
              p = (p * b);
              goto LOG_LOOP;
              LOG_RECURSE:
              rest = log((x / p), b);
              return (10 + rest);
              LOG_DONE:
              return k;
              LOG_ZERO:
              return 0;
            }

            function test {
              let acc = _ARG0;
              let i = _ARG1;

              if ((i >= 300)) goto TEST_DONE;
              l = log(i, 2);
              r = test((acc + l), (i + 1));
              return r;
              TEST_DONE:
              return acc;
            }

            function _compiled_program_main {
              v = test(0, 0);
              s = _builtin_intToString(v);
              _builtin_println(s);
              return;
            }
        "},
    },
    TestProgram {
        name: "shared-products",
        expected: Expected::Output("30\n12\n15\n"),
        source: indoc! {"
            function printInt {
              let i = _ARG0;

              s = _builtin_intToString(i);
              _builtin_println(s);
              return;
            }

            function test {
              let a = _ARG0;
              let b = _ARG1;

              printInt((((a * b) + a) + ((a * b) + a)));
              printInt((a * b));
              printInt(((a * b) + a));
              return;
            }

            function _compiled_program_main {
              test(3, 4);
              return;
            }
        "},
    },
    TestProgram {
        name: "nested-modulo",
        expected: Expected::Output("2\n"),
        source: indoc! {"
            function test {
              let total = _ARG0;
              let i = _ARG1;

              if ((i >= 4)) goto DONE;
              m64 = (i % 64);
              m32 = ((i % 64) % 32);
              m16 = (((i % 64) % 32) % 16);
              m8 = ((((i % 64) % 32) % 16) % 8);
              m4 = (((((i % 64) % 32) % 16) % 8) % 4);
              m2 = ((((((i % 64) % 32) % 16) % 8) % 4) % 2);
              r = test((total + m2), (i + 1));
              return r;
              DONE:
              return total;
            }

            function _compiled_program_main {
              v = test(0, 0);
              s = _builtin_intToString(v);
              _builtin_println(s);
              return;
            }
        "},
    },
    TestProgram {
        name: "strings-and-heap-arrays",
        expected: Expected::Output("Hello, world\n285\n43\n"),
        source: indoc! {r#"
            const GREETING = "Hello, ";
            const NAME = "world";
            const DIGITS = "42";

            function _compiled_program_main {
              greeting = _builtin_stringConcat(GREETING, NAME);
              _builtin_println(greeting);
              array = _builtin_malloc(80);
              i = 0;
              FILL:
              if ((i >= 10)) goto SUM;
              MEM[(array + (i * 8))] = (i * i);
              i = (i + 1);
              goto FILL;
              SUM:
              total = 0;
              j = 0;
              SUM_LOOP:
              if ((j >= 10)) goto PRINT;
              total = (total + MEM[(array + (j * 8))]);
              j = (j + 1);
              goto SUM_LOOP;
              PRINT:
              s = _builtin_intToString(total);
              _builtin_println(s);
              n = _builtin_stringToInt(DIGITS);
              t = _builtin_intToString((n + 1));
              _builtin_println(t);
              return;
            }
        "#},
    },
    TestProgram {
        name: "stack-arguments-and-function-pointers",
        expected: Expected::Output("128\n28\n"),
        source: indoc! {"
            function sum8 {
              let a = _ARG0;
              let b = _ARG1;
              let c = _ARG2;
              let d = _ARG3;
              let e = _ARG4;
              let f = _ARG5;
              let g = _ARG6;
              let h = _ARG7;

              return (((((((a + b) + c) + d) + e) + f) + g) + h);
            }

            function sum7 {
              let a = _ARG0;
              let b = _ARG1;
              let c = _ARG2;
              let d = _ARG3;
              let e = _ARG4;
              let f = _ARG5;
              let g = _ARG6;

              return ((((((a + b) + c) + d) + e) + f) + g);
            }

            function apply {
              let callee = _ARG0;
              let x = _ARG1;

              r = callee(x, 1, 2, 3, 4, 5, 6, 7);
              return r;
            }

            function printInt {
              let i = _ARG0;

              s = _builtin_intToString(i);
              _builtin_println(s);
              return;
            }

            function _compiled_program_main {
              v = apply(sum8, 100);
              printInt(v);
              w = sum7(1, 2, 3, 4, 5, 6, 7);
              printInt(w);
              return;
            }
        "},
    },
    TestProgram {
        name: "comparisons-as-values",
        expected: Expected::Output("10\n"),
        source: indoc! {"
            function isEven {
              let n = _ARG0;

              return ((n % 2) == 0);
            }

            function _compiled_program_main {
              x = isEven(10);
              y = isEven(7);
              s = _builtin_intToString(((x * 10) + y));
              _builtin_println(s);
              return;
            }
        "},
    },
    TestProgram {
        name: "register-pressure-across-calls",
        expected: Expected::Output("3\n820\n"),
        source: indoc! {"
            function printInt {
              let i = _ARG0;

              s = _builtin_intToString(i);
              _builtin_println(s);
              return;
            }

            function pressure {
              let seed = _ARG0;

              v0 = ((seed * 1) + 0);
              v1 = ((seed * 2) + 1);
              v2 = ((seed * 3) + 2);
              v3 = ((seed * 4) + 3);
              v4 = ((seed * 5) + 4);
              v5 = ((seed * 6) + 5);
              v6 = ((seed * 7) + 6);
              v7 = ((seed * 8) + 7);
              v8 = ((seed * 9) + 8);
              v9 = ((seed * 10) + 9);
              v10 = ((seed * 11) + 10);
              v11 = ((seed * 12) + 11);
              v12 = ((seed * 13) + 12);
              v13 = ((seed * 14) + 13);
              v14 = ((seed * 15) + 14);
              v15 = ((seed * 16) + 15);
              v16 = ((seed * 17) + 16);
              v17 = ((seed * 18) + 17);
              v18 = ((seed * 19) + 18);
              v19 = ((seed * 20) + 19);
              printInt(seed);
              a = (((v0 + v1) + (v2 + v3)) + ((v4 + v5) + (v6 + v7)));
              b = (((v8 + v9) + (v10 + v11)) + ((v12 + v13) + (v14 + v15)));
              c = ((v16 + v17) + (v18 + v19));
              return ((a + b) + c);
            }

            function _compiled_program_main {
              v = pressure(3);
              printInt(v);
              return;
            }
        "},
    },
    TestProgram {
        name: "division-by-zero-at-run-time",
        expected: Expected::Panic("Division by zero!"),
        source: indoc! {"
            function divide {
              let a = _ARG0;
              let b = _ARG1;

              return (a / b);
            }

            function _compiled_program_main {
              z = divide(1, 0);
              s = _builtin_intToString(z);
              _builtin_println(s);
              return;
            }
        "},
    },
    TestProgram {
        name: "explicit-throw",
        expected: Expected::Panic("oops"),
        source: indoc! {r#"
            const MESSAGE = "oops";

            function check {
              let n = _ARG0;

              if ((n != 0)) goto OK;
              _builtin_throw(MESSAGE);
              OK:
              return n;
            }

            function _compiled_program_main {
              a = check(5);
              b = check((a - 5));
              return;
            }
        "#},
    },
];

fn parse(program: &TestProgram) -> mir::CompilationUnit {
    let source = SourceFile {
        contents: program.source.to_owned(),
        origin: SourceFileOrigin::Memory,
    };

    Parser::parse_compilation_unit(&source)
}

fn optimize(unit: &mir::CompilationUnit, options: &OptimizationOptions) -> mir::CompilationUnit {
    optimize_compilation_unit(unit, options, &mut OptimizationResourceAllocator::new())
}

/// Backends raise their own panic messages for arithmetic faults, so
/// `exact_panics` is only set when the MidIR interpreter produced the result.
fn check(program: &TestProgram, stage: &str, result: Result<String, InterpretationError>, exact_panics: bool) {
    match (program.expected, result) {
        (Expected::Output(expected), Ok(output)) => {
            assert_eq!(output, expected, "{} printed the wrong output after {stage}", program.name)
        }
        (Expected::Panic(expected), Err(InterpretationError::Panic(message))) => {
            if exact_panics {
                assert_eq!(message, expected, "{} panicked differently after {stage}", program.name)
            }
        }
        (expected, result) => {
            panic!("{} expected {expected:?} after {stage}, got {result:?}", program.name)
        }
    }
}

fn single_pass_options() -> Vec<(&'static str, OptimizationOptions)> {
    let disabled = OptimizationOptions::all_disabled();

    vec![
        ("no optimization", disabled),
        (
            "constant propagation",
            OptimizationOptions {
                does_perform_constant_propagation: true,
                ..disabled
            },
        ),
        (
            "copy propagation",
            OptimizationOptions {
                does_perform_copy_propagation: true,
                ..disabled
            },
        ),
        (
            "local value numbering",
            OptimizationOptions {
                does_perform_local_value_numbering: true,
                ..disabled
            },
        ),
        (
            "common subexpression elimination",
            OptimizationOptions {
                does_perform_common_subexpression_elimination: true,
                ..disabled
            },
        ),
        (
            "dead code elimination",
            OptimizationOptions {
                does_perform_dead_code_elimination: true,
                ..disabled
            },
        ),
        (
            "inlining",
            OptimizationOptions {
                does_perform_inlining: true,
                ..disabled
            },
        ),
        (
            "tail recursion",
            OptimizationOptions {
                does_perform_tail_recursion_optimization: true,
                ..disabled
            },
        ),
    ]
}

#[test]
fn interpreter_runs_unoptimized_programs() {
    for program in TEST_PROGRAMS {
        check(program, "parsing", interpret_compilation_unit(&parse(program)), true);
    }
}

#[test]
fn every_pass_preserves_output() {
    for program in TEST_PROGRAMS {
        let unit = parse(program);

        for (stage, options) in single_pass_options() {
            check(program, stage, interpret_compilation_unit(&optimize(&unit, &options)), true);
        }
    }
}

#[test]
fn all_passes_together_preserve_output() {
    for program in TEST_PROGRAMS {
        let optimized = optimize(&parse(program), &OptimizationOptions::all_enabled());

        check(program, "all passes", interpret_compilation_unit(&optimized), true);
    }
}

#[test]
fn compiled_assembly_preserves_output() {
    let codegen_options = CodegenOptions {
        check_invariants: true,
        remove_comments: false,
    };

    for program in TEST_PROGRAMS {
        let unit = parse(program);

        for (stage, options) in [
            ("unoptimized code generation", OptimizationOptions::all_disabled()),
            ("optimized code generation", OptimizationOptions::all_enabled()),
        ] {
            let assembly = compile_to_assembly(&optimize(&unit, &options), &codegen_options);
            check(program, stage, interpret_assembly_program(&assembly), false);
        }
    }
}

#[test]
fn comment_free_assembly_preserves_output() {
    let codegen_options = CodegenOptions {
        check_invariants: false,
        remove_comments: true,
    };

    for program in TEST_PROGRAMS {
        let unit = optimize(&parse(program), &OptimizationOptions::all_enabled());
        let assembly = compile_to_assembly(&unit, &codegen_options);

        assert!(
            assembly
                .functions
                .iter()
                .flat_map(|function| &function.instructions)
                .all(|instruction| !matches!(instruction, crate::backend::asm::Instruction::Comment(_)))
        );
        check(program, "comment-free code generation", interpret_assembly_program(&assembly), false);
    }
}

#[test]
fn tail_recursion_turns_the_logarithm_sum_into_a_loop() {
    let program = &TEST_PROGRAMS[1];
    let optimized = optimize(
        &parse(program),
        &OptimizationOptions {
            does_perform_tail_recursion_optimization: true,
            ..OptimizationOptions::all_disabled()
        },
    );

    let Some(test) = optimized.function("test") else {
        panic!("test function disappeared");
    };
    assert!(test.body.iter().all(|statement| !matches!(
        statement,
        mir::Statement::Call { callee: mir::Expression::Name(name), .. } if name == "test"
    )));
    check(program, "tail recursion", interpret_compilation_unit(&optimized), true);
}
