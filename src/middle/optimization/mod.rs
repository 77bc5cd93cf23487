//! MidIR optimizations. Every pass takes an immutable function or unit and
//! returns a new one, and the peephole cleanup runs after each of them.

use colored::Colorize;

use crate::middle::mir;

pub mod allocator;
pub mod common_subexpression_elimination;
pub mod constant_folding;
pub mod constant_propagation;
pub mod copy_propagation;
pub mod dead_code_elimination;
pub mod inlining;
pub mod local_value_numbering;
pub mod simple;
pub mod tail_recursion;

use allocator::OptimizationResourceAllocator;
use common_subexpression_elimination::optimize_with_common_subexpression_elimination;
use constant_propagation::optimize_with_constant_propagation;
use copy_propagation::optimize_with_copy_propagation;
use dead_code_elimination::optimize_with_dead_code_elimination;
pub use inlining::InliningConfiguration;
use inlining::optimize_with_inlining;
use local_value_numbering::optimize_with_local_value_numbering;
use simple::optimize_with_simple_optimization;
use tail_recursion::optimize_with_tail_recursion;

/// Upper bound on the per-function rounds of the intra-procedural passes.
/// Most functions settle after two or three.
const MAXIMUM_FUNCTION_ROUNDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationOptions {
    pub does_perform_constant_propagation: bool,
    pub does_perform_copy_propagation: bool,
    pub does_perform_local_value_numbering: bool,
    pub does_perform_common_subexpression_elimination: bool,
    pub does_perform_dead_code_elimination: bool,
    pub does_perform_inlining: bool,
    pub does_perform_tail_recursion_optimization: bool,
    pub inlining: InliningConfiguration,
    /// Trace every pass that changes a function on stderr.
    pub verbose: bool,
}

impl OptimizationOptions {
    pub fn all_enabled() -> Self {
        Self {
            does_perform_constant_propagation: true,
            does_perform_copy_propagation: true,
            does_perform_local_value_numbering: true,
            does_perform_common_subexpression_elimination: true,
            does_perform_dead_code_elimination: true,
            does_perform_inlining: true,
            does_perform_tail_recursion_optimization: true,
            inlining: InliningConfiguration::default(),
            verbose: false,
        }
    }

    pub fn all_disabled() -> Self {
        Self {
            does_perform_constant_propagation: false,
            does_perform_copy_propagation: false,
            does_perform_local_value_numbering: false,
            does_perform_common_subexpression_elimination: false,
            does_perform_dead_code_elimination: false,
            does_perform_inlining: false,
            does_perform_tail_recursion_optimization: false,
            inlining: InliningConfiguration::default(),
            verbose: false,
        }
    }
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self::all_enabled()
    }
}

fn run_pass(
    options: &OptimizationOptions,
    pass_name: &str,
    function: mir::Function,
    pass: impl FnOnce(&mir::Function) -> Vec<mir::Statement>,
) -> mir::Function {
    let body = optimize_with_simple_optimization(&pass(&function));

    if options.verbose && body != function.body {
        eprintln!(
            "{} {}: {} -> {} statements",
            format!("[{pass_name}]").cyan(),
            function.name,
            function.body.len(),
            body.len()
        );
    }

    function.with_body(body)
}

fn optimize_function(
    function: &mir::Function,
    options: &OptimizationOptions,
    allocator: &mut OptimizationResourceAllocator,
) -> mir::Function {
    let mut function = if options.does_perform_tail_recursion_optimization {
        optimize_with_tail_recursion(function)
    } else {
        function.clone()
    };

    for _ in 0..MAXIMUM_FUNCTION_ROUNDS {
        let before = function.body.clone();

        if options.does_perform_constant_propagation {
            function = run_pass(options, "constant-propagation", function, |function| {
                optimize_with_constant_propagation(function)
            });
        }
        if options.does_perform_copy_propagation {
            function = run_pass(options, "copy-propagation", function, |function| {
                optimize_with_copy_propagation(&function.body)
            });
        }
        if options.does_perform_local_value_numbering {
            function = run_pass(options, "local-value-numbering", function, |function| {
                optimize_with_local_value_numbering(&function.body)
            });
        }
        if options.does_perform_common_subexpression_elimination {
            function = run_pass(options, "common-subexpression-elimination", function, |function| {
                optimize_with_common_subexpression_elimination(&function.body, allocator)
            });
        }
        if options.does_perform_dead_code_elimination {
            function = run_pass(options, "dead-code-elimination", function, |function| {
                optimize_with_dead_code_elimination(&function.body)
            });
        }

        if function.body == before {
            break;
        }
    }

    function
}

/// Runs the enabled passes over the whole unit: peephole cleanup, inlining
/// across functions, then tail recursion and the intra-procedural passes
/// per function until nothing changes.
pub fn optimize_compilation_unit(
    unit: &mir::CompilationUnit,
    options: &OptimizationOptions,
    allocator: &mut OptimizationResourceAllocator,
) -> mir::CompilationUnit {
    let mut unit =
        unit.map_functions(|function| function.with_body(optimize_with_simple_optimization(&function.body)));

    if options.does_perform_inlining {
        unit = optimize_with_inlining(&unit, allocator, &options.inlining);
    }

    unit.map_functions(|function| optimize_function(function, options, allocator))
}
