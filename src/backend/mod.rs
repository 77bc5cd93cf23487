//! The backend lowers optimized MidIR to x86-64. Code generation happens
//! in three steps per function:
//! 1. Tile the statements into assembly over unlimited abstract registers.
//! 2. Color the abstract registers with physical ones, spilling to the
//!    stack until coloring succeeds.
//! 3. Wrap the body in its prologue and epilogue.

use crate::middle::{mir, optimization::simple::simplify};

pub mod asm;
pub mod finalizer;
pub mod interpreter;
pub mod liveness;
pub mod register_allocation;
pub mod spilling;
pub mod target;
pub mod tiling;

use asm::{AssemblyProgram, AssemblyResourceAllocator, Instruction};
use finalizer::finalize_function;
use register_allocation::allocate_registers;
use tiling::tile_function;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Verify the coloring against the interference graph after allocation.
    pub check_invariants: bool,
    pub remove_comments: bool,
}

pub fn compile_to_assembly(unit: &mir::CompilationUnit, options: &CodegenOptions) -> AssemblyProgram {
    let mut allocator = AssemblyResourceAllocator::new();

    let functions = unit
        .functions
        .iter()
        .map(|function| {
            let tiled = tile_function(function, &mut allocator);

            let instructions = if options.remove_comments {
                tiled
                    .instructions
                    .into_iter()
                    .filter(|instruction| !matches!(instruction, Instruction::Comment(_)))
                    .collect()
            } else {
                tiled.instructions
            };

            let allocated = allocate_registers(
                &function.name,
                &simplify(&instructions),
                function.has_return,
                &mut allocator,
                options.check_invariants,
            );

            finalize_function(&allocated)
        })
        .collect();

    AssemblyProgram {
        global_variables: unit.global_variables.clone(),
        functions,
    }
}
