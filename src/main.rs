use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;

use crate::{
    backend::{
        CodegenOptions,
        asm::pretty_print::{colorize_assembly, pretty_print_assembly},
        compile_to_assembly,
        interpreter::interpret_assembly_program,
        target::{CodeGenerator, Target},
    },
    frontend::{SourceFile, SourceFileOrigin, parser::Parser},
    middle::{
        interpreter::interpret_compilation_unit,
        mir::pretty_print::{colorize_mir, pretty_print_mir},
        optimization::{
            InliningConfiguration, OptimizationOptions, allocator::OptimizationResourceAllocator,
            optimize_compilation_unit,
        },
    },
};

#[macro_use]
mod diagnostics;
mod backend;
mod frontend;
mod middle;
#[cfg(test)]
mod test_programs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Emit {
    /// Optimized MidIR
    Mir,
    /// Allocated and finalized assembly
    Asm,
    /// NASM source
    Nasm,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    #[arg(long, value_enum, default_value_t = Target::x86_64LinuxGnu)]
    target: Target,

    /// Interpret the result and print what the program prints
    #[arg(long)]
    run: bool,

    /// Write the output to a file instead of stdout
    #[arg(short)]
    output: Option<PathBuf>,

    /// Optimization level, 0 disables every optimization
    #[arg(short = 'O', default_value_t = 1)]
    optimization_level: u8,

    #[arg(long)]
    no_constant_propagation: bool,
    #[arg(long)]
    no_copy_propagation: bool,
    #[arg(long)]
    no_local_value_numbering: bool,
    #[arg(long)]
    no_common_subexpression_elimination: bool,
    #[arg(long)]
    no_dead_code_elimination: bool,
    #[arg(long)]
    no_inlining: bool,
    #[arg(long)]
    no_tail_recursion: bool,

    #[arg(long, default_value_t = 25)]
    inline_threshold: usize,
    #[arg(long, default_value_t = 1000)]
    perform_inline_threshold: usize,
    #[arg(long, default_value_t = 5)]
    inline_rounds: usize,

    /// Verify register allocation against the interference graph
    #[arg(long)]
    check_invariants: bool,
    #[arg(long)]
    remove_comments: bool,

    /// Trace every optimization pass on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn optimization_options(&self) -> OptimizationOptions {
        let mut options = if self.optimization_level == 0 {
            OptimizationOptions::all_disabled()
        } else {
            OptimizationOptions::all_enabled()
        };

        options.does_perform_constant_propagation &= !self.no_constant_propagation;
        options.does_perform_copy_propagation &= !self.no_copy_propagation;
        options.does_perform_local_value_numbering &= !self.no_local_value_numbering;
        options.does_perform_common_subexpression_elimination &=
            !self.no_common_subexpression_elimination;
        options.does_perform_dead_code_elimination &= !self.no_dead_code_elimination;
        options.does_perform_inlining &= !self.no_inlining;
        options.does_perform_tail_recursion_optimization &= !self.no_tail_recursion;
        options.inlining = InliningConfiguration {
            inlinable_cost_threshold: self.inline_threshold,
            performer_cost_threshold: self.perform_inline_threshold,
            maximum_rounds: self.inline_rounds,
        };
        options.verbose = self.verbose;

        options
    }

    fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            check_invariants: self.check_invariants,
            remove_comments: self.remove_comments,
        }
    }
}

fn main() {
    let args = Args::parse();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    /* Read in source files */

    let source_files = args
        .source_files
        .iter()
        .map(|path| match std::fs::read_to_string(path) {
            Ok(contents) => SourceFile {
                contents,
                origin: SourceFileOrigin::File(path.clone()),
            },
            Err(error) => Args::command()
                .error(
                    ErrorKind::Io,
                    format!("Failed to read '{}': {error}", path.display()),
                )
                .exit(),
        })
        .collect::<Vec<_>>();

    let optimization_options = args.optimization_options();
    let codegen_options = args.codegen_options();
    let mut output = String::new();

    for source_file in &source_files {
        let unit = Parser::parse_compilation_unit(source_file);

        let mut allocator = OptimizationResourceAllocator::new();
        let unit = optimize_compilation_unit(&unit, &optimization_options, &mut allocator);

        let printing = args.output.is_none() && !args.run;

        let result = match (args.emit, args.run) {
            (Emit::Mir, true) => interpret_compilation_unit(&unit),
            (_, true) => interpret_assembly_program(&compile_to_assembly(&unit, &codegen_options)),
            (Emit::Mir, false) if printing => {
                pretty_print_mir(&unit);
                continue;
            }
            (Emit::Mir, false) => Ok(colorize_mir(&unit)),
            (Emit::Asm, false) if printing => {
                pretty_print_assembly(&compile_to_assembly(&unit, &codegen_options));
                continue;
            }
            (Emit::Asm, false) => Ok(colorize_assembly(&compile_to_assembly(&unit, &codegen_options))),
            (Emit::Nasm, false) => Ok(args
                .target
                .get_code_generator()
                .translate_to_asm(&compile_to_assembly(&unit, &codegen_options))),
        };

        match result {
            Ok(text) => output.push_str(&text),
            Err(error) => {
                eprintln!("{}", format!("{}: {error}", source_file.origin).red());
                std::process::exit(1);
            }
        }
    }

    match &args.output {
        Some(path) => {
            if let Err(error) = std::fs::write(path, strip_ansi_escapes::strip_str(&output)) {
                Args::command()
                    .error(
                        ErrorKind::Io,
                        format!("Failed to write '{}': {error}", path.display()),
                    )
                    .exit()
            }
        }
        None => print!("{output}"),
    }
}
