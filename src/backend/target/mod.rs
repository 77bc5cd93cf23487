use crate::backend::asm::AssemblyProgram;

mod x86_64_linux_gnu;

pub trait CodeGenerator {
    /// Renders a finalized program as assembler source.
    fn translate_to_asm(&self, program: &AssemblyProgram) -> String;
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    #[value(name = "x86_64-linux-gnu")]
    x86_64LinuxGnu,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::x86_64LinuxGnu => x86_64_linux_gnu::CodeGeneratorX86_64LinuxGnu,
        }
    }
}
