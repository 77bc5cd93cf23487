//! Abstract x86-64 assembly: the output of the tiler and the input of the
//! register allocator, the finalizer and the assembly interpreter.
//!
//! Operands may name abstract registers, which stand for MidIR temporaries
//! and tiler intermediates until the allocator colors them.

use crate::middle::{cfg::ControlFlowAdapter, optimization::simple::SimplifiableInstruction};

pub mod pretty_print;

/// General Purpose Register 64-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PhysicalRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
}

pub const ARGUMENT_REGISTERS: [PhysicalRegister; 6] = [
    PhysicalRegister::Rdi,
    PhysicalRegister::Rsi,
    PhysicalRegister::Rdx,
    PhysicalRegister::Rcx,
    PhysicalRegister::R8,
    PhysicalRegister::R9,
];

pub const CALLER_SAVED_REGISTERS: [PhysicalRegister; 9] = [
    PhysicalRegister::Rax,
    PhysicalRegister::Rcx,
    PhysicalRegister::Rdx,
    PhysicalRegister::Rsi,
    PhysicalRegister::Rdi,
    PhysicalRegister::R8,
    PhysicalRegister::R9,
    PhysicalRegister::R10,
    PhysicalRegister::R11,
];

pub const CALLEE_SAVED_REGISTERS: [PhysicalRegister; 5] = [
    PhysicalRegister::Rbx,
    PhysicalRegister::R12,
    PhysicalRegister::R13,
    PhysicalRegister::R14,
    PhysicalRegister::R15,
];

impl PhysicalRegister {
    /// Registers the allocator may hand out. The stack and frame pointers and
    /// the instruction pointer are never colors.
    pub fn is_allocatable(self) -> bool {
        !matches!(self, Self::Rsp | Self::Rbp | Self::Rip)
    }

    pub fn as_8_bit(self) -> ByteRegister {
        match self {
            Self::Rax => ByteRegister::Al,
            Self::Rbx => ByteRegister::Bl,
            Self::Rcx => ByteRegister::Cl,
            Self::Rdx => ByteRegister::Dl,
            Self::Rsi => ByteRegister::Sil,
            Self::Rdi => ByteRegister::Dil,
            Self::Rbp => ByteRegister::Bpl,
            Self::Rsp => ByteRegister::Spl,
            Self::R8 => ByteRegister::R8b,
            Self::R9 => ByteRegister::R9b,
            Self::R10 => ByteRegister::R10b,
            Self::R11 => ByteRegister::R11b,
            Self::R12 => ByteRegister::R12b,
            Self::R13 => ByteRegister::R13b,
            Self::R14 => ByteRegister::R14b,
            Self::R15 => ByteRegister::R15b,
            Self::Rip => internal_error!("rip has no 8-bit form"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[rustfmt::skip]
pub enum ByteRegister {
    Al, Bl, Cl, Dl,
    Sil, Dil, Bpl, Spl,
    R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Physical(PhysicalRegister),
    Abstract(String),
}

impl Register {
    pub fn abstract_named(name: impl Into<String>) -> Self {
        Register::Abstract(name.into())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Register::Abstract(_))
    }
}

impl From<PhysicalRegister> for Register {
    fn from(register: PhysicalRegister) -> Self {
        Register::Physical(register)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Displacement {
    Constant(i32),
    /// A symbol address, only ever paired with a `rip` base.
    Name(String),
}

/// `[base + index * scale + displacement]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Memory {
    pub base: Option<Register>,
    pub index: Option<(Register, u8)>,
    pub displacement: Option<Displacement>,
}

impl Memory {
    pub fn base(register: impl Into<Register>) -> Self {
        Self {
            base: Some(register.into()),
            ..Default::default()
        }
    }

    pub fn base_offset(register: impl Into<Register>, offset: i32) -> Self {
        Self {
            base: Some(register.into()),
            displacement: Some(Displacement::Constant(offset)),
            ..Default::default()
        }
    }

    pub fn rip_relative(name: impl Into<String>) -> Self {
        Self {
            base: Some(Register::Physical(PhysicalRegister::Rip)),
            displacement: Some(Displacement::Name(name.into())),
            ..Default::default()
        }
    }

    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.base
            .iter()
            .chain(self.index.as_ref().map(|(register, _)| register))
    }

    pub fn map_registers(&self, mut map: impl FnMut(&Register) -> Register) -> Self {
        Self {
            base: self.base.as_ref().map(&mut map),
            index: self
                .index
                .as_ref()
                .map(|(register, scale)| (map(register), *scale)),
            displacement: self.displacement.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Argument {
    Constant(i32),
    Name(String),
    Register(Register),
    Memory(Memory),
}

impl Argument {
    pub fn registers(&self) -> Vec<&Register> {
        match self {
            Argument::Register(register) => vec![register],
            Argument::Memory(memory) => memory.registers().collect(),
            Argument::Constant(_) | Argument::Name(_) => vec![],
        }
    }

    pub fn map_registers(&self, map: impl FnMut(&Register) -> Register) -> Self {
        let mut map = map;
        match self {
            Argument::Register(register) => Argument::Register(map(register)),
            Argument::Memory(memory) => Argument::Memory(memory.map_registers(map)),
            other => other.clone(),
        }
    }
}

impl From<Register> for Argument {
    fn from(register: Register) -> Self {
        Argument::Register(register)
    }
}

impl From<PhysicalRegister> for Argument {
    fn from(register: PhysicalRegister) -> Self {
        Argument::Register(Register::Physical(register))
    }
}

impl From<Memory> for Argument {
    fn from(memory: Memory) -> Self {
        Argument::Memory(memory)
    }
}

/// Signed condition codes, shared by `setcc` and `jcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConditionCode {
    L,
    Le,
    G,
    Ge,
    E,
    Ne,
}

impl ConditionCode {
    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Self::L => left < right,
            Self::Le => left <= right,
            Self::G => left > right,
            Self::Ge => left >= right,
            Self::E => left == right,
            Self::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOperator {
    Add,
    Sub,
    Xor,
}

impl ArithmeticOperator {
    pub fn apply(self, left: i64, right: i64) -> i64 {
        match self {
            Self::Add => left.wrapping_add(right),
            Self::Sub => left.wrapping_sub(right),
            Self::Xor => left ^ right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `movabs reg, imm64`
    MoveLong { destination: Register, value: i64 },
    /// `mov reg, src`
    MoveToRegister { destination: Register, source: Argument },
    /// `mov [mem], src`, where the source is never memory
    MoveToMemory { destination: Memory, source: Argument },
    LoadEffectiveAddress { destination: Register, address: Memory },
    Compare { left: Argument, right: Argument },
    /// `set<cc>` into the low byte followed by a zero extension of the whole
    /// register.
    SetOnCondition { condition: ConditionCode, destination: Register },
    /// `jmp` when there is no condition, `j<cc>` otherwise.
    Jump { condition: Option<ConditionCode>, label: String },
    Call { target: Argument, argument_count: usize },
    Return,
    Arithmetic {
        operator: ArithmeticOperator,
        destination: Argument,
        source: Argument,
    },
    /// `imul dst, src` or `imul dst, src, imm`
    Multiply {
        destination: Register,
        source: Argument,
        immediate: Option<i32>,
    },
    ShiftLeft { destination: Register, count: u8 },
    Cqo,
    Divide(Argument),
    Push(Argument),
    Pop(Register),
    Label(String),
    Comment(String),
}

impl Instruction {
    pub fn mov(destination: impl Into<Register>, source: impl Into<Argument>) -> Self {
        Instruction::MoveToRegister {
            destination: destination.into(),
            source: source.into(),
        }
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Instruction::Jump {
            condition: None,
            label: label.into(),
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Instruction::Label(label.into())
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Instruction::Comment(comment.into())
    }

    /// Registers read by the instruction, excluding the implicit stack pointer
    /// adjustments of `push`, `pop`, `call` and `ret`.
    pub fn used_registers(&self) -> Vec<Register> {
        fn use_argument(argument: &Argument, used: &mut Vec<Register>) {
            used.extend(argument.registers().into_iter().cloned())
        }

        let mut used = Vec::new();

        match self {
            Instruction::MoveLong { .. }
            | Instruction::SetOnCondition { .. }
            | Instruction::Jump { .. }
            | Instruction::Return
            | Instruction::Pop(_)
            | Instruction::Label(_)
            | Instruction::Comment(_) => {}
            Instruction::MoveToRegister { source, .. } => use_argument(source, &mut used),
            Instruction::MoveToMemory {
                destination,
                source,
            } => {
                used.extend(destination.registers().cloned());
                use_argument(source, &mut used);
            }
            Instruction::LoadEffectiveAddress { address, .. } => {
                used.extend(address.registers().cloned())
            }
            Instruction::Compare { left, right } => {
                use_argument(left, &mut used);
                use_argument(right, &mut used);
            }
            Instruction::Call {
                target,
                argument_count,
            } => {
                use_argument(target, &mut used);
                used.extend(
                    ARGUMENT_REGISTERS
                        .iter()
                        .take(*argument_count)
                        .map(|register| Register::Physical(*register)),
                );
            }
            Instruction::Arithmetic {
                destination,
                source,
                ..
            } => {
                use_argument(destination, &mut used);
                use_argument(source, &mut used);
            }
            Instruction::Multiply {
                destination,
                source,
                immediate,
            } => {
                if immediate.is_none() {
                    used.push(destination.clone());
                }
                use_argument(source, &mut used);
            }
            Instruction::ShiftLeft { destination, .. } => used.push(destination.clone()),
            Instruction::Cqo => used.push(PhysicalRegister::Rax.into()),
            Instruction::Divide(divisor) => {
                used.push(PhysicalRegister::Rax.into());
                used.push(PhysicalRegister::Rdx.into());
                use_argument(divisor, &mut used);
            }
            Instruction::Push(argument) => use_argument(argument, &mut used),
        }

        used
    }

    /// Registers written by the instruction.
    pub fn defined_registers(&self) -> Vec<Register> {
        match self {
            Instruction::MoveLong { destination, .. }
            | Instruction::MoveToRegister { destination, .. }
            | Instruction::LoadEffectiveAddress { destination, .. }
            | Instruction::SetOnCondition { destination, .. }
            | Instruction::Multiply { destination, .. }
            | Instruction::ShiftLeft { destination, .. }
            | Instruction::Pop(destination) => vec![destination.clone()],
            Instruction::Arithmetic {
                destination: Argument::Register(destination),
                ..
            } => vec![destination.clone()],
            Instruction::Call { .. } => CALLER_SAVED_REGISTERS
                .iter()
                .map(|register| Register::Physical(*register))
                .collect(),
            Instruction::Cqo => vec![PhysicalRegister::Rdx.into()],
            Instruction::Divide(_) => vec![PhysicalRegister::Rax.into(), PhysicalRegister::Rdx.into()],
            _ => vec![],
        }
    }

    /// Rewrites every register operand, both read and written ones.
    pub fn map_registers(&self, mut map: impl FnMut(&Register) -> Register) -> Self {
        match self {
            Instruction::MoveLong { destination, value } => Instruction::MoveLong {
                destination: map(destination),
                value: *value,
            },
            Instruction::MoveToRegister {
                destination,
                source,
            } => Instruction::MoveToRegister {
                destination: map(destination),
                source: source.map_registers(&mut map),
            },
            Instruction::MoveToMemory {
                destination,
                source,
            } => Instruction::MoveToMemory {
                destination: destination.map_registers(&mut map),
                source: source.map_registers(&mut map),
            },
            Instruction::LoadEffectiveAddress {
                destination,
                address,
            } => Instruction::LoadEffectiveAddress {
                destination: map(destination),
                address: address.map_registers(&mut map),
            },
            Instruction::Compare { left, right } => Instruction::Compare {
                left: left.map_registers(&mut map),
                right: right.map_registers(&mut map),
            },
            Instruction::SetOnCondition {
                condition,
                destination,
            } => Instruction::SetOnCondition {
                condition: *condition,
                destination: map(destination),
            },
            Instruction::Call {
                target,
                argument_count,
            } => Instruction::Call {
                target: target.map_registers(&mut map),
                argument_count: *argument_count,
            },
            Instruction::Arithmetic {
                operator,
                destination,
                source,
            } => Instruction::Arithmetic {
                operator: *operator,
                destination: destination.map_registers(&mut map),
                source: source.map_registers(&mut map),
            },
            Instruction::Multiply {
                destination,
                source,
                immediate,
            } => Instruction::Multiply {
                destination: map(destination),
                source: source.map_registers(&mut map),
                immediate: *immediate,
            },
            Instruction::ShiftLeft { destination, count } => Instruction::ShiftLeft {
                destination: map(destination),
                count: *count,
            },
            Instruction::Divide(divisor) => Instruction::Divide(divisor.map_registers(&mut map)),
            Instruction::Push(argument) => Instruction::Push(argument.map_registers(&mut map)),
            Instruction::Pop(register) => Instruction::Pop(map(register)),
            other => other.clone(),
        }
    }

    pub fn mentions_register(&self, register: &Register) -> bool {
        let mut found = false;
        self.map_registers(|candidate| {
            found |= candidate == register;
            candidate.clone()
        });
        found
    }
}

impl ControlFlowAdapter for Instruction {
    fn label(&self) -> Option<&str> {
        match self {
            Instruction::Label(label) => Some(label),
            _ => None,
        }
    }

    fn jump_target(&self) -> Option<&str> {
        match self {
            Instruction::Jump {
                condition: None,
                label,
            } => Some(label),
            _ => None,
        }
    }

    fn conditional_jump_target(&self) -> Option<&str> {
        match self {
            Instruction::Jump {
                condition: Some(_),
                label,
            } => Some(label),
            _ => None,
        }
    }

    fn is_return(&self) -> bool {
        matches!(self, Instruction::Return)
    }
}

impl SimplifiableInstruction for Instruction {
    fn retarget(&self, label: &str) -> Self {
        match self {
            Instruction::Jump { condition, .. } => Instruction::Jump {
                condition: *condition,
                label: label.to_owned(),
            },
            _ => self.clone(),
        }
    }

    fn is_no_op(&self) -> bool {
        matches!(
            self,
            Instruction::MoveToRegister {
                destination,
                source: Argument::Register(source),
            } if destination == source
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyFunction {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssemblyProgram {
    pub global_variables: Vec<crate::middle::mir::GlobalVariable>,
    pub functions: Vec<AssemblyFunction>,
}

pub fn epilogue_label(function_name: &str) -> String {
    format!("LABEL_FUNCTION_CALL_EPILOGUE_FOR_{function_name}")
}

/// Hands out fresh register names for one code generation run.
#[derive(Debug, Default)]
pub struct AssemblyResourceAllocator {
    next_abstract_register: usize,
    next_spill_register: usize,
}

impl AssemblyResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_register(&mut self) -> Register {
        let register = Register::Abstract(format!("_ABSTRACT_REG_{}", self.next_abstract_register));
        self.next_abstract_register += 1;
        register
    }

    pub fn allocate_spill_register(&mut self) -> Register {
        let register = Register::Abstract(format!("_SPILL_{}", self.next_spill_register));
        self.next_spill_register += 1;
        register
    }
}

pub fn is_spill_register(register: &Register) -> bool {
    matches!(register, Register::Abstract(name) if name.starts_with("_SPILL_"))
}
