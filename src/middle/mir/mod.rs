//! MidIR is the three-address style representation that every optimization
//! in this crate consumes and produces. Each function body is a flat list of
//! statements where control flow is expressed with labels, unconditional
//! jumps and conditional jumps that fall through to the next statement when
//! the condition is zero.
//!
//! Expressions are immutable trees. They derive `Hash`/`Eq` so that a whole
//! expression can be used as the key of a value numbering table or a
//! memoization cache without serializing it first.

use hashbrown::HashSet;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub mod pretty_print;

/// The name of the function that interpreters and generated code start at.
pub const MAIN_FUNCTION_NAME: &str = "_compiled_program_main";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "^")]
    Xor,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
}

impl BinaryOperator {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Multiply | Self::Xor | Self::Equal | Self::NotEqual
        )
    }

    pub fn is_division(self) -> bool {
        matches!(self, Self::Divide | Self::Modulo)
    }

    /// Computes `left op right` with 64-bit wrapping arithmetic. Returns
    /// `None` for a division or modulo by zero, which must trap at runtime
    /// instead of being folded.
    pub fn evaluate(self, left: i64, right: i64) -> Option<i64> {
        let value = match self {
            Self::Add => left.wrapping_add(right),
            Self::Subtract => left.wrapping_sub(right),
            Self::Multiply => left.wrapping_mul(right),
            Self::Divide => {
                if right == 0 {
                    return None;
                }
                left.wrapping_div(right)
            }
            Self::Modulo => {
                if right == 0 {
                    return None;
                }
                left.wrapping_rem(right)
            }
            Self::Xor => left ^ right,
            Self::LessThan => (left < right) as i64,
            Self::LessThanOrEqualTo => (left <= right) as i64,
            Self::GreaterThan => (left > right) as i64,
            Self::GreaterThanOrEqualTo => (left >= right) as i64,
            Self::Equal => (left == right) as i64,
            Self::NotEqual => (left != right) as i64,
        };

        Some(value)
    }
}

/// Runtime functions every execution engine provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Builtin {
    #[strum(serialize = "_builtin_malloc")]
    Malloc,
    #[strum(serialize = "_builtin_println")]
    Println,
    #[strum(serialize = "_builtin_throw")]
    Throw,
    #[strum(serialize = "_builtin_intToString")]
    IntToString,
    #[strum(serialize = "_builtin_stringToInt")]
    StringToInt,
    #[strum(serialize = "_builtin_stringConcat")]
    StringConcat,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expression {
    Constant(i64),
    /// A reference to a global string or a function.
    Name(String),
    Temporary(String),
    /// Reads the word at the address computed by the inner expression.
    Memory(Box<Expression>),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    #[cfg(test)]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn temporary(name: impl Into<String>) -> Self {
        Self::Temporary(name.into())
    }

    pub fn memory(address: Expression) -> Self {
        Self::Memory(Box::new(address))
    }

    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Self::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Constants, names and temporaries.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Constant(_) | Self::Name(_) | Self::Temporary(_))
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Self::Constant(value) => Some(*value),
            _ => None,
        }
    }

    pub fn contains_temporary(&self, temporary: &str) -> bool {
        match self {
            Self::Constant(_) | Self::Name(_) => false,
            Self::Temporary(name) => name == temporary,
            Self::Memory(address) => address.contains_temporary(temporary),
            Self::Binary { left, right, .. } => {
                left.contains_temporary(temporary) || right.contains_temporary(temporary)
            }
        }
    }

    pub fn contains_memory(&self) -> bool {
        match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => false,
            Self::Memory(_) => true,
            Self::Binary { left, right, .. } => left.contains_memory() || right.contains_memory(),
        }
    }

    /// Whether `other` occurs anywhere inside this expression, including the
    /// expression itself.
    pub fn contains(&self, other: &Expression) -> bool {
        if self == other {
            return true;
        }

        match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => false,
            Self::Memory(address) => address.contains(other),
            Self::Binary { left, right, .. } => left.contains(other) || right.contains(other),
        }
    }

    /// Whether evaluating the expression may raise a division or modulo by
    /// zero panic.
    pub fn may_trap(&self) -> bool {
        match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => false,
            Self::Memory(address) => address.may_trap(),
            Self::Binary {
                operator,
                left,
                right,
            } => {
                let divisor_may_be_zero =
                    operator.is_division() && !matches!(**right, Self::Constant(c) if c != 0);

                divisor_may_be_zero || left.may_trap() || right.may_trap()
            }
        }
    }

    pub fn collect_temporaries<'a>(&'a self, temporaries: &mut HashSet<&'a str>) {
        match self {
            Self::Constant(_) | Self::Name(_) => {}
            Self::Temporary(name) => {
                temporaries.insert(name);
            }
            Self::Memory(address) => address.collect_temporaries(temporaries),
            Self::Binary { left, right, .. } => {
                left.collect_temporaries(temporaries);
                right.collect_temporaries(temporaries);
            }
        }
    }

    /// Pushes every memory and binary sub-expression in evaluation order
    /// (children before parents).
    pub fn collect_compound_subexpressions<'a>(&'a self, expressions: &mut Vec<&'a Expression>) {
        match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => {}
            Self::Memory(address) => {
                address.collect_compound_subexpressions(expressions);
                expressions.push(self);
            }
            Self::Binary { left, right, .. } => {
                left.collect_compound_subexpressions(expressions);
                right.collect_compound_subexpressions(expressions);
                expressions.push(self);
            }
        }
    }

    /// Rebuilds the expression bottom-up, giving `rewrite` the chance to
    /// replace every node after its children have been rebuilt.
    pub fn rewrite_bottom_up(&self, rewrite: &mut impl FnMut(Expression) -> Expression) -> Self {
        let rebuilt = match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => self.clone(),
            Self::Memory(address) => Self::memory(address.rewrite_bottom_up(rewrite)),
            Self::Binary {
                operator,
                left,
                right,
            } => Self::binary(
                *operator,
                left.rewrite_bottom_up(rewrite),
                right.rewrite_bottom_up(rewrite),
            ),
        };

        rewrite(rebuilt)
    }

    /// Rebuilds the expression top-down. When `rewrite` returns `Some` for a
    /// node, that replacement is used as is and its children are not visited.
    pub fn rewrite_top_down(&self, rewrite: &mut impl FnMut(&Expression) -> Option<Expression>) -> Self {
        if let Some(replacement) = rewrite(self) {
            return replacement;
        }

        match self {
            Self::Constant(_) | Self::Name(_) | Self::Temporary(_) => self.clone(),
            Self::Memory(address) => Self::memory(address.rewrite_top_down(rewrite)),
            Self::Binary {
                operator,
                left,
                right,
            } => Self::binary(
                *operator,
                left.rewrite_top_down(rewrite),
                right.rewrite_top_down(rewrite),
            ),
        }
    }

    /// Replaces temporaries according to `replacement`, leaving the ones it
    /// returns `None` for untouched.
    pub fn substitute_temporaries(&self, replacement: &impl Fn(&str) -> Option<Expression>) -> Self {
        self.rewrite_top_down(&mut |expression| match expression {
            Self::Temporary(name) => replacement(name),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    MoveTemporary {
        destination: String,
        source: Expression,
    },
    MoveMemory {
        address: Expression,
        source: Expression,
    },
    Jump(String),
    Label(String),
    Call {
        callee: Expression,
        arguments: Vec<Expression>,
        collector: Option<String>,
    },
    Return(Option<Expression>),
    /// Jumps to `label` when the condition is nonzero, otherwise falls
    /// through to the next statement.
    ConditionalJumpFallThrough {
        condition: Expression,
        label: String,
    },
}

impl Statement {
    pub fn move_temporary(destination: impl Into<String>, source: Expression) -> Self {
        Self::MoveTemporary {
            destination: destination.into(),
            source,
        }
    }

    #[cfg(test)]
    pub fn move_memory(address: Expression, source: Expression) -> Self {
        Self::MoveMemory { address, source }
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Self::Jump(label.into())
    }

    #[cfg(test)]
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    #[cfg(test)]
    pub fn call(callee: Expression, arguments: Vec<Expression>, collector: Option<&str>) -> Self {
        Self::Call {
            callee,
            arguments,
            collector: collector.map(str::to_owned),
        }
    }

    pub fn conditional_jump(condition: Expression, label: impl Into<String>) -> Self {
        Self::ConditionalJumpFallThrough {
            condition,
            label: label.into(),
        }
    }

    /// The temporary written by this statement, if any.
    pub fn defined_temporary(&self) -> Option<&str> {
        match self {
            Self::MoveTemporary { destination, .. } => Some(destination),
            Self::Call { collector, .. } => collector.as_deref(),
            _ => None,
        }
    }

    /// Whether the statement may write to memory.
    pub fn writes_memory(&self) -> bool {
        matches!(self, Self::MoveMemory { .. } | Self::Call { .. })
    }

    /// Every expression read by the statement, in evaluation order.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Self::MoveTemporary { source, .. } => vec![source],
            Self::MoveMemory { address, source } => vec![address, source],
            Self::Jump(_) | Self::Label(_) | Self::Return(None) => vec![],
            Self::Call {
                callee, arguments, ..
            } => std::iter::once(callee).chain(arguments).collect(),
            Self::Return(Some(value)) => vec![value],
            Self::ConditionalJumpFallThrough { condition, .. } => vec![condition],
        }
    }

    pub fn used_temporaries(&self) -> HashSet<&str> {
        let mut temporaries = HashSet::new();

        for expression in self.expressions() {
            expression.collect_temporaries(&mut temporaries);
        }

        temporaries
    }

    /// Every memory and binary sub-expression read by the statement, in
    /// evaluation order.
    pub fn compound_subexpressions(&self) -> Vec<&Expression> {
        let mut expressions = Vec::new();

        for expression in self.expressions() {
            expression.collect_compound_subexpressions(&mut expressions);
        }

        expressions
    }

    /// Rebuilds the statement with every expression it reads replaced by
    /// `rewrite(expression)`. Written temporaries and labels are kept.
    pub fn map_expressions(&self, mut rewrite: impl FnMut(&Expression) -> Expression) -> Self {
        match self {
            Self::MoveTemporary {
                destination,
                source,
            } => Self::MoveTemporary {
                destination: destination.clone(),
                source: rewrite(source),
            },
            Self::MoveMemory { address, source } => Self::MoveMemory {
                address: rewrite(address),
                source: rewrite(source),
            },
            Self::Jump(_) | Self::Label(_) | Self::Return(None) => self.clone(),
            Self::Call {
                callee,
                arguments,
                collector,
            } => Self::Call {
                callee: rewrite(callee),
                arguments: arguments.iter().map(&mut rewrite).collect(),
                collector: collector.clone(),
            },
            Self::Return(Some(value)) => Self::Return(Some(rewrite(value))),
            Self::ConditionalJumpFallThrough { condition, label } => {
                Self::ConditionalJumpFallThrough {
                    condition: rewrite(condition),
                    label: label.clone(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Statement>,
    pub has_return: bool,
}

impl Function {
    pub fn with_body(&self, body: Vec<Statement>) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            body,
            has_return: self.has_return,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationUnit {
    pub global_variables: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
}

impl CompilationUnit {
    #[cfg(test)]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn map_functions(&self, mut transform: impl FnMut(&Function) -> Function) -> Self {
        Self {
            global_variables: self.global_variables.clone(),
            functions: self.functions.iter().map(&mut transform).collect(),
        }
    }
}
