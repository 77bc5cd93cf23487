//! Value numbering within extended basic blocks.
//!
//! Every value computed in a block gets a number, and expressions are keyed
//! by the numbers of their operands instead of by temporary names. Two
//! expressions share a number exactly when they provably compute the same
//! value, so redefining a temporary never invalidates an expression key; it
//! only stops that temporary from holding its old number.
//!
//! The numbering restarts at every label because a label may be reached
//! from more than one place.

use hashbrown::HashMap;

use crate::middle::mir;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Constant(i64),
    Name(String),
    Memory(usize),
    Binary(mir::BinaryOperator, usize, usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalNumberingInformation {
    value_numbers: HashMap<ValueKey, usize>,
    temporary_numbers: HashMap<String, usize>,
    /// The temporary currently holding each number, if any.
    holders: HashMap<usize, String>,
    next_number: usize,
}

impl LocalNumberingInformation {
    /// The temporary already holding the value of `expression`, if there is
    /// one.
    pub fn replace_with_temporary(&self, expression: &mir::Expression) -> Option<&str> {
        let number = self.lookup(expression)?;
        self.holders.get(&number).map(String::as_str)
    }

    #[cfg(test)]
    pub fn value_number(&self, expression: &mir::Expression) -> Option<usize> {
        self.lookup(expression)
    }

    fn lookup(&self, expression: &mir::Expression) -> Option<usize> {
        match expression {
            mir::Expression::Temporary(name) => self.temporary_numbers.get(name).copied(),
            _ => self.value_numbers.get(&self.key(expression)?).copied(),
        }
    }

    fn key(&self, expression: &mir::Expression) -> Option<ValueKey> {
        let key = match expression {
            mir::Expression::Constant(value) => ValueKey::Constant(*value),
            mir::Expression::Name(name) => ValueKey::Name(name.clone()),
            mir::Expression::Temporary(_) => return None,
            mir::Expression::Memory(address) => ValueKey::Memory(self.lookup(address)?),
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => Self::binary_key(*operator, self.lookup(left)?, self.lookup(right)?),
        };

        Some(key)
    }

    fn binary_key(operator: mir::BinaryOperator, left: usize, right: usize) -> ValueKey {
        if operator.is_commutative() && right < left {
            ValueKey::Binary(operator, right, left)
        } else {
            ValueKey::Binary(operator, left, right)
        }
    }

    fn fresh_number(&mut self) -> usize {
        self.next_number += 1;
        self.next_number
    }

    /// Numbers `expression` and all of its sub-expressions, allocating fresh
    /// numbers for values seen for the first time.
    fn number(&mut self, expression: &mir::Expression) -> usize {
        let key = match expression {
            mir::Expression::Constant(value) => ValueKey::Constant(*value),
            mir::Expression::Name(name) => ValueKey::Name(name.clone()),
            mir::Expression::Temporary(name) => {
                if let Some(number) = self.temporary_numbers.get(name) {
                    return *number;
                }
                let number = self.fresh_number();
                self.bind_temporary(name, number);
                return number;
            }
            mir::Expression::Memory(address) => ValueKey::Memory(self.number(address)),
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.number(left);
                let right = self.number(right);
                Self::binary_key(*operator, left, right)
            }
        };

        if let Some(number) = self.value_numbers.get(&key) {
            return *number;
        }

        let number = self.fresh_number();
        self.value_numbers.insert(key, number);
        number
    }

    fn unbind_temporary(&mut self, name: &str) {
        let Some(old_number) = self.temporary_numbers.remove(name) else {
            return;
        };

        if self.holders.get(&old_number).map(String::as_str) != Some(name) {
            return;
        }

        // Hand the value over to another temporary that still holds it.
        match self
            .temporary_numbers
            .iter()
            .find(|(_, number)| **number == old_number)
        {
            Some((other, _)) => {
                self.holders.insert(old_number, other.clone());
            }
            None => {
                self.holders.remove(&old_number);
            }
        }
    }

    fn bind_temporary(&mut self, name: &str, number: usize) {
        self.temporary_numbers.insert(name.to_owned(), number);
        self.holders.entry(number).or_insert_with(|| name.to_owned());
    }

    fn forget_memory(&mut self) {
        self.value_numbers
            .retain(|key, _| !matches!(key, ValueKey::Memory(_)));
    }

    /// The numbering in effect right after `statement`.
    pub fn after(&self, statement: &mir::Statement) -> Self {
        if let mir::Statement::Label(_) = statement {
            return Self {
                next_number: self.next_number,
                ..Self::default()
            };
        }

        let mut information = self.clone();

        for expression in statement.expressions() {
            information.number(expression);
        }

        match statement {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => {
                let number = information.number(source);
                information.unbind_temporary(destination);
                information.bind_temporary(destination, number);
            }
            mir::Statement::MoveMemory { .. } => information.forget_memory(),
            mir::Statement::Call { collector, .. } => {
                information.forget_memory();
                if let Some(collector) = collector {
                    information.unbind_temporary(collector);
                    let number = information.fresh_number();
                    information.bind_temporary(collector, number);
                }
            }
            mir::Statement::Jump(_)
            | mir::Statement::Label(_)
            | mir::Statement::Return(_)
            | mir::Statement::ConditionalJumpFallThrough { .. } => {}
        }

        information
    }
}

/// The numbering in effect right before each statement.
pub fn compute_local_numbering(statements: &[mir::Statement]) -> Vec<LocalNumberingInformation> {
    let mut information = LocalNumberingInformation::default();
    let mut result = Vec::with_capacity(statements.len());

    for statement in statements {
        let next = information.after(statement);
        result.push(information);
        information = next;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::mir::{BinaryOperator, Expression, Statement};

    fn sum(left: &str, right: &str) -> Expression {
        Expression::binary(
            BinaryOperator::Add,
            Expression::temporary(left),
            Expression::temporary(right),
        )
    }

    #[test]
    fn finds_temporaries_holding_equal_values() {
        let statements = vec![
            Statement::move_temporary("x", sum("a", "b")),
            Statement::move_temporary("c", Expression::temporary("a")),
            Statement::move_temporary("y", sum("b", "c")),
            Statement::Return(None),
        ];

        let numbering = compute_local_numbering(&statements);

        assert_eq!(numbering[0].replace_with_temporary(&sum("a", "b")), None);
        assert_eq!(numbering[2].replace_with_temporary(&sum("b", "c")), Some("x"));
        assert_eq!(
            numbering[3].value_number(&Expression::temporary("y")),
            numbering[3].value_number(&Expression::temporary("x"))
        );
    }

    #[test]
    fn redefinition_hands_values_to_other_holders() {
        let statements = vec![
            Statement::move_temporary("x", sum("a", "b")),
            Statement::move_temporary("y", Expression::temporary("x")),
            Statement::move_temporary("x", Expression::Constant(0)),
            Statement::Return(None),
        ];

        let numbering = compute_local_numbering(&statements);

        assert_eq!(numbering[3].replace_with_temporary(&sum("a", "b")), Some("y"));
    }

    #[test]
    fn labels_reset_the_numbering() {
        let statements = vec![
            Statement::move_temporary("x", sum("a", "b")),
            Statement::label("L"),
            Statement::move_temporary("y", sum("a", "b")),
        ];

        let numbering = compute_local_numbering(&statements);

        assert_eq!(numbering[1].replace_with_temporary(&sum("a", "b")), Some("x"));
        assert_eq!(numbering[2].replace_with_temporary(&sum("a", "b")), None);
    }

    #[test]
    fn stores_and_calls_forget_loads() {
        let load = Expression::memory(Expression::temporary("p"));
        let statements = vec![
            Statement::move_temporary("x", load.clone()),
            Statement::call(Expression::name("f"), vec![], None),
            Statement::Return(None),
        ];

        let numbering = compute_local_numbering(&statements);

        assert_eq!(numbering[1].replace_with_temporary(&load), Some("x"));
        assert_eq!(numbering[2].replace_with_temporary(&load), None);
    }
}
