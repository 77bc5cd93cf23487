use crate::middle::{analysis::local_numbering::compute_local_numbering, mir};

/// Replaces compound expressions whose value is already held by a temporary
/// in the same extended basic block with that temporary.
pub fn optimize_with_local_value_numbering(statements: &[mir::Statement]) -> Vec<mir::Statement> {
    let numbering = compute_local_numbering(statements);

    statements
        .iter()
        .zip(&numbering)
        .map(|(statement, information)| {
            statement.map_expressions(|expression| {
                expression.rewrite_top_down(&mut |expression| {
                    if expression.is_primitive() {
                        return None;
                    }
                    information
                        .replace_with_temporary(expression)
                        .map(mir::Expression::temporary)
                })
            })
        })
        .collect()
}
