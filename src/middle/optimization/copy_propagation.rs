use crate::middle::{
    analysis::available_copies::{compute_available_copies, resolve_copy},
    mir,
};

/// Rewrites every read of a copied temporary to read the root of its copy
/// chain instead.
pub fn optimize_with_copy_propagation(statements: &[mir::Statement]) -> Vec<mir::Statement> {
    let copies = compute_available_copies(statements);

    statements
        .iter()
        .zip(&copies.in_edges)
        .map(|(statement, copies)| {
            if copies.is_empty() {
                return statement.clone();
            }

            statement.map_expressions(|expression| {
                expression.substitute_temporaries(&|temporary| {
                    let root = resolve_copy(copies, temporary);
                    (root != temporary).then(|| mir::Expression::temporary(root))
                })
            })
        })
        .collect()
}
