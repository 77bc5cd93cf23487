use crate::middle::{analysis::live_temporaries::compute_live_temporaries, mir};

/// Drops moves into temporaries that are never read afterwards. A move
/// whose source may trap is kept so the panic still happens.
pub fn optimize_with_dead_code_elimination(statements: &[mir::Statement]) -> Vec<mir::Statement> {
    let liveness = compute_live_temporaries(statements);

    statements
        .iter()
        .zip(&liveness.out_edges)
        .filter(|(statement, live_out)| match statement {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => live_out.contains(destination) || source.may_trap(),
            _ => true,
        })
        .map(|(statement, _)| statement.clone())
        .collect()
}
