//! Dataflow analyses over MidIR. Each analysis is a [`DataflowOperator`]
//! together with a convenience function that runs it over a statement list.
//!
//! [`DataflowOperator`]: crate::middle::dataflow::DataflowOperator

pub mod available_copies;
pub mod available_expressions;
pub mod constant_propagation;
pub mod live_temporaries;
pub mod local_numbering;
