//! MidIR, the analyses and optimizations over it, and the reference
//! interpreter that defines its semantics.

pub mod analysis;
pub mod cfg;
pub mod dataflow;
pub mod interpreter;
pub mod mir;
pub mod optimization;
pub mod runtime;
