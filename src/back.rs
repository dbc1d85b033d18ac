//! The back-end of the compiler.
//!
//! A fixed pipeline over the checked AST: layout planning, TAC emission,
//! control-flow construction, liveness, register allocation, and MIPS
//! printing.  [compile] runs the whole thing; [emit_program] stops after
//! emission for callers that want the TAC stream.

pub mod cfg;
pub mod codegen;
pub mod layout;
pub mod liveness;
pub mod mips;
pub mod regalloc;

pub use codegen::*;
pub use mips::*;
