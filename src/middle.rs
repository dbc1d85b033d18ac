//! The middle of the compiler: the three-address-code intermediate
//! representation shared by the back-end passes.

pub mod tac;

pub use tac::*;
