//! The Decaf type model.
//!
//! Types reach the back end already checked; the emitter only consults them
//! to pick builtins (string equality, the `Print` family) and to find the
//! class behind a member access.

use derive_more::Display;

use crate::common::Id;

/// A source-level type.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Type {
    #[display("int")]
    Int,
    #[display("double")]
    Double,
    #[display("bool")]
    Bool,
    #[display("string")]
    String,
    #[display("void")]
    Void,
    #[display("null")]
    Null,
    #[display("error")]
    Error,
    /// A class or interface type, by name.
    #[display("{_0}")]
    Named(Id),
    /// An array of the element type.
    #[display("{_0}[]")]
    Array(Box<Type>),
}

impl Type {
    pub fn is_string(&self) -> bool {
        matches!(self, Type::String)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// The element type, if this is an array type.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// The class (or interface) name, if this is a named type.
    pub fn class_name(&self) -> Option<Id> {
        match self {
            Type::Named(name) => Some(*name),
            _ => None,
        }
    }
}
