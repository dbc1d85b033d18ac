//! The abstract syntax tree.
//!
//! The parser builds this tree and the back end consumes it as-is.  There are
//! no parent links: passes that need surrounding context (the enclosing
//! function, class, or loop) thread it explicitly while walking down.

use crate::common::Id;
use crate::front::ty::Type;

/// A name as written in the source, with the line it appeared on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identifier {
    pub name: Id,
    pub line: usize,
}

#[derive(Debug)]
pub struct Program {
    pub decls: Vec<Decl>,
}

#[derive(Debug)]
pub enum Decl {
    Var(VarDecl),
    Fn(FnDecl),
    Class(ClassDecl),
    Interface(InterfaceDecl),
}

#[derive(Debug)]
pub struct VarDecl {
    pub id: Identifier,
    pub ty: Type,
}

#[derive(Debug)]
pub struct FnDecl {
    pub id: Identifier,
    pub ret: Type,
    pub formals: Vec<VarDecl>,
    /// The body block; `None` for interface prototypes.
    pub body: Option<Stmt>,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub id: Identifier,
    pub extends: Option<Identifier>,
    pub implements: Vec<Identifier>,
    /// Field and method declarations, in source order.
    pub members: Vec<Decl>,
}

#[derive(Debug)]
pub struct InterfaceDecl {
    pub id: Identifier,
    pub members: Vec<FnDecl>,
}

#[derive(Debug)]
pub enum Stmt {
    Block(StmtBlock),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Expr>,
        test: Expr,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Break {
        line: usize,
    },
    Return {
        expr: Option<Expr>,
        line: usize,
    },
    Print {
        args: Vec<Expr>,
    },
    Expr(Expr),
}

/// A brace-delimited block: leading variable declarations, then statements.
#[derive(Debug)]
pub struct StmtBlock {
    pub decls: Vec<VarDecl>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Expr {
    IntLit(i32),
    DoubleLit(f64),
    BoolLit(bool),
    StringLit(String),
    Null,
    This {
        line: usize,
    },
    /// Both `base.field` and a bare `field`; a bare name may resolve to a
    /// local, a member of the enclosing class, or a global.
    FieldAccess {
        base: Option<Box<Expr>>,
        field: Identifier,
    },
    ArrayAccess {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// Both `base.method(...)` and a bare `method(...)`.
    Call {
        base: Option<Box<Expr>>,
        method: Identifier,
        actuals: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    New {
        class: Identifier,
    },
    NewArray {
        size: Box<Expr>,
        elem: Type,
    },
    ReadInteger,
    ReadLine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
    And,
    Or,
}
