//! TAC emission.
//!
//! The second walk over the checked AST.  [CodeGen] owns the append-only
//! instruction stream, the `_tmpN`/`_LN` counters, and, while a function
//! body is being lowered, the frame cursor and the scope stack.  Every
//! expression emitter returns the [Location] holding its runtime value.
//!
//! Name resolution happens here rather than through parent links on the
//! tree: lookups go through the active block scopes (formals included),
//! then the enclosing class's fields, then the program globals.  `break`
//! likewise targets the innermost entry of a loop-end-label stack.

use std::fmt::Debug;

use derive_more::derive::Display;

use super::cfg::Cfg;
use super::layout::{ClassInfo, Layout, WORD_SIZE};
use super::liveness;
use super::mips::Mips;
use super::regalloc;
use crate::common::{id, Id, Map};
use crate::front::ast::*;
use crate::front::ty::Type;
use crate::middle::tac::{print_tac, Instruction, Location, OpCode};

pub const ERR_ARRAY_OUT_OF_BOUNDS: &str =
    "Decaf runtime error: Array subscript out of bounds\\n";
pub const ERR_ARRAY_BAD_SIZE: &str = "Decaf runtime error: Array size is <= 0\\n";

/// The one user-visible back-end failure: a program with no entry point.
#[derive(Display)]
#[display("*** Error: No main function found")]
pub struct NoMainError;

impl Debug for NoMainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// The entry points the emitted code may call into the runtime library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Alloc,
    ReadLine,
    ReadInteger,
    StringEqual,
    PrintInt,
    PrintString,
    PrintBool,
    Halt,
}

impl Builtin {
    pub fn label(self) -> Id {
        id(match self {
            Builtin::Alloc => "_Alloc",
            Builtin::ReadLine => "_ReadLine",
            Builtin::ReadInteger => "_ReadInteger",
            Builtin::StringEqual => "_StringEqual",
            Builtin::PrintInt => "_PrintInt",
            Builtin::PrintString => "_PrintString",
            Builtin::PrintBool => "_PrintBool",
            Builtin::Halt => "_Halt",
        })
    }

    fn has_return(self) -> bool {
        matches!(
            self,
            Builtin::Alloc | Builtin::ReadLine | Builtin::ReadInteger | Builtin::StringEqual
        )
    }
}

/// A resolved variable occurrence.
enum VarSite {
    /// Directly addressable: a local, a formal, or a global.
    Direct(Binding),
    /// A field of the enclosing class, reached through `this`.
    Member { offset: i32, ty: Type },
}

/// A resolved call target.
enum CallSite {
    Function { label: Id, ret: Type },
    Method { class: Id, label: Id, ret: Type },
}

/// Where an assignment may land.
enum Place {
    Plain(Location),
    Indirect { base: Location, offset: i32 },
}

#[derive(Clone)]
struct Binding {
    loc: Location,
    ty: Type,
}

/// The code generator: the instruction stream plus the state of the walk.
pub struct CodeGen {
    code: Vec<Instruction>,
    layout: Layout,
    next_temp: u32,
    next_label: u32,
    frame_offset: i32,
    scopes: Vec<Map<Id, Binding>>,
    current_class: Option<Id>,
    loop_ends: Vec<Id>,
}

/// Lower a checked program to TAC.  Fails only when no top-level `main`
/// exists; everything else the input could get wrong is the upstream
/// checker's job, and violations panic as compiler bugs.
pub fn emit_program(program: &Program) -> Result<CodeGen, NoMainError> {
    let layout = Layout::plan(program);
    if !layout.functions.contains_key(&id("main")) {
        return Err(NoMainError);
    }
    let mut cg = CodeGen {
        code: Vec::new(),
        layout,
        next_temp: 0,
        next_label: 0,
        frame_offset: -2 * WORD_SIZE,
        scopes: Vec::new(),
        current_class: None,
        loop_ends: Vec::new(),
    };
    for decl in &program.decls {
        match decl {
            Decl::Fn(fun) => cg.emit_function(fun, None),
            Decl::Class(class) => cg.emit_class(class),
            Decl::Var(_) | Decl::Interface(_) => {}
        }
    }
    Ok(cg)
}

/// Run the whole back end: lower, build the CFG, analyze liveness, allocate
/// registers, and print MIPS.
pub fn compile(program: &Program) -> Result<String, NoMainError> {
    let cg = emit_program(program)?;
    let cfg = Cfg::build(cg.code());
    let live = liveness::analyze(cg.code(), &cfg);
    let alloc = regalloc::allocate(cg.code(), &live);
    Ok(Mips::new(alloc.registers).emit(cg.code(), &live))
}

impl CodeGen {
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The TAC stream in its textual form.
    pub fn print_tac(&self) -> String {
        print_tac(&self.code)
    }

    // ---- instruction appenders ------------------------------------------

    fn new_label(&mut self) -> Id {
        let label = id(&format!("_L{}", self.next_label));
        self.next_label += 1;
        label
    }

    fn new_temp(&mut self) -> Location {
        let name = id(&format!("_tmp{}", self.next_temp));
        self.next_temp += 1;
        let loc = Location::fp(name, self.frame_offset);
        self.frame_offset -= WORD_SIZE;
        loc
    }

    fn gen_load_const(&mut self, value: i32) -> Location {
        let dst = self.new_temp();
        self.code.push(Instruction::LoadConst { dst, value });
        dst
    }

    fn gen_load_str(&mut self, value: &str) -> Location {
        let dst = self.new_temp();
        self.code.push(Instruction::LoadStr {
            dst,
            value: value.to_string(),
        });
        dst
    }

    fn gen_load_label(&mut self, label: Id) -> Location {
        let dst = self.new_temp();
        self.code.push(Instruction::LoadLabel { dst, label });
        dst
    }

    fn gen_assign(&mut self, dst: Location, src: Location) {
        self.code.push(Instruction::Assign { dst, src });
    }

    fn gen_load(&mut self, src: Location, offset: i32) -> Location {
        let dst = self.new_temp();
        self.code.push(Instruction::Load { dst, src, offset });
        dst
    }

    fn gen_store(&mut self, dst: Location, src: Location, offset: i32) {
        self.code.push(Instruction::Store { dst, src, offset });
    }

    fn gen_binary(&mut self, op: OpCode, lhs: Location, rhs: Location) -> Location {
        let dst = self.new_temp();
        self.code.push(Instruction::BinaryOp { op, dst, lhs, rhs });
        dst
    }

    fn gen_label(&mut self, label: Id) {
        self.code.push(Instruction::Label { label });
    }

    fn gen_goto(&mut self, label: Id) {
        self.code.push(Instruction::Goto { label });
    }

    fn gen_ifz(&mut self, test: Location, label: Id) {
        self.code.push(Instruction::IfZ { test, label });
    }

    fn gen_return(&mut self, value: Option<Location>) {
        self.code.push(Instruction::Return { value });
    }

    fn gen_push_param(&mut self, param: Location) {
        self.code.push(Instruction::PushParam { param });
    }

    fn gen_pop_params(&mut self, bytes: i32) {
        if bytes > 0 {
            self.code.push(Instruction::PopParams { bytes });
        }
    }

    fn gen_lcall(&mut self, label: Id, has_return: bool) -> Option<Location> {
        let dst = has_return.then(|| self.new_temp());
        self.code.push(Instruction::LCall { label, dst });
        dst
    }

    fn gen_acall(&mut self, addr: Location, has_return: bool) -> Option<Location> {
        let dst = has_return.then(|| self.new_temp());
        self.code.push(Instruction::ACall { addr, dst });
        dst
    }

    fn gen_builtin(
        &mut self,
        builtin: Builtin,
        arg1: Option<Location>,
        arg2: Option<Location>,
    ) -> Option<Location> {
        if let Some(arg2) = arg2 {
            self.gen_push_param(arg2);
        }
        if let Some(arg1) = arg1 {
            self.gen_push_param(arg1);
        }
        let dst = self.gen_lcall(builtin.label(), builtin.has_return());
        let args = i32::from(arg1.is_some()) + i32::from(arg2.is_some());
        self.gen_pop_params(WORD_SIZE * args);
        dst
    }

    // ---- scope handling --------------------------------------------------

    fn bind(&mut self, name: Id, binding: Binding) {
        self.scopes
            .last_mut()
            .expect("a scope is always active while a body is emitted")
            .insert(name, binding);
    }

    fn lookup(&self, name: Id) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name))
    }

    fn this_loc(&self) -> Location {
        self.lookup(id("this"))
            .expect("'this' should be bound inside a method body")
            .loc
    }

    fn class(&self, name: Id) -> &ClassInfo {
        self.layout
            .classes
            .get(&name)
            .expect("named class should have been planned")
    }

    fn resolve_var(&self, name: Id) -> VarSite {
        if let Some(binding) = self.lookup(name) {
            return VarSite::Direct(binding.clone());
        }
        if let Some(class_name) = self.current_class {
            if let Some(field) = self.class(class_name).fields.get(&name) {
                return VarSite::Member {
                    offset: field.offset,
                    ty: field.ty.clone(),
                };
            }
        }
        if let Some(global) = self.layout.globals.get(&name) {
            return VarSite::Direct(Binding {
                loc: global.loc,
                ty: global.ty.clone(),
            });
        }
        panic!("undeclared variable '{name}' reached code generation");
    }

    fn resolve_call(&self, base: Option<&Expr>, name: Id) -> CallSite {
        if let Some(base) = base {
            let class_name = self
                .type_of(base)
                .class_name()
                .expect("method call receiver should have a class type");
            let info = self.class(class_name);
            let method = info
                .methods
                .get(&name)
                .expect("called method should be declared in the receiver's class");
            return CallSite::Method {
                class: class_name,
                label: method.label,
                ret: method.ret.clone(),
            };
        }
        if let Some(class_name) = self.current_class {
            if let Some(method) = self.class(class_name).methods.get(&name) {
                return CallSite::Method {
                    class: class_name,
                    label: method.label,
                    ret: method.ret.clone(),
                };
            }
        }
        let function = self
            .layout
            .functions
            .get(&name)
            .expect("called function should be declared");
        CallSite::Function {
            label: function.label,
            ret: function.ret.clone(),
        }
    }

    /// The static type of an expression, recomputed on demand the same way
    /// the checker derived it.
    fn type_of(&self, expr: &Expr) -> Type {
        match expr {
            Expr::IntLit(_) => Type::Int,
            Expr::DoubleLit(_) => Type::Double,
            Expr::BoolLit(_) => Type::Bool,
            Expr::StringLit(_) => Type::String,
            Expr::Null => Type::Null,
            Expr::This { .. } => Type::Named(
                self.current_class
                    .expect("'this' should appear inside a class"),
            ),
            Expr::FieldAccess { base: None, field } => match self.resolve_var(field.name) {
                VarSite::Direct(binding) => binding.ty,
                VarSite::Member { ty, .. } => ty,
            },
            Expr::FieldAccess {
                base: Some(base),
                field,
            } => {
                let class_name = self
                    .type_of(base)
                    .class_name()
                    .expect("field access receiver should have a class type");
                self.class(class_name).fields[&field.name].ty.clone()
            }
            Expr::ArrayAccess { base, .. } => self
                .type_of(base)
                .elem()
                .expect("indexed value should have an array type")
                .clone(),
            Expr::Call { base, method, .. } => {
                if let Some(base) = base {
                    if self.type_of(base).is_array() {
                        return Type::Int;
                    }
                }
                match self.resolve_call(base.as_deref(), method.name) {
                    CallSite::Function { ret, .. } | CallSite::Method { ret, .. } => ret,
                }
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                rhs,
            } => self.type_of(rhs),
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => Type::Bool,
            Expr::Binary { op, rhs, .. } => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                    self.type_of(rhs)
                }
                _ => Type::Bool,
            },
            Expr::Assign { lhs, .. } => self.type_of(lhs),
            Expr::New { class } => Type::Named(class.name),
            Expr::NewArray { elem, .. } => Type::Array(Box::new(elem.clone())),
            Expr::ReadInteger => Type::Int,
            Expr::ReadLine => Type::String,
        }
    }

    // ---- declarations ----------------------------------------------------

    fn emit_class(&mut self, class: &ClassDecl) {
        let info = self.layout.classes[&class.id.name].clone();
        for member in &class.members {
            if let Decl::Fn(method) = member {
                self.emit_function(method, Some(&info));
            }
        }
        self.code.push(Instruction::VTable {
            class: info.name,
            methods: info.vtable,
        });
    }

    fn emit_function(&mut self, fun: &FnDecl, class: Option<&ClassInfo>) {
        let label = match class {
            Some(info) => info.methods[&fun.id.name].label,
            None => self.layout.functions[&fun.id.name].label,
        };
        self.gen_label(label);
        let begin = self.code.len();
        self.code.push(Instruction::BeginFunc {
            frame_size: 0,
            formals: Vec::new(),
        });

        self.frame_offset = -2 * WORD_SIZE;
        self.scopes = vec![Map::new()];
        self.current_class = class.map(|info| info.name);
        self.loop_ends.clear();

        let mut formal_locs = Vec::new();
        let mut param_offset = WORD_SIZE;
        if let Some(info) = class {
            // The receiver rides along as a hidden first formal.
            let this = Location::fp(id("this"), param_offset);
            param_offset += WORD_SIZE;
            self.bind(
                id("this"),
                Binding {
                    loc: this,
                    ty: Type::Named(info.name),
                },
            );
            formal_locs.push(this);
        }
        for formal in &fun.formals {
            let loc = Location::fp(formal.id.name, param_offset);
            param_offset += WORD_SIZE;
            self.bind(
                formal.id.name,
                Binding {
                    loc,
                    ty: formal.ty.clone(),
                },
            );
            formal_locs.push(loc);
        }
        let Instruction::BeginFunc { formals, .. } = &mut self.code[begin] else {
            unreachable!("begin index points at the BeginFunc just pushed");
        };
        *formals = formal_locs;

        if let Some(body) = &fun.body {
            self.emit_stmt(body);
        }

        let frame_size = -2 * WORD_SIZE - self.frame_offset;
        let Instruction::BeginFunc { frame_size: size, .. } = &mut self.code[begin] else {
            unreachable!("begin index points at the BeginFunc just pushed");
        };
        *size = frame_size;
        self.code.push(Instruction::EndFunc);
    }

    // ---- statements ------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => {
                self.scopes.push(Map::new());
                for var in &block.decls {
                    let loc = Location::fp(var.id.name, self.frame_offset);
                    self.frame_offset -= WORD_SIZE;
                    self.bind(
                        var.id.name,
                        Binding {
                            loc,
                            ty: var.ty.clone(),
                        },
                    );
                }
                for stmt in &block.stmts {
                    self.emit_stmt(stmt);
                }
                self.scopes.pop();
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                let test_loc = self.emit_value(test);
                let else_label = self.new_label();
                self.gen_ifz(test_loc, else_label);
                self.emit_stmt(then);
                match otherwise {
                    Some(otherwise) => {
                        let end_label = self.new_label();
                        self.gen_goto(end_label);
                        self.gen_label(else_label);
                        self.emit_stmt(otherwise);
                        self.gen_label(end_label);
                    }
                    None => self.gen_label(else_label),
                }
            }
            Stmt::While { test, body } => {
                let top = self.new_label();
                self.gen_label(top);
                let test_loc = self.emit_value(test);
                let end = self.new_label();
                self.gen_ifz(test_loc, end);
                self.loop_ends.push(end);
                self.emit_stmt(body);
                self.loop_ends.pop();
                self.gen_goto(top);
                self.gen_label(end);
            }
            Stmt::For {
                init,
                test,
                step,
                body,
            } => {
                if let Some(init) = init {
                    let _ = self.emit_expr(init);
                }
                let top = self.new_label();
                self.gen_label(top);
                let test_loc = self.emit_value(test);
                let end = self.new_label();
                self.gen_ifz(test_loc, end);
                self.loop_ends.push(end);
                self.emit_stmt(body);
                self.loop_ends.pop();
                if let Some(step) = step {
                    let _ = self.emit_expr(step);
                }
                self.gen_goto(top);
                self.gen_label(end);
            }
            Stmt::Break { .. } => {
                let end = *self
                    .loop_ends
                    .last()
                    .expect("break should appear inside a loop");
                self.gen_goto(end);
            }
            Stmt::Return { expr, .. } => {
                let value = expr.as_ref().map(|expr| self.emit_value(expr));
                self.gen_return(value);
            }
            Stmt::Print { args } => {
                for arg in args {
                    let ty = self.type_of(arg);
                    let builtin = match ty {
                        Type::Int => Builtin::PrintInt,
                        Type::Bool => Builtin::PrintBool,
                        Type::String => Builtin::PrintString,
                        other => panic!("Print argument of type {other} reached code generation"),
                    };
                    let loc = self.emit_value(arg);
                    self.gen_builtin(builtin, Some(loc), None);
                }
            }
            Stmt::Expr(expr) => {
                let _ = self.emit_expr(expr);
            }
        }
    }

    // ---- expressions -----------------------------------------------------

    /// Emit an expression that must produce a value.
    fn emit_value(&mut self, expr: &Expr) -> Location {
        self.emit_expr(expr)
            .expect("expression in value position should produce a value")
    }

    /// Emit an expression.  `None` only for calls to void functions.
    fn emit_expr(&mut self, expr: &Expr) -> Option<Location> {
        match expr {
            Expr::IntLit(value) => Some(self.gen_load_const(*value)),
            Expr::DoubleLit(_) => panic!("double has no code generation path"),
            Expr::BoolLit(value) => Some(self.gen_load_const(i32::from(*value))),
            Expr::StringLit(value) => Some(self.gen_load_str(value)),
            Expr::Null => Some(self.gen_load_const(0)),
            Expr::This { .. } => Some(self.this_loc()),
            Expr::FieldAccess { base, field } => {
                Some(self.emit_field_access(base.as_deref(), *field))
            }
            Expr::ArrayAccess { base, index } => {
                let addr = self.emit_element_addr(base, index);
                Some(self.gen_load(addr, 0))
            }
            Expr::Call {
                base,
                method,
                actuals,
            } => self.emit_call(base.as_deref(), *method, actuals),
            Expr::Unary {
                op: UnaryOp::Neg,
                rhs,
            } => {
                let rhs_loc = self.emit_value(rhs);
                let zero = self.gen_load_const(0);
                Some(self.gen_binary(OpCode::Sub, zero, rhs_loc))
            }
            Expr::Unary {
                op: UnaryOp::Not,
                rhs,
            } => {
                let rhs_loc = self.emit_value(rhs);
                let false_loc = self.gen_load_const(0);
                Some(self.gen_binary(OpCode::Eq, rhs_loc, false_loc))
            }
            Expr::Binary { op, lhs, rhs } => Some(self.emit_binary(*op, lhs, rhs)),
            Expr::Assign { lhs, rhs } => {
                let rhs_loc = self.emit_value(rhs);
                match self.emit_place(lhs) {
                    Place::Plain(dst) => {
                        self.gen_assign(dst, rhs_loc);
                        Some(dst)
                    }
                    Place::Indirect { base, offset } => {
                        self.gen_store(base, rhs_loc, offset);
                        Some(rhs_loc)
                    }
                }
            }
            Expr::New { class } => {
                let size = self.class(class.name).size;
                let size_loc = self.gen_load_const(size);
                let object = self
                    .gen_builtin(Builtin::Alloc, Some(size_loc), None)
                    .expect("_Alloc returns a value");
                let vtable = self.gen_load_label(class.name);
                self.gen_store(object, vtable, 0);
                Some(object)
            }
            Expr::NewArray { size, .. } => Some(self.emit_new_array(size)),
            Expr::ReadInteger => self.gen_builtin(Builtin::ReadInteger, None, None),
            Expr::ReadLine => self.gen_builtin(Builtin::ReadLine, None, None),
        }
    }

    fn emit_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Location {
        let lhs_loc = self.emit_value(lhs);
        let rhs_loc = self.emit_value(rhs);
        match op {
            BinOp::Add => self.gen_binary(OpCode::Add, lhs_loc, rhs_loc),
            BinOp::Sub => self.gen_binary(OpCode::Sub, lhs_loc, rhs_loc),
            BinOp::Mul => self.gen_binary(OpCode::Mul, lhs_loc, rhs_loc),
            BinOp::Div => self.gen_binary(OpCode::Div, lhs_loc, rhs_loc),
            BinOp::Mod => self.gen_binary(OpCode::Mod, lhs_loc, rhs_loc),
            BinOp::And => self.gen_binary(OpCode::And, lhs_loc, rhs_loc),
            BinOp::Or => self.gen_binary(OpCode::Or, lhs_loc, rhs_loc),
            // Only `<` exists in TAC; the other relations are rewritten.
            BinOp::Less => self.gen_binary(OpCode::Less, lhs_loc, rhs_loc),
            BinOp::Greater => self.gen_binary(OpCode::Less, rhs_loc, lhs_loc),
            BinOp::LessEq => {
                let less = self.gen_binary(OpCode::Less, lhs_loc, rhs_loc);
                let equal = self.gen_binary(OpCode::Eq, lhs_loc, rhs_loc);
                self.gen_binary(OpCode::Or, less, equal)
            }
            BinOp::GreaterEq => {
                let less = self.gen_binary(OpCode::Less, rhs_loc, lhs_loc);
                let equal = self.gen_binary(OpCode::Eq, rhs_loc, lhs_loc);
                self.gen_binary(OpCode::Or, less, equal)
            }
            BinOp::Eq => self.emit_equality(lhs, rhs, lhs_loc, rhs_loc, false),
            BinOp::NotEq => self.emit_equality(lhs, rhs, lhs_loc, rhs_loc, true),
        }
    }

    fn emit_equality(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        lhs_loc: Location,
        rhs_loc: Location,
        negate: bool,
    ) -> Location {
        let strings = self.type_of(lhs).is_string() && self.type_of(rhs).is_string();
        let equal = if strings {
            self.gen_builtin(Builtin::StringEqual, Some(lhs_loc), Some(rhs_loc))
                .expect("_StringEqual returns a value")
        } else {
            self.gen_binary(OpCode::Eq, lhs_loc, rhs_loc)
        };
        if negate {
            let false_loc = self.gen_load_const(0);
            self.gen_binary(OpCode::Eq, equal, false_loc)
        } else {
            equal
        }
    }

    fn emit_field_access(&mut self, base: Option<&Expr>, field: Identifier) -> Location {
        match base {
            Some(base) => {
                let class_name = self
                    .type_of(base)
                    .class_name()
                    .expect("field access receiver should have a class type");
                let offset = self.class(class_name).fields[&field.name].offset;
                let base_loc = self.emit_value(base);
                self.gen_load(base_loc, offset)
            }
            None => match self.resolve_var(field.name) {
                VarSite::Direct(binding) => binding.loc,
                VarSite::Member { offset, .. } => {
                    let this = self.this_loc();
                    self.gen_load(this, offset)
                }
            },
        }
    }

    /// The address of an array element, bounds check included:
    /// `index < 0 || !(index < length)` prints the runtime error and halts.
    fn emit_element_addr(&mut self, base: &Expr, index: &Expr) -> Location {
        let base_loc = self.emit_value(base);
        let index_loc = self.emit_value(index);
        let zero = self.gen_load_const(0);
        let negative = self.gen_binary(OpCode::Less, index_loc, zero);
        let length = self.gen_load(base_loc, -WORD_SIZE);
        let within = self.gen_binary(OpCode::Less, index_loc, length);
        let not_within = self.gen_binary(OpCode::Eq, within, zero);
        let out_of_bounds = self.gen_binary(OpCode::Or, negative, not_within);
        let ok = self.new_label();
        self.gen_ifz(out_of_bounds, ok);
        let message = self.gen_load_str(ERR_ARRAY_OUT_OF_BOUNDS);
        self.gen_builtin(Builtin::PrintString, Some(message), None);
        self.gen_builtin(Builtin::Halt, None, None);
        self.gen_label(ok);
        let four = self.gen_load_const(WORD_SIZE);
        let byte_offset = self.gen_binary(OpCode::Mul, four, index_loc);
        self.gen_binary(OpCode::Add, base_loc, byte_offset)
    }

    fn emit_new_array(&mut self, size: &Expr) -> Location {
        let size_loc = self.emit_value(size);
        let one = self.gen_load_const(1);
        let too_small = self.gen_binary(OpCode::Less, size_loc, one);
        let ok = self.new_label();
        self.gen_ifz(too_small, ok);
        let message = self.gen_load_str(ERR_ARRAY_BAD_SIZE);
        self.gen_builtin(Builtin::PrintString, Some(message), None);
        self.gen_builtin(Builtin::Halt, None, None);
        self.gen_label(ok);
        // One extra cell up front holds the element count; the returned
        // pointer is advanced past it.
        let one = self.gen_load_const(1);
        let cells = self.gen_binary(OpCode::Add, one, size_loc);
        let four = self.gen_load_const(WORD_SIZE);
        let bytes = self.gen_binary(OpCode::Mul, cells, four);
        let array = self
            .gen_builtin(Builtin::Alloc, Some(bytes), None)
            .expect("_Alloc returns a value");
        self.gen_store(array, size_loc, 0);
        self.gen_binary(OpCode::Add, array, four)
    }

    fn emit_call(
        &mut self,
        base: Option<&Expr>,
        method: Identifier,
        actuals: &[Expr],
    ) -> Option<Location> {
        // array.length() never dispatches: the count sits one word below
        // the element data.
        if let Some(base) = base {
            if self.type_of(base).is_array() {
                let base_loc = self.emit_value(base);
                return Some(self.gen_load(base_loc, -WORD_SIZE));
            }
        }
        let site = self.resolve_call(base, method.name);
        let actual_locs: Vec<Location> =
            actuals.iter().map(|actual| self.emit_value(actual)).collect();
        match site {
            CallSite::Function { label, ret } => {
                for loc in actual_locs.iter().rev() {
                    self.gen_push_param(*loc);
                }
                let dst = self.gen_lcall(label, !ret.is_void());
                self.gen_pop_params(WORD_SIZE * actual_locs.len() as i32);
                dst
            }
            CallSite::Method { class, label, ret } => {
                let base_loc = match base {
                    Some(base) => self.emit_value(base),
                    None => self.this_loc(),
                };
                let vtable = self.gen_load(base_loc, 0);
                let slot = self.class(class).vtable_offset(label);
                let target = self.gen_load(vtable, slot);
                for loc in actual_locs.iter().rev() {
                    self.gen_push_param(*loc);
                }
                // The receiver is pushed last and becomes the hidden first
                // formal.
                self.gen_push_param(base_loc);
                let dst = self.gen_acall(target, !ret.is_void());
                self.gen_pop_params(WORD_SIZE * (actual_locs.len() as i32 + 1));
                dst
            }
        }
    }

    /// Resolve an assignment target.  The right-hand side has already been
    /// emitted by the time this runs.
    fn emit_place(&mut self, expr: &Expr) -> Place {
        match expr {
            Expr::ArrayAccess { base, index } => {
                let addr = self.emit_element_addr(base, index);
                Place::Indirect {
                    base: addr,
                    offset: 0,
                }
            }
            Expr::FieldAccess {
                base: Some(base),
                field,
            } => {
                let class_name = self
                    .type_of(base)
                    .class_name()
                    .expect("field access receiver should have a class type");
                let offset = self.class(class_name).fields[&field.name].offset;
                let base_loc = self.emit_value(base);
                Place::Indirect {
                    base: base_loc,
                    offset,
                }
            }
            Expr::FieldAccess { base: None, field } => match self.resolve_var(field.name) {
                VarSite::Direct(binding) => Place::Plain(binding.loc),
                VarSite::Member { offset, .. } => Place::Indirect {
                    base: self.this_loc(),
                    offset,
                },
            },
            _ => panic!("assignment target should be an lvalue"),
        }
    }
}
