//! The parser
//!
//! A recursive-descent parser from the token stream to the [ast] tree.
//! Expressions use one level of descent per precedence tier; assignment is
//! right-associative, everything else associates left.

use std::fmt::Debug;

use derive_more::derive::Display;

use super::ast::*;
use super::lex::*;
use super::ty::Type;
use crate::common::id;

#[derive(Display)]
#[display("Parse error: {_0}")]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError(err.to_string())
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(input).tokens()?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn kind_at(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(self.error_at(token, &format!("expected '{kind}'"))),
            None => Err(ParseError(format!(
                "expected '{kind}' but reached end of input"
            ))),
        }
    }

    fn error_at(&self, token: Token<'src>, what: &str) -> ParseError {
        ParseError(format!(
            "{what}, found '{}' at line {}",
            token.text, token.line
        ))
    }

    fn error_here(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(token) => self.error_at(token, what),
            None => ParseError(format!("{what} but reached end of input")),
        }
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut decls = Vec::new();
        while self.peek().is_some() {
            decls.push(self.decl()?);
        }
        Ok(Program { decls })
    }

    fn decl(&mut self) -> Result<Decl, ParseError> {
        match self.kind() {
            Some(TokenKind::Class) => self.class_decl().map(Decl::Class),
            Some(TokenKind::Interface) => self.interface_decl().map(Decl::Interface),
            Some(TokenKind::Void) => {
                self.advance();
                let name = self.identifier()?;
                self.fn_decl(Type::Void, name).map(Decl::Fn)
            }
            _ => {
                let ty = self.ty()?;
                let name = self.identifier()?;
                if self.at(TokenKind::LParen) {
                    self.fn_decl(ty, name).map(Decl::Fn)
                } else {
                    self.expect(TokenKind::Semi)?;
                    Ok(Decl::Var(VarDecl { id: name, ty }))
                }
            }
        }
    }

    fn ty(&mut self) -> Result<Type, ParseError> {
        let mut ty = match self.kind() {
            Some(TokenKind::Int) => {
                self.advance();
                Type::Int
            }
            Some(TokenKind::Double) => {
                self.advance();
                Type::Double
            }
            Some(TokenKind::Bool) => {
                self.advance();
                Type::Bool
            }
            Some(TokenKind::String) => {
                self.advance();
                Type::String
            }
            Some(TokenKind::Ident) => {
                let name = self.identifier()?;
                Type::Named(name.name)
            }
            _ => return Err(self.error_here("expected a type")),
        };
        while self.eat(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            ty = Type::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn identifier(&mut self) -> Result<Identifier, ParseError> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(Identifier {
            name: id(token.text),
            line: token.line,
        })
    }

    fn fn_decl(&mut self, ret: Type, name: Identifier) -> Result<FnDecl, ParseError> {
        let formals = self.formals()?;
        let body = self.block()?;
        Ok(FnDecl {
            id: name,
            ret,
            formals,
            body: Some(Stmt::Block(body)),
        })
    }

    fn formals(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut formals = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let ty = self.ty()?;
                let name = self.identifier()?;
                formals.push(VarDecl { id: name, ty });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(formals)
    }

    fn class_decl(&mut self) -> Result<ClassDecl, ParseError> {
        self.expect(TokenKind::Class)?;
        let name = self.identifier()?;
        let extends = if self.eat(TokenKind::Extends) {
            Some(self.identifier()?)
        } else {
            None
        };
        let mut implements = Vec::new();
        if self.eat(TokenKind::Implements) {
            loop {
                implements.push(self.identifier()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) {
            members.push(self.member()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(ClassDecl {
            id: name,
            extends,
            implements,
            members,
        })
    }

    fn member(&mut self) -> Result<Decl, ParseError> {
        if self.eat(TokenKind::Void) {
            let name = self.identifier()?;
            return self.fn_decl(Type::Void, name).map(Decl::Fn);
        }
        let ty = self.ty()?;
        let name = self.identifier()?;
        if self.at(TokenKind::LParen) {
            self.fn_decl(ty, name).map(Decl::Fn)
        } else {
            self.expect(TokenKind::Semi)?;
            Ok(Decl::Var(VarDecl { id: name, ty }))
        }
    }

    fn interface_decl(&mut self) -> Result<InterfaceDecl, ParseError> {
        self.expect(TokenKind::Interface)?;
        let name = self.identifier()?;
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let ret = if self.eat(TokenKind::Void) {
                Type::Void
            } else {
                self.ty()?
            };
            let proto_name = self.identifier()?;
            let formals = self.formals()?;
            self.expect(TokenKind::Semi)?;
            members.push(FnDecl {
                id: proto_name,
                ret,
                formals,
                body: None,
            });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(InterfaceDecl { id: name, members })
    }

    fn block(&mut self) -> Result<StmtBlock, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut decls = Vec::new();
        while self.starts_var_decl() {
            let ty = self.ty()?;
            let name = self.identifier()?;
            self.expect(TokenKind::Semi)?;
            decls.push(VarDecl { id: name, ty });
        }
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StmtBlock { decls, stmts })
    }

    // A leading `Shape s;` must be told apart from an expression statement
    // starting with the same identifier.
    fn starts_var_decl(&self) -> bool {
        match self.kind() {
            Some(
                TokenKind::Int | TokenKind::Double | TokenKind::Bool | TokenKind::String,
            ) => true,
            Some(TokenKind::Ident) => match self.kind_at(1) {
                Some(TokenKind::Ident) => true,
                Some(TokenKind::LBracket) => self.kind_at(2) == Some(TokenKind::RBracket),
                _ => false,
            },
            _ => false,
        }
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.block()?)),
            Some(TokenKind::If) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let test = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let then = Box::new(self.stmt()?);
                let otherwise = if self.eat(TokenKind::Else) {
                    Some(Box::new(self.stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    then,
                    otherwise,
                })
            }
            Some(TokenKind::While) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let test = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.stmt()?);
                Ok(Stmt::While { test, body })
            }
            Some(TokenKind::For) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let init = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semi)?;
                let test = self.expr()?;
                self.expect(TokenKind::Semi)?;
                let step = if self.at(TokenKind::RParen) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.stmt()?);
                Ok(Stmt::For {
                    init,
                    test,
                    step,
                    body,
                })
            }
            Some(TokenKind::Break) => {
                let line = self.advance().expect("peeked token should be there").line;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break { line })
            }
            Some(TokenKind::Return) => {
                let line = self.advance().expect("peeked token should be there").line;
                let expr = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return { expr, line })
            }
            Some(TokenKind::Print) => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let mut args = vec![self.expr()?];
                while self.eat(TokenKind::Comma) {
                    args.push(self.expr()?);
                }
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Print { args })
            }
            _ => {
                let expr = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.or_expr()?;
        if self.eat(TokenKind::Assign) {
            let rhs = self.expr()?;
            Ok(Expr::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        } else {
            Ok(lhs)
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(TokenKind::Or) {
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.eq_expr()?;
        while self.eat(TokenKind::And) {
            let rhs = self.eq_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn eq_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.rel_expr()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.rel_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn rel_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Less) => BinOp::Less,
                Some(TokenKind::LessEq) => BinOp::LessEq,
                Some(TokenKind::Greater) => BinOp::Greater,
                Some(TokenKind::GreaterEq) => BinOp::GreaterEq,
                _ => break,
            };
            self.advance();
            let rhs = self.add_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.kind() {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.unary_expr()?;
            Ok(Expr::Unary {
                op,
                rhs: Box::new(rhs),
            })
        } else {
            self.postfix_expr()
        }
    }

    fn postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let name = self.identifier()?;
                if self.at(TokenKind::LParen) {
                    let actuals = self.actuals()?;
                    expr = Expr::Call {
                        base: Some(Box::new(expr)),
                        method: name,
                        actuals,
                    };
                } else {
                    expr = Expr::FieldAccess {
                        base: Some(Box::new(expr)),
                        field: name,
                    };
                }
            } else if self.eat(TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::ArrayAccess {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn actuals(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut actuals = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                actuals.push(self.expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(actuals)
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        let token = match self.peek() {
            Some(token) => token,
            None => return Err(self.error_here("expected an expression")),
        };
        match token.kind {
            TokenKind::IntLit => {
                self.advance();
                let value = if let Some(hex) =
                    token.text.strip_prefix("0x").or_else(|| token.text.strip_prefix("0X"))
                {
                    i32::from_str_radix(hex, 16)
                } else {
                    token.text.parse::<i32>()
                };
                match value {
                    Ok(value) => Ok(Expr::IntLit(value)),
                    Err(_) => Err(self.error_at(token, "integer constant out of range")),
                }
            }
            TokenKind::DoubleLit => {
                self.advance();
                let value = token
                    .text
                    .parse::<f64>()
                    .expect("double literal should parse as f64");
                Ok(Expr::DoubleLit(value))
            }
            TokenKind::StringLit => {
                self.advance();
                let inner = &token.text[1..token.text.len() - 1];
                Ok(Expr::StringLit(inner.to_string()))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This { line: token.line })
            }
            TokenKind::Ident => {
                let name = self.identifier()?;
                if self.at(TokenKind::LParen) {
                    let actuals = self.actuals()?;
                    Ok(Expr::Call {
                        base: None,
                        method: name,
                        actuals,
                    })
                } else {
                    Ok(Expr::FieldAccess {
                        base: None,
                        field: name,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::New => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let class = self.identifier()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::New { class })
            }
            TokenKind::NewArray => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let size = self.expr()?;
                self.expect(TokenKind::Comma)?;
                let elem = self.ty()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::NewArray {
                    size: Box::new(size),
                    elem,
                })
            }
            TokenKind::ReadInteger => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::ReadInteger)
            }
            TokenKind::ReadLine => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::ReadLine)
            }
            _ => Err(self.error_at(token, "expected an expression")),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Program {
        parse(input).expect("program should parse")
    }

    #[test]
    fn parses_globals_functions_and_classes() {
        let program = parse_ok(
            "int g;
             void main() { Print(g); }
             class Shape extends Base implements Drawable {
                 int edges;
                 int count() { return edges; }
             }
             interface Drawable { void draw(); }",
        );
        assert_eq!(program.decls.len(), 4);
        assert!(matches!(program.decls[0], Decl::Var(_)));
        assert!(matches!(program.decls[1], Decl::Fn(_)));
        match &program.decls[2] {
            Decl::Class(class) => {
                assert_eq!(class.extends.map(|e| e.name), Some(crate::common::id("Base")));
                assert_eq!(class.implements.len(), 1);
                assert_eq!(class.members.len(), 2);
            }
            other => panic!("expected a class, got {other:?}"),
        }
        match &program.decls[3] {
            Decl::Interface(iface) => {
                assert_eq!(iface.members.len(), 1);
                assert!(iface.members[0].body.is_none());
            }
            other => panic!("expected an interface, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_ok("void main() { int a; int b; a = b = 1; }");
        let Decl::Fn(main) = &program.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Block(block)) = &main.body else {
            panic!("expected a body block");
        };
        let Stmt::Expr(Expr::Assign { rhs, .. }) = &block.stmts[0] else {
            panic!("expected an assignment statement");
        };
        assert!(matches!(**rhs, Expr::Assign { .. }));
    }

    #[test]
    fn precedence_nests_multiplication_under_addition() {
        let program = parse_ok("void main() { Print(1 + 2 * 3); }");
        let Decl::Fn(main) = &program.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Block(block)) = &main.body else {
            panic!("expected a body block");
        };
        let Stmt::Print { args } = &block.stmts[0] else {
            panic!("expected a print statement");
        };
        let Expr::Binary { op: BinOp::Add, rhs, .. } = &args[0] else {
            panic!("expected an addition");
        };
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn block_leads_with_declarations() {
        let program = parse_ok("void main() { int i; Shape s; s = New(Shape); i = s.edges; } class Shape { int edges; }");
        let Decl::Fn(main) = &program.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Block(block)) = &main.body else {
            panic!("expected a body block");
        };
        assert_eq!(block.decls.len(), 2);
        assert_eq!(block.stmts.len(), 2);
    }

    #[test]
    fn postfix_chains_parse() {
        let program = parse_ok("void main() { int[] a; a = NewArray(4, int); a[0] = a.length(); }");
        let Decl::Fn(main) = &program.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Block(block)) = &main.body else {
            panic!("expected a body block");
        };
        let Stmt::Expr(Expr::Assign { lhs, rhs }) = &block.stmts[1] else {
            panic!("expected an assignment");
        };
        assert!(matches!(**lhs, Expr::ArrayAccess { .. }));
        assert!(matches!(**rhs, Expr::Call { base: Some(_), .. }));
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let err = parse("void main() { Print(1) }").expect_err("should fail");
        assert!(err.to_string().contains("expected ';'"));
    }
}
