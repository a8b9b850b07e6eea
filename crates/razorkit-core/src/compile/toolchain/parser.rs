//! Recursive-descent parser for generated units
//!
//! ```text
//! unit     := ("namespace" path ";")? ("using" path ";")* class
//! class    := "internal"? "class" Ident ":" path "<" path ">" "{" member* "}"
//! member   := "default"? "layout" Str ";" | "function" Ident "(" params ")" "=>" expr ";"
//!           | "section" Str block | "execute" block
//! stmt     := "write" Str ";" | "emit" expr ";" | "var" Ident "=" expr ";"
//!           | "if" "(" expr ")" block ("else" "if" "(" expr ")" block)* ("else" block)?
//!           | "foreach" "(" "var" Ident "in" expr ")" block
//!           | "define_section" Str ";"
//! expr     := and ("||" and)*
//! and      := equality ("&&" equality)*
//! equality := unary (("==" | "!=") unary)?
//! unary    := "!" unary | postfix
//! postfix  := primary ("." Ident | "(" args ")")*
//! primary  := Ident | Str | Num | "(" expr ")"
//! ```

use super::lexer::{Tok, Token};
use crate::compile::diagnostic::{codes, Diagnostic};
use crate::compile::ir::BinaryOp;
use crate::types::SourcePos;
use serde_json::Value;

/// A name and its generated position
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Named {
    pub name: String,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Unit {
    pub namespace: Option<String>,
    pub usings: Vec<Named>,
    pub class: ClassDecl,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClassDecl {
    pub name: Named,
    pub base: Named,
    pub model: Named,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Member {
    Layout {
        key: String,
        pos: SourcePos,
        inherited: bool,
    },
    Function(FunctionDecl),
    Section(SectionDecl),
    Execute { body: Vec<Stmt>, pos: SourcePos },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionDecl {
    pub name: Named,
    pub params: Vec<Named>,
    pub body: Expr,
    pub at: Option<SourcePos>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SectionDecl {
    pub name: String,
    pub pos: SourcePos,
    pub body: Vec<Stmt>,
}

/// Statements; `at` is the template position from a preceding pragma
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Write(String),
    Emit {
        expr: Expr,
        at: Option<SourcePos>,
    },
    Var {
        name: Named,
        expr: Expr,
        at: Option<SourcePos>,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
        at: Option<SourcePos>,
    },
    ForEach {
        var: Named,
        source: Expr,
        body: Vec<Stmt>,
        at: Option<SourcePos>,
    },
    DefineSection {
        name: String,
        pos: SourcePos,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprKind {
    Literal(Value),
    Name(String),
    Member {
        target: Box<Expr>,
        name: Named,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

type ParseResult<T> = Result<T, Diagnostic>;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Template position from the last pragma, consumed by the next statement
    pending: Option<SourcePos>,
    end: SourcePos,
}

pub(crate) fn parse(tokens: Vec<Token>) -> ParseResult<Unit> {
    let end = tokens
        .last()
        .map(|t| SourcePos::new(t.pos.line, t.pos.column + 1))
        .unwrap_or(SourcePos::new(1, 1));
    let mut parser = Parser {
        tokens,
        index: 0,
        pending: None,
        end,
    };
    parser.unit()
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.index).map(|t| &t.tok)
    }

    fn pos(&self) -> SourcePos {
        self.tokens.get(self.index).map(|t| t.pos).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(codes::SYNTAX, Some(self.pos()), message)
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        match self.peek() {
            Some(tok) => self.error(format!("Expected {} but found {}", expected, tok)),
            None => self.error(format!("Expected {} but reached the end of the unit", expected)),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(name)) if name == keyword)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> ParseResult<SourcePos> {
        let pos = self.pos();
        if self.eat(tok) {
            Ok(pos)
        } else {
            Err(self.unexpected(&tok.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.at_keyword(keyword) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    fn ident(&mut self) -> ParseResult<Named> {
        let pos = self.pos();
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.index += 1;
                Ok(Named { name, pos })
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    /// `A.B.C`
    fn path(&mut self) -> ParseResult<Named> {
        let mut named = self.ident()?;
        while self.eat(&Tok::Dot) {
            let next = self.ident()?;
            named.name.push('.');
            named.name.push_str(&next.name);
        }
        Ok(named)
    }

    fn string(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Str(value)) => {
                let value = value.clone();
                self.index += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("a string literal")),
        }
    }

    fn take_pragmas(&mut self) {
        while let Some(Tok::Pragma(at)) = self.peek() {
            self.pending = Some(*at);
            self.index += 1;
        }
    }

    /// The first token after any pragmas, without consuming anything
    fn peek_past_pragmas(&self) -> Option<&Tok> {
        self.tokens[self.index.min(self.tokens.len())..]
            .iter()
            .map(|t| &t.tok)
            .find(|tok| !matches!(tok, Tok::Pragma(_)))
    }

    fn unit(&mut self) -> ParseResult<Unit> {
        self.take_pragmas();
        let mut namespace = None;
        if self.at_keyword("namespace") {
            self.index += 1;
            namespace = Some(self.path()?.name);
            self.expect(&Tok::Semi)?;
        }

        let mut usings = Vec::new();
        self.take_pragmas();
        while self.at_keyword("using") {
            self.index += 1;
            usings.push(self.path()?);
            self.expect(&Tok::Semi)?;
            self.take_pragmas();
        }

        let class = self.class()?;
        self.take_pragmas();
        if self.peek().is_some() {
            return Err(self.unexpected("end of unit"));
        }
        Ok(Unit {
            namespace,
            usings,
            class,
        })
    }

    fn class(&mut self) -> ParseResult<ClassDecl> {
        self.take_pragmas();
        self.pending = None;
        if self.at_keyword("internal") || self.at_keyword("public") {
            self.index += 1;
        }
        self.expect_keyword("class")?;
        let name = self.ident()?;
        self.expect(&Tok::Colon)?;
        let base = self.path()?;
        self.expect(&Tok::Lt)?;
        let model = self.path()?;
        self.expect(&Tok::Gt)?;
        self.expect(&Tok::LBrace)?;

        let mut members = Vec::new();
        loop {
            self.take_pragmas();
            if self.eat(&Tok::RBrace) {
                break;
            }
            members.push(self.member()?);
        }

        Ok(ClassDecl {
            name,
            base,
            model,
            members,
        })
    }

    fn member(&mut self) -> ParseResult<Member> {
        let at = self.pending.take();
        let pos = self.pos();
        let Some(Tok::Ident(keyword)) = self.peek() else {
            return Err(self.unexpected("a class member"));
        };
        let keyword = keyword.clone();
        self.index += 1;

        match keyword.as_str() {
            "layout" => {
                let key = self.string()?;
                self.expect(&Tok::Semi)?;
                Ok(Member::Layout {
                    key,
                    pos,
                    inherited: false,
                })
            }
            "default" => {
                self.expect_keyword("layout")?;
                let key = self.string()?;
                self.expect(&Tok::Semi)?;
                Ok(Member::Layout {
                    key,
                    pos,
                    inherited: true,
                })
            }
            "function" => {
                let name = self.ident()?;
                self.expect(&Tok::LParen)?;
                let mut params = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        params.push(self.ident()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        self.expect(&Tok::Comma)?;
                    }
                }
                self.expect(&Tok::Arrow)?;
                let body = self.expr()?;
                self.expect(&Tok::Semi)?;
                Ok(Member::Function(FunctionDecl {
                    name,
                    params,
                    body,
                    at,
                }))
            }
            "section" => {
                let name = self.string()?;
                let body = self.block()?;
                Ok(Member::Section(SectionDecl { name, pos, body }))
            }
            "execute" => Ok(Member::Execute {
                body: self.block()?,
                pos,
            }),
            other => Err(Diagnostic::error(
                codes::SYNTAX,
                Some(pos),
                format!("Unknown class member '{}'", other),
            )),
        }
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.take_pragmas();
        self.expect(&Tok::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.take_pragmas();
            if self.eat(&Tok::RBrace) {
                break;
            }
            if self.peek().is_none() {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> ParseResult<Stmt> {
        self.take_pragmas();
        let at = self.pending.take();
        let pos = self.pos();
        let Some(Tok::Ident(keyword)) = self.peek() else {
            return Err(self.unexpected("a statement"));
        };
        let keyword = keyword.clone();
        self.index += 1;

        let stmt = match keyword.as_str() {
            "write" => Stmt::Write(self.string()?),
            "emit" => Stmt::Emit {
                expr: self.expr()?,
                at,
            },
            "var" => {
                let name = self.ident()?;
                self.expect(&Tok::Assign)?;
                Stmt::Var {
                    name,
                    expr: self.expr()?,
                    at,
                }
            }
            "define_section" => Stmt::DefineSection {
                name: self.string()?,
                pos,
            },
            "if" => return self.if_stmt(at),
            "foreach" => return self.foreach_stmt(at),
            other => {
                return Err(Diagnostic::error(
                    codes::SYNTAX,
                    Some(pos),
                    format!("Unknown statement '{}'", other),
                ));
            }
        };
        self.expect(&Tok::Semi)?;
        Ok(stmt)
    }

    fn condition(&mut self) -> ParseResult<Expr> {
        self.expect(&Tok::LParen)?;
        let cond = self.expr()?;
        self.expect(&Tok::RParen)?;
        Ok(cond)
    }

    fn if_stmt(&mut self, at: Option<SourcePos>) -> ParseResult<Stmt> {
        let mut branches = vec![(self.condition()?, self.block()?)];
        let mut otherwise = None;

        while matches!(self.peek_past_pragmas(), Some(Tok::Ident(k)) if k == "else") {
            self.take_pragmas();
            self.pending = None;
            self.index += 1;
            if self.at_keyword("if") {
                self.index += 1;
                branches.push((self.condition()?, self.block()?));
            } else {
                otherwise = Some(self.block()?);
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
            at,
        })
    }

    fn foreach_stmt(&mut self, at: Option<SourcePos>) -> ParseResult<Stmt> {
        self.expect(&Tok::LParen)?;
        self.expect_keyword("var")?;
        let var = self.ident()?;
        self.expect_keyword("in")?;
        let source = self.expr()?;
        self.expect(&Tok::RParen)?;
        let body = self.block()?;
        Ok(Stmt::ForEach {
            var,
            source,
            body,
            at,
        })
    }

    pub(crate) fn expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Tok::OrOr) {
            self.index += 1;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.equality()?;
        while self.peek() == Some(&Tok::AndAnd) {
            self.index += 1;
            let rhs = self.equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let lhs = self.unary()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinaryOp::Eq,
            Some(Tok::NotEq) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.index += 1;
        let rhs = self.unary()?;
        Ok(binary(op, lhs, rhs))
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let pos = self.pos();
        if self.eat(&Tok::Bang) {
            let operand = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Not(Box::new(operand)),
                pos,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let name = self.ident()?;
                expr = Expr {
                    pos: expr.pos,
                    kind: ExprKind::Member {
                        target: Box::new(expr),
                        name,
                    },
                };
            } else if self.eat(&Tok::LParen) {
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        self.expect(&Tok::Comma)?;
                    }
                }
                expr = Expr {
                    pos: expr.pos,
                    kind: ExprKind::Call {
                        target: Box::new(expr),
                        args,
                    },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let pos = self.pos();
        let Some(token) = self.bump() else {
            return Err(self.unexpected("an expression"));
        };
        let kind = match token.tok {
            Tok::Ident(name) => match name.as_str() {
                "true" => ExprKind::Literal(Value::Bool(true)),
                "false" => ExprKind::Literal(Value::Bool(false)),
                "null" => ExprKind::Literal(Value::Null),
                _ => ExprKind::Name(name),
            },
            Tok::Str(value) => ExprKind::Literal(Value::String(value)),
            Tok::Num(number) => ExprKind::Literal(Value::Number(number)),
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(&Tok::RParen)?;
                return Ok(inner);
            }
            other => {
                return Err(Diagnostic::error(
                    codes::SYNTAX,
                    Some(pos),
                    format!("Expected an expression but found {}", other),
                ));
            }
        };
        Ok(Expr { kind, pos })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        pos: lhs.pos,
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_text(text: &str) -> ParseResult<Unit> {
        parse(tokenize(text)?)
    }

    const UNIT: &str = r#"namespace CompiledTemplates.Dynamic;
using Html;
internal class Template_0 : TemplateBase<dynamic>
{
    layout "_Layout";
    function Greet(name) => Text.Concat("Hi ", name);
    section "Foot"
    {
        write "bye";
    }
    execute
    {
#line 3:5 @14
        emit Model.Name;
        if (Model.Show && !Model.Hidden)
        {
            write "x";
        }
#line 7:12 @18
        else if (Model.Other)
        {
        }
        else
        {
            define_section "Foot";
        }
        foreach (var item in Model.Items)
        {
            var label = item.Name;
        }
    }
}
"#;

    #[test]
    fn test_parse_full_unit() {
        let unit = parse_text(UNIT).unwrap();
        assert_eq!(unit.namespace.as_deref(), Some("CompiledTemplates.Dynamic"));
        assert_eq!(unit.usings.len(), 1);
        assert_eq!(unit.class.base.name, "TemplateBase");
        assert_eq!(unit.class.model.name, "dynamic");
        assert_eq!(unit.class.members.len(), 4);

        let Member::Execute { body, .. } = &unit.class.members[3] else {
            panic!("expected execute member");
        };
        assert!(matches!(&body[0], Stmt::Emit { at: Some(at), .. } if *at == SourcePos::new(3, 5)));
        match &body[1] {
            Stmt::If {
                branches,
                otherwise,
                at,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
                assert_eq!(*at, None);
            }
            other => panic!("expected if, got {:?}", other),
        }
        assert!(matches!(&body[2], Stmt::ForEach { var, .. } if var.name == "item"));
    }

    #[test]
    fn test_operator_precedence() {
        let unit = parse_text(
            "class T : B<M> { execute { emit a || b && c == d; } }",
        )
        .unwrap();
        let Member::Execute { body, .. } = &unit.class.members[0] else {
            panic!("expected execute member");
        };
        let Stmt::Emit { expr, .. } = &body[0] else {
            panic!("expected emit");
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Or);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        let err = parse_text("class T : B<M>\n{\n    execute\n    {\n        emit x\n    }\n}")
            .unwrap_err();
        assert_eq!(err.code, codes::SYNTAX);
        assert_eq!(err.position, Some(SourcePos::new(6, 5)));
        assert!(err.message.contains("';'"));
    }

    #[test]
    fn test_unknown_statement() {
        let err = parse_text("class T : B<M> { execute { goto x; } }").unwrap_err();
        assert!(err.message.contains("Unknown statement 'goto'"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse_text("class T : B<M> { } extra").is_err());
    }
}
