use std::rc::Rc;

use super::ast::*;
use super::lexer::{Token, TokenKind, tokenize};
use crate::{Error, Result};

const RESERVED: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "while", "throw", "true",
    "false", "null", "this", "typeof", "void", "new", "delete", "in", "instanceof", "do", "for",
    "break", "continue", "switch", "case", "default", "try", "catch", "finally", "class",
    "with",
];

/// Parses a handler attribute value or a function body: `return` is allowed
/// at the top level.
pub(crate) fn parse_function_body(src: &str) -> Result<Vec<Stmt>> {
    Parser::new(src, 1)?.parse_statements_to_eof()
}

/// Parses script element content.
pub(crate) fn parse_program(src: &str) -> Result<Vec<Stmt>> {
    Parser::new(src, 0)?.parse_statements_to_eof()
}

struct Parser {
    tokens: Vec<Token>,
    i: usize,
    function_depth: usize,
}

impl Parser {
    fn new(src: &str, function_depth: usize) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(src)?,
            i: 0,
            function_depth,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.i.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.i < self.tokens.len() - 1 {
            self.i += 1;
        }
        token
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(name) if name == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> Error {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Number(value) => format!("number {value}"),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Punct(p) => format!("'{p}'"),
            TokenKind::Eof => "end of input".to_string(),
        };
        Error::ScriptParse(format!("unexpected {found} at {}", token.pos))
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek_kind() {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Accepts `;`, or inserts one before `}`, end of input, or a new line.
    fn consume_statement_end(&mut self) -> Result<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        if token.newline_before || matches!(token.kind, TokenKind::Eof) || self.at_punct("}") {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn parse_statements_to_eof(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.at_punct("}") {
            if matches!(self.peek_kind(), TokenKind::Eof) {
                return Err(self.unexpected());
            }
            stmts.push(self.parse_statement()?);
        }
        self.advance();
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.at_punct("{") {
            return Ok(Stmt::Block(self.parse_block_body()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        let keyword = match self.peek_kind() {
            TokenKind::Ident(name) => name.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "var" | "let" | "const" => {
                self.advance();
                let kind = match keyword.as_str() {
                    "var" => DeclKind::Var,
                    "let" => DeclKind::Let,
                    _ => DeclKind::Const,
                };
                let mut decls = Vec::new();
                loop {
                    let name = self.expect_identifier()?;
                    let init = if self.eat_punct("=") {
                        Some(self.parse_assignment()?)
                    } else if kind == DeclKind::Const {
                        return Err(Error::ScriptParse(format!(
                            "missing initializer in const declaration of {name}"
                        )));
                    } else {
                        None
                    };
                    decls.push((name, init));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.consume_statement_end()?;
                Ok(Stmt::VarDecl { kind, decls })
            }
            "function" => {
                self.advance();
                let name = self.expect_identifier()?;
                let def = self.parse_function_rest(Some(name))?;
                Ok(Stmt::FunctionDecl(Rc::new(def)))
            }
            "return" => {
                let token = self.advance();
                if self.function_depth == 0 {
                    return Err(Error::ScriptParse(format!(
                        "illegal return statement at {}",
                        token.pos
                    )));
                }
                let next = self.peek();
                let value = if next.newline_before
                    || self.at_punct(";")
                    || self.at_punct("}")
                    || matches!(next.kind, TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_statement_end()?;
                Ok(Stmt::Return(value))
            }
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let cond = self.parse_expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.parse_statement()?);
                let otherwise = if self.eat_keyword("else") {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let cond = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { cond, body })
            }
            "throw" => {
                let token = self.advance();
                if self.peek().newline_before {
                    return Err(Error::ScriptParse(format!(
                        "illegal newline after throw at {}",
                        token.pos
                    )));
                }
                let value = self.parse_expression()?;
                self.consume_statement_end()?;
                Ok(Stmt::Throw(value))
            }
            "else" | "case" | "default" | "catch" | "finally" => Err(self.unexpected()),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_statement_end()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_function_rest(&mut self, name: Option<String>) -> Result<FunctionDef> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.eat_punct(")") {
            loop {
                params.push(self.expect_identifier()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }
        self.function_depth += 1;
        let body = self.parse_block_body();
        self.function_depth -= 1;
        Ok(FunctionDef {
            name,
            params,
            body: body?,
        })
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_assignment()?;
        if self.at_punct(",") {
            // Comma expressions are outside the dialect.
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        let pos = self.advance().pos;
        if !is_assignment_target(&target) {
            return Err(Error::ScriptParse(format!(
                "invalid assignment target at {pos}"
            )));
        }
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_logical_or()?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.eat_punct("||") {
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_binary(0)?;
        while self.eat_punct("&&") {
            let rhs = self.parse_binary(0)?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// Precedence climbing over equality, relational, additive and
    /// multiplicative operators.
    fn parse_binary(&mut self, min_level: usize) -> Result<Expr> {
        const LEVELS: &[&[(&str, BinaryOp)]] = &[
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
        ];

        if min_level >= LEVELS.len() {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(min_level + 1)?;
        'outer: loop {
            for (punct, op) in LEVELS[min_level] {
                if self.eat_punct(punct) {
                    let rhs = self.parse_binary(min_level + 1)?;
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.eat_punct("!") {
            Some(UnaryOp::Not)
        } else if self.eat_punct("-") {
            Some(UnaryOp::Neg)
        } else if self.eat_punct("+") {
            Some(UnaryOp::Plus)
        } else if self.eat_keyword("typeof") {
            Some(UnaryOp::Typeof)
        } else if self.eat_keyword("void") {
            Some(UnaryOp::Void)
        } else {
            None
        };
        if let Some(op) = op {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        for (punct, delta) in [("++", 1.0), ("--", -1.0)] {
            if self.at_punct(punct) {
                let pos = self.advance().pos;
                let target = self.parse_unary()?;
                if !is_assignment_target(&target) {
                    return Err(Error::ScriptParse(format!(
                        "invalid update target at {pos}"
                    )));
                }
                return Ok(Expr::Update {
                    delta,
                    prefix: true,
                    target: Box::new(target),
                });
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let property = match self.peek_kind() {
                    TokenKind::Ident(name) => name.clone(),
                    _ => return Err(self.unexpected()),
                };
                self.advance();
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }

        if !self.peek().newline_before {
            for (punct, delta) in [("++", 1.0), ("--", -1.0)] {
                if self.at_punct(punct) {
                    let pos = self.advance().pos;
                    if !is_assignment_target(&expr) {
                        return Err(Error::ScriptParse(format!(
                            "invalid update target at {pos}"
                        )));
                    }
                    return Ok(Expr::Update {
                        delta,
                        prefix: false,
                        target: Box::new(expr),
                    });
                }
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.i;
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Str(value) => Ok(Expr::String(value)),
            TokenKind::Punct("(") => {
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.parse_assignment()?);
                    if !self.at_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::Punct("{") => {
                let mut props = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.peek_kind() {
                        TokenKind::Ident(name) => name.clone(),
                        TokenKind::Str(value) => value.clone(),
                        TokenKind::Number(value) => super::value::format_number(*value),
                        _ => return Err(self.unexpected()),
                    };
                    self.advance();
                    self.expect_punct(":")?;
                    props.push((key, self.parse_assignment()?));
                    if !self.at_punct("}") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Object(props))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "this" => Ok(Expr::This),
                "function" => {
                    let fn_name = match self.peek_kind() {
                        TokenKind::Ident(_) => Some(self.expect_identifier()?),
                        _ => None,
                    };
                    Ok(Expr::Function(Rc::new(self.parse_function_rest(fn_name)?)))
                }
                // `new F(args)` constructs by calling; host constructors
                // return fresh objects either way.
                "new" => {
                    let mut callee = self.parse_primary()?;
                    loop {
                        if self.eat_punct(".") {
                            let property = match self.peek_kind() {
                                TokenKind::Ident(name) => name.clone(),
                                _ => return Err(self.unexpected()),
                            };
                            self.advance();
                            callee = Expr::Member {
                                object: Box::new(callee),
                                property,
                            };
                        } else if self.eat_punct("[") {
                            let index = self.parse_expression()?;
                            self.expect_punct("]")?;
                            callee = Expr::Index {
                                object: Box::new(callee),
                                index: Box::new(index),
                            };
                        } else {
                            break;
                        }
                    }
                    let args = if self.eat_punct("(") {
                        self.parse_arguments()?
                    } else {
                        Vec::new()
                    };
                    Ok(Expr::Call {
                        callee: Box::new(callee),
                        args,
                    })
                }
                reserved if RESERVED.contains(&reserved) => {
                    self.i = start;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(name)),
            },
            _ => {
                self.i = start;
                Err(self.unexpected())
            }
        }
    }
}

fn is_assignment_target(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_bodies_may_return() -> Result<()> {
        let stmts = parse_function_body("return false")?;
        assert_eq!(stmts, vec![Stmt::Return(Some(Expr::Bool(false)))]);
        Ok(())
    }

    #[test]
    fn programs_may_not_return() {
        assert!(matches!(
            parse_program("return 1"),
            Err(Error::ScriptParse(_))
        ));
    }

    #[test]
    fn precedence_binds_multiplication_tighter() -> Result<()> {
        let stmts = parse_function_body("1 + 2 * 3")?;
        assert_eq!(
            stmts,
            vec![Stmt::Expr(Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            })]
        );
        Ok(())
    }

    #[test]
    fn newline_terminates_statements() -> Result<()> {
        let stmts = parse_function_body("a = 1\nb = 2")?;
        assert_eq!(stmts.len(), 2);
        assert!(parse_function_body("a = 1 b = 2").is_err());
        Ok(())
    }

    #[test]
    fn return_followed_by_newline_returns_undefined() -> Result<()> {
        let stmts = parse_function_body("return\n1")?;
        assert_eq!(stmts[0], Stmt::Return(None));
        Ok(())
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        for src in ["return (", "}", "if (x", "1 +", "var", "a.", "x = = 1", "5 = 1"] {
            assert!(
                parse_function_body(src).is_err(),
                "expected a syntax error for {src:?}"
            );
        }
    }

    #[test]
    fn new_expressions_parse_as_calls() -> Result<()> {
        let stmts = parse_program("throw new Error('boom')")?;
        assert!(matches!(&stmts[0], Stmt::Throw(Expr::Call { args, .. }) if args.len() == 1));
        Ok(())
    }

    #[test]
    fn nested_functions_parse() -> Result<()> {
        let stmts = parse_program(
            "function add(a, b) { return a + b }\nvar f = function () { return add(1, 2); };",
        )?;
        assert!(matches!(stmts[0], Stmt::FunctionDecl(_)));
        assert!(matches!(stmts[1], Stmt::VarDecl { .. }));
        Ok(())
    }
}
