use crate::error::RuntimeError;
use crate::script::ast::{
    AssignOperator, BinaryOperator, Expr, LogicalOperator, Stmt, TemplatePart, UnaryOperator,
};
use crate::script::lexer::{TemplateChunk, Token, tokenize};

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left.
const BP_ASSIGNMENT: u8 = 1; // = += -=
const BP_CONDITIONAL: u8 = 2; // ? :
const BP_COALESCE: u8 = 3; // ??
const BP_OR: u8 = 4; // ||
const BP_AND: u8 = 6; // &&
const BP_EQUALITY: u8 = 8; // == != === !==
const BP_COMPARISON: u8 = 10; // < > <= >=
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // ! - + typeof ++x
const BP_POSTFIX: u8 = 18; // . [] () x++

/// Deepest statement or expression nesting the parser accepts.
const MAX_NESTING: usize = 256;

/// Parse a whole token stream into statements.
pub fn parse_program(tokens: Vec<Token>) -> Result<Vec<Stmt>, RuntimeError> {
    let mut parser = ScriptParser::new(tokens);
    let mut statements = Vec::new();
    while !parser.at_end() {
        statements.push(parser.parse_statement()?);
    }
    Ok(statements)
}

/// Parse source text that must hold exactly one expression.
pub fn parse_expression(source: &str) -> Result<Expr, RuntimeError> {
    parse_nested_expression(source, 0)
}

/// [`parse_expression`] for code found `depth` levels deep, e.g. inside `${...}`.
fn parse_nested_expression(source: &str, depth: usize) -> Result<Expr, RuntimeError> {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens)?;
    let mut parser = ScriptParser::new(tokens);
    parser.depth = depth;
    let expr = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(parser.unexpected("after expression"));
    }
    Ok(expr)
}

struct ScriptParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl ScriptParser {
    fn new(tokens: Vec<Token>) -> Self {
        ScriptParser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if self.depth >= MAX_NESTING {
            return Err(RuntimeError::StackOverflow);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, context: &str) -> RuntimeError {
        match self.peek() {
            Some(token) => {
                RuntimeError::syntax(format!("unexpected {} {}", describe(token), context))
            }
            None => RuntimeError::syntax(format!("unexpected end of code {}", context)),
        }
    }

    fn expect(&mut self, token: Token, context: &str) -> Result<(), RuntimeError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{} (expected {})", context, describe(&token))))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, RuntimeError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.unexpected(context)),
            },
            _ => Err(self.unexpected(context)),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, RuntimeError> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, RuntimeError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("where a statement was expected"));
        };

        match token {
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::LBrace => self.parse_block(),
            Token::EmitLiteral(_) | Token::EmitExpression(_) | Token::SectionMarker(_) => {
                match self.advance() {
                    Some(Token::EmitLiteral(index)) => Ok(Stmt::EmitLiteral(index)),
                    Some(Token::EmitExpression(expr)) => Ok(Stmt::EmitExpression(*expr)),
                    Some(Token::SectionMarker(name)) => Ok(Stmt::SectionMarker(name)),
                    _ => Err(self.unexpected("in directive")),
                }
            }
            Token::Ident(word) => match word.as_str() {
                "var" | "let" | "const" => {
                    let declaration = self.parse_declaration()?;
                    self.eat(&Token::Semicolon);
                    Ok(declaration)
                }
                "if" => self.parse_if(),
                "for" => self.parse_for(),
                "while" => {
                    self.advance();
                    self.expect(Token::LParen, "after 'while'")?;
                    let condition = self.parse_expr(0)?;
                    self.expect(Token::RParen, "after while condition")?;
                    let body = Box::new(self.parse_statement()?);
                    Ok(Stmt::While { condition, body })
                }
                "break" => {
                    self.advance();
                    self.eat(&Token::Semicolon);
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.advance();
                    self.eat(&Token::Semicolon);
                    Ok(Stmt::Continue)
                }
                _ => self.parse_expression_statement(),
            },
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, RuntimeError> {
        let expr = self.parse_expr(0)?;
        self.eat(&Token::Semicolon);
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> Result<Stmt, RuntimeError> {
        self.expect(Token::LBrace, "at block start")?;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("in block (expected '}')"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance();
        Ok(Stmt::Block(statements))
    }

    /// `var a = 1, b` without the trailing semicolon.
    fn parse_declaration(&mut self) -> Result<Stmt, RuntimeError> {
        let template_scoped = self.check_keyword("var");
        self.advance();
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_ident("in declaration")?;
            let init = if self.eat(&Token::Eq) {
                Some(self.parse_expr(BP_ASSIGNMENT)?)
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Declare {
            template_scoped,
            declarations,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, RuntimeError> {
        self.advance();
        self.expect(Token::LParen, "after 'if'")?;
        let condition = self.parse_expr(0)?;
        self.expect(Token::RParen, "after if condition")?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.check_keyword("else") {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, RuntimeError> {
        self.advance();
        self.expect(Token::LParen, "after 'for'")?;

        // for (x of xs) / for (const k in obj)
        let declares = ["var", "let", "const"]
            .iter()
            .any(|keyword| self.check_keyword(keyword));
        let skip = usize::from(declares);
        if let (Some(Token::Ident(name)), Some(Token::Ident(kind))) =
            (self.peek_at(skip), self.peek_at(skip + 1))
        {
            if kind == "of" || kind == "in" {
                let name = name.clone();
                let is_of = kind == "of";
                self.pos += skip + 2;
                let target = self.parse_expr(0)?;
                self.expect(Token::RParen, "after for head")?;
                let body = Box::new(self.parse_statement()?);
                return Ok(if is_of {
                    Stmt::ForOf {
                        name,
                        iterable: target,
                        body,
                    }
                } else {
                    Stmt::ForIn {
                        name,
                        object: target,
                        body,
                    }
                });
            }
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else if declares {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expr(0)?)))
        };
        self.expect(Token::Semicolon, "after for initializer")?;
        let condition = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(Token::Semicolon, "after for condition")?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(Token::RParen, "after for update")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, RuntimeError> {
        self.nested(|parser| parser.parse_expr_inner(min_bp))
    }

    fn parse_expr_inner(&mut self, min_bp: u8) -> Result<Expr, RuntimeError> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek() else { break };

            match token {
                Token::Dot | Token::LParen | Token::LBracket if BP_POSTFIX >= min_bp => {
                    left = self.parse_postfix(left)?;
                    continue;
                }
                Token::PlusPlus | Token::MinusMinus if BP_POSTFIX >= min_bp => {
                    let increment = matches!(token, Token::PlusPlus);
                    self.advance();
                    left = Expr::Update {
                        target: Box::new(assignable(left)?),
                        increment,
                        prefix: false,
                    };
                    continue;
                }
                Token::Eq | Token::PlusEq | Token::MinusEq if BP_ASSIGNMENT >= min_bp => {
                    let operator = match token {
                        Token::PlusEq => AssignOperator::Add,
                        Token::MinusEq => AssignOperator::Subtract,
                        _ => AssignOperator::Assign,
                    };
                    self.advance();
                    let value = self.parse_expr(BP_ASSIGNMENT)?;
                    left = Expr::Assign {
                        target: Box::new(assignable(left)?),
                        operator,
                        value: Box::new(value),
                    };
                    continue;
                }
                Token::Question if BP_CONDITIONAL >= min_bp => {
                    self.advance();
                    let then = self.parse_expr(0)?;
                    self.expect(Token::Colon, "in conditional expression")?;
                    let otherwise = self.parse_expr(BP_CONDITIONAL)?;
                    left = Expr::Conditional {
                        condition: Box::new(left),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    };
                    continue;
                }
                _ => {}
            }

            let Some((l_bp, r_bp)) = infix_bp(token) else { break };
            if l_bp < min_bp {
                break;
            }
            let Some(op) = self.advance() else { break };
            let right = self.parse_expr(r_bp)?;

            let logical = match op {
                Token::AmpAmp => Some(LogicalOperator::And),
                Token::PipePipe => Some(LogicalOperator::Or),
                Token::QuestionQuestion => Some(LogicalOperator::Coalesce),
                _ => None,
            };
            if let Some(operator) = logical {
                left = Expr::Logical {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                continue;
            }

            let operator = match op {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                Token::EqEq => BinaryOperator::Equal,
                Token::BangEq => BinaryOperator::NotEqual,
                Token::EqEqEq => BinaryOperator::StrictEqual,
                Token::BangEqEq => BinaryOperator::StrictNotEqual,
                Token::Lt => BinaryOperator::Less,
                Token::Gt => BinaryOperator::Greater,
                Token::LtEq => BinaryOperator::LessOrEqual,
                Token::GtEq => BinaryOperator::GreaterOrEqual,
                other => {
                    return Err(RuntimeError::syntax(format!(
                        "unexpected infix {}",
                        describe(&other)
                    )));
                }
            };
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_postfix(&mut self, left: Expr) -> Result<Expr, RuntimeError> {
        match self.advance() {
            Some(Token::Dot) => {
                let property = self.expect_ident("after '.'")?;
                Ok(Expr::Member {
                    object: Box::new(left),
                    property,
                })
            }
            Some(Token::LParen) => {
                let args = self.parse_list(Token::RParen)?;
                Ok(Expr::Call {
                    callee: Box::new(left),
                    args,
                })
            }
            Some(Token::LBracket) => {
                let index = self.parse_expr(0)?;
                self.expect(Token::RBracket, "after index")?;
                Ok(Expr::Index {
                    object: Box::new(left),
                    index: Box::new(index),
                })
            }
            _ => Err(self.unexpected("after expression")),
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr, RuntimeError> {
        let token = self
            .advance()
            .ok_or_else(|| RuntimeError::syntax("unexpected end of expression"))?;

        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Template(chunks) => {
                let parts = chunks
                    .into_iter()
                    .map(|chunk| match chunk {
                        TemplateChunk::Text(text) => Ok(TemplatePart::Literal(text)),
                        TemplateChunk::Code(code) => {
                            parse_nested_expression(&code, self.depth).map(TemplatePart::Expr)
                        }
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Expr::Template(parts))
            }

            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Boolean(true)),
                "false" => Ok(Expr::Boolean(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "typeof" => self.parse_unary(UnaryOperator::Typeof),
                _ => Ok(Expr::Ident(name)),
            },

            Token::Bang => self.parse_unary(UnaryOperator::Not),
            Token::Minus => self.parse_unary(UnaryOperator::Negate),
            Token::Plus => self.parse_unary(UnaryOperator::Plus),
            Token::PlusPlus | Token::MinusMinus => {
                let target = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Update {
                    target: Box::new(assignable(target)?),
                    increment: token == Token::PlusPlus,
                    prefix: true,
                })
            }

            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "after parenthesized expression")?;
                Ok(expr)
            }
            Token::LBracket => Ok(Expr::Array(self.parse_list(Token::RBracket)?)),
            Token::LBrace => self.parse_object(),

            other => Err(RuntimeError::syntax(format!(
                "unexpected {} in expression",
                describe(&other)
            ))),
        }
    }

    fn parse_unary(&mut self, operator: UnaryOperator) -> Result<Expr, RuntimeError> {
        let operand = self.parse_expr(BP_UNARY)?;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, RuntimeError> {
        let mut items = Vec::new();
        while !self.eat(&close) {
            items.push(self.parse_expr(BP_ASSIGNMENT)?);
            if !self.eat(&Token::Comma) {
                self.expect(close, "after list")?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_object(&mut self) -> Result<Expr, RuntimeError> {
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.advance() {
                Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                Some(Token::Number(n)) => crate::runtime_value::format_number(n),
                _ => return Err(RuntimeError::syntax("expected a property name in object literal")),
            };
            let value = if self.eat(&Token::Colon) {
                self.parse_expr(BP_ASSIGNMENT)?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "after object literal")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::QuestionQuestion => Some((BP_COALESCE, BP_COALESCE + 1)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq | Token::EqEqEq | Token::BangEqEq => {
            Some((BP_EQUALITY, BP_EQUALITY + 1))
        }
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => {
            Some((BP_COMPARISON, BP_COMPARISON + 1))
        }
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

fn assignable(expr: Expr) -> Result<Expr, RuntimeError> {
    match expr {
        Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. } => Ok(expr),
        _ => Err(RuntimeError::InvalidAssignment),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", n),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Template(_) => "template literal".to_string(),
        Token::Ident(name) => format!("'{}'", name),
        Token::EmitLiteral(_) | Token::EmitExpression(_) => "template markup".to_string(),
        Token::SectionMarker(name) => format!("section '{}'", name),
        other => format!("{:?}", other),
    }
}
