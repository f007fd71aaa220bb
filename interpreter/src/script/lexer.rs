use crate::error::RuntimeError;
use crate::script::ast::Expr;

/// A piece of a template literal before its expressions are parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Eq,
    PlusEq,
    MinusEq,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AmpAmp,
    PipePipe,
    QuestionQuestion,
    Bang,
    Question,
    Colon,
    Comma,
    Dot,
    Semicolon,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    // Directives spliced in from template instructions
    EmitLiteral(usize),
    EmitExpression(Box<Expr>),
    SectionMarker(String),
}

/// Split embedded code into tokens. Line and block comments are skipped.
pub fn tokenize(text: &str, tokens: &mut Vec<Token>) -> Result<(), RuntimeError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }

            '/' if next == Some('/') => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < len && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                if i >= len {
                    return Err(RuntimeError::syntax("unterminated comment"));
                }
                i += 2;
            }

            '"' | '\'' => {
                let (s, end) = read_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = end;
            }
            '`' => {
                let (chunks, end) = read_template(&chars, i)?;
                tokens.push(Token::Template(chunks));
                i = end;
            }

            '0'..='9' => {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < len && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let num_str: String = chars[start..i].iter().collect();
                let n = num_str
                    .parse::<f64>()
                    .map_err(|_| RuntimeError::syntax(format!("invalid number '{}'", num_str)))?;
                tokens.push(Token::Number(n));
            }

            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }

            _ => {
                let (token, width) = operator(c, next, chars.get(i + 2).copied())
                    .ok_or_else(|| RuntimeError::syntax(format!("unexpected character '{}'", c)))?;
                tokens.push(token);
                i += width;
            }
        }
    }
    Ok(())
}

/// Operators and punctuation; returns the token and how many chars it spans.
fn operator(c: char, next: Option<char>, third: Option<char>) -> Option<(Token, usize)> {
    let token = match (c, next, third) {
        ('=', Some('='), Some('=')) => (Token::EqEqEq, 3),
        ('!', Some('='), Some('=')) => (Token::BangEqEq, 3),
        ('=', Some('='), _) => (Token::EqEq, 2),
        ('!', Some('='), _) => (Token::BangEq, 2),
        ('<', Some('='), _) => (Token::LtEq, 2),
        ('>', Some('='), _) => (Token::GtEq, 2),
        ('&', Some('&'), _) => (Token::AmpAmp, 2),
        ('|', Some('|'), _) => (Token::PipePipe, 2),
        ('?', Some('?'), _) => (Token::QuestionQuestion, 2),
        ('+', Some('+'), _) => (Token::PlusPlus, 2),
        ('-', Some('-'), _) => (Token::MinusMinus, 2),
        ('+', Some('='), _) => (Token::PlusEq, 2),
        ('-', Some('='), _) => (Token::MinusEq, 2),
        ('=', _, _) => (Token::Eq, 1),
        ('!', _, _) => (Token::Bang, 1),
        ('<', _, _) => (Token::Lt, 1),
        ('>', _, _) => (Token::Gt, 1),
        ('+', _, _) => (Token::Plus, 1),
        ('-', _, _) => (Token::Minus, 1),
        ('*', _, _) => (Token::Star, 1),
        ('/', _, _) => (Token::Slash, 1),
        ('%', _, _) => (Token::Percent, 1),
        ('?', _, _) => (Token::Question, 1),
        (':', _, _) => (Token::Colon, 1),
        (',', _, _) => (Token::Comma, 1),
        ('.', _, _) => (Token::Dot, 1),
        (';', _, _) => (Token::Semicolon, 1),
        ('(', _, _) => (Token::LParen, 1),
        (')', _, _) => (Token::RParen, 1),
        ('{', _, _) => (Token::LBrace, 1),
        ('}', _, _) => (Token::RBrace, 1),
        ('[', _, _) => (Token::LBracket, 1),
        (']', _, _) => (Token::RBracket, 1),
        _ => return None,
    };
    Some(token)
}

fn escaped(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

/// Read a quoted string starting at `start`; returns it and the index after
/// the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), RuntimeError> {
    let quote = chars[start];
    let mut s = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                s.push(escaped(chars[i + 1]));
                i += 2;
            }
            c if c == quote => return Ok((s, i + 1)),
            '\n' => break,
            c => {
                s.push(c);
                i += 1;
            }
        }
    }
    Err(RuntimeError::syntax("unterminated string literal"))
}

/// Read a template literal; `${...}` parts are kept as source text.
fn read_template(
    chars: &[char],
    start: usize,
) -> Result<(Vec<TemplateChunk>, usize), RuntimeError> {
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(escaped(chars[i + 1]));
                i += 2;
            }
            '`' => {
                if !text.is_empty() {
                    chunks.push(TemplateChunk::Text(text));
                }
                return Ok((chunks, i + 1));
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                if !text.is_empty() {
                    chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                }
                i += 2;
                let code_start = i;
                let mut depth = 1;
                while i < chars.len() {
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    break;
                }
                chunks.push(TemplateChunk::Code(chars[code_start..i].iter().collect()));
                i += 1;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(RuntimeError::syntax("unterminated template literal"))
}
