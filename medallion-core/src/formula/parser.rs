//! Tokenizer and recursive descent parser for formulas.

use super::{BinaryOp, Expr, UnaryOp};
use crate::table::Value;

/// Parse formula text into an expression tree.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty formula".to_string());
    }
    let mut pos = 0;
    let expr = parse_or(&tokens, &mut pos, 0)?;
    if pos < tokens.len() {
        return Err(format!(
            "unexpected token at position {}: {:?}",
            pos, tokens[pos]
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == '_' {
                        if c != '_' {
                            num_str.push(c);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                if num_str.contains('.') {
                    let num: f64 = num_str
                        .parse()
                        .map_err(|_| format!("invalid number: {num_str}"))?;
                    tokens.push(Token::Float(num));
                } else {
                    let num: i64 = num_str
                        .parse()
                        .map_err(|_| format!("invalid number: {num_str}"))?;
                    tokens.push(Token::Int(num));
                }
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => text.push(c),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => name.push(c),
                        None => return Err("unterminated `quoted` name".to_string()),
                    }
                }
                tokens.push(Token::Ident(name));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "True" => Token::True,
                    "False" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.peek() == Some(&'=');
                if followed_by_eq {
                    chars.next();
                }
                tokens.push(match (ch, followed_by_eq) {
                    ('=', true) => Token::EqEq,
                    ('!', true) => Token::NotEq,
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    ('>', false) => Token::Gt,
                    ('>', true) => Token::Ge,
                    _ => return Err(format!("unexpected character: '{ch}'")),
                });
            }
            _ => {
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '&' => Token::And,
                    '|' => Token::Or,
                    '~' => Token::Not,
                    _ => return Err(format!("unexpected character: '{ch}'")),
                };
                tokens.push(token);
                chars.next();
            }
        }
    }

    Ok(tokens)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary(op, Box::new(left), Box::new(right))
}

/// Bound on expression tree depth. Operator chains count one level per
/// operator, so evaluation never recurses deeper than this either.
const MAX_DEPTH: usize = 256;

fn check_depth(depth: usize) -> Result<(), String> {
    if depth > MAX_DEPTH {
        Err("expression nested too deeply".to_string())
    } else {
        Ok(())
    }
}

// or = and (('or' | '|') and)*
fn parse_or(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    let mut left = parse_and(tokens, pos, depth)?;
    let mut depth = depth;
    while tokens.get(*pos) == Some(&Token::Or) {
        *pos += 1;
        depth += 1;
        let right = parse_and(tokens, pos, depth)?;
        left = binary(BinaryOp::Or, left, right);
    }
    Ok(left)
}

// and = not (('and' | '&') not)*
fn parse_and(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    let mut left = parse_not(tokens, pos, depth)?;
    let mut depth = depth;
    while tokens.get(*pos) == Some(&Token::And) {
        *pos += 1;
        depth += 1;
        let right = parse_not(tokens, pos, depth)?;
        left = binary(BinaryOp::And, left, right);
    }
    Ok(left)
}

// not = ('not' | '~') not | comparison
fn parse_not(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    if tokens.get(*pos) == Some(&Token::Not) {
        *pos += 1;
        let operand = parse_not(tokens, pos, depth + 1)?;
        return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
    }
    parse_comparison(tokens, pos, depth)
}

// comparison = additive (cmp additive)?
fn parse_comparison(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    let left = parse_additive(tokens, pos, depth)?;
    let op = match tokens.get(*pos) {
        Some(Token::EqEq) => BinaryOp::Eq,
        Some(Token::NotEq) => BinaryOp::Ne,
        Some(Token::Lt) => BinaryOp::Lt,
        Some(Token::Le) => BinaryOp::Le,
        Some(Token::Gt) => BinaryOp::Gt,
        Some(Token::Ge) => BinaryOp::Ge,
        _ => return Ok(left),
    };
    *pos += 1;
    let right = parse_additive(tokens, pos, depth + 1)?;
    Ok(binary(op, left, right))
}

// additive = term (('+' | '-') term)*
fn parse_additive(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    let mut left = parse_term(tokens, pos, depth)?;
    let mut depth = depth;
    while *pos < tokens.len() {
        let op = match tokens[*pos] {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            _ => break,
        };
        *pos += 1;
        depth += 1;
        let right = parse_term(tokens, pos, depth)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

// term = unary (('*' | '/') unary)*
fn parse_term(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    let mut left = parse_unary(tokens, pos, depth)?;
    let mut depth = depth;
    while *pos < tokens.len() {
        let op = match tokens[*pos] {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            _ => break,
        };
        *pos += 1;
        depth += 1;
        let right = parse_unary(tokens, pos, depth)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

// unary = '-' unary | factor
fn parse_unary(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    check_depth(depth)?;
    if tokens.get(*pos) == Some(&Token::Minus) {
        *pos += 1;
        let operand = parse_unary(tokens, pos, depth + 1)?;
        return Ok(match operand {
            Expr::Literal(Value::Int(i)) => Expr::Literal(Value::Int(-i)),
            Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
            other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
        });
    }
    parse_factor(tokens, pos, depth)
}

// factor = NUMBER | STRING | BOOL | NAME | '(' or ')'
fn parse_factor(tokens: &[Token], pos: &mut usize, depth: usize) -> Result<Expr, String> {
    let Some(token) = tokens.get(*pos) else {
        return Err("unexpected end of formula".to_string());
    };
    *pos += 1;
    match token {
        Token::Int(i) => Ok(Expr::Literal(Value::Int(*i))),
        Token::Float(f) => Ok(Expr::Literal(Value::Float(*f))),
        Token::Str(s) => Ok(Expr::Literal(Value::Str(s.clone()))),
        Token::True => Ok(Expr::Literal(Value::Bool(true))),
        Token::False => Ok(Expr::Literal(Value::Bool(false))),
        Token::Ident(name) => Ok(Expr::Column(name.clone())),
        Token::LParen => {
            let inner = parse_or(tokens, pos, depth + 1)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err("missing closing parenthesis".to_string()),
            }
        }
        other => Err(format!("unexpected token: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::Column(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                col("a"),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    col("b"),
                    Box::new(Expr::Literal(Value::Int(2)))
                ))
            )
        );
    }

    #[test]
    fn test_parentheses_and_unary_minus() {
        let expr = parse("-(a - 1.5)").unwrap();
        assert!(matches!(expr, Expr::Unary(UnaryOp::Neg, _)));
        assert_eq!(parse("-3").unwrap(), Expr::Literal(Value::Int(-3)));
    }

    #[test]
    fn test_logic_binds_looser_than_comparison() {
        let expr = parse("a > 1 & b < 2").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _)));
        let expr = parse("not a == 1 or b").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Or, _, _)));
    }

    #[test]
    fn test_quoted_names_and_strings() {
        assert_eq!(
            parse("`load mw`").unwrap(),
            Expr::Column("load mw".to_string())
        );
        assert_eq!(
            parse("'DE'").unwrap(),
            Expr::Literal(Value::Str("DE".to_string()))
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("a $ b").is_err());
        assert!(parse("'open").is_err());
        assert!(parse("1.2.3").is_err());
        assert!(parse("a = b").is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let ok = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&ok).unwrap(), Expr::Column("a".into()));

        let deep = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(parse(&deep).unwrap_err(), "expression nested too deeply");

        let negations = format!("{}a", "-".repeat(10_000));
        assert_eq!(parse(&negations).unwrap_err(), "expression nested too deeply");
    }

    #[test]
    fn test_long_operator_chains_are_bounded() {
        let short = vec!["a"; 100].join(" + ");
        assert!(parse(&short).is_ok());

        let long = vec!["a"; 10_000].join(" + ");
        assert_eq!(parse(&long).unwrap_err(), "expression nested too deeply");
    }
}
