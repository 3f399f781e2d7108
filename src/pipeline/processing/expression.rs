//! Sandboxed evaluator for `${...}` placeholders in document fields.
//!
//! Supported: numbers, quoted strings, field names, `+ - * / %`, unary minus, parentheses and
//! the functions `upper`, `lower` and `trim`. `+` adds when both sides are numeric and
//! concatenates otherwise.

use crate::error::{Result, ScraperError};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Num(f64),
    Str(String),
}

impl Val {
    fn as_number(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            Val::Str(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    fn into_string(self) -> String {
        match self {
            Val::Num(n) => format_number(n),
            Val::Str(s) => s,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn err(msg: impl Into<String>) -> ScraperError {
    ScraperError::Expression(msg.into())
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| err(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Num(n));
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string literal")),
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                s.push(*next);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(err(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a HashMap<String, String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            other => Err(err(format!("expected {:?}, found {:?}", want, other))),
        }
    }

    fn expression(&mut self) -> Result<Val> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Val> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Val> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            let v = self.unary()?;
            let n = v
                .as_number()
                .ok_or_else(|| err("unary minus applied to a non-number"))?;
            return Ok(Val::Num(-n));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Val> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Val::Num(n)),
            Some(Token::Str(s)) => Ok(Val::Str(s)),
            Some(Token::LParen) => {
                let v = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let arg = self.expression()?;
                    self.expect(Token::RParen)?;
                    return call(&name, arg);
                }
                self.vars
                    .get(&name)
                    .map(|v| Val::Str(v.clone()))
                    .ok_or_else(|| err(format!("undefined variable '{}'", name)))
            }
            other => Err(err(format!("unexpected token {:?}", other))),
        }
    }
}

fn call(name: &str, arg: Val) -> Result<Val> {
    let s = arg.into_string();
    match name {
        "upper" => Ok(Val::Str(s.to_uppercase())),
        "lower" => Ok(Val::Str(s.to_lowercase())),
        "trim" => Ok(Val::Str(s.trim().to_string())),
        other => Err(err(format!("unknown function '{}'", other))),
    }
}

fn binary(op: char, left: Val, right: Val) -> Result<Val> {
    if op == '+' {
        return Ok(match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Val::Num(a + b),
            _ => Val::Str(left.into_string() + &right.into_string()),
        });
    }
    let (a, b) = match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(err(format!("operator '{}' needs numeric operands", op))),
    };
    match op {
        '-' => Ok(Val::Num(a - b)),
        '*' => Ok(Val::Num(a * b)),
        '/' if b == 0.0 => Err(err("division by zero")),
        '/' => Ok(Val::Num(a / b)),
        '%' if b == 0.0 => Err(err("modulo by zero")),
        '%' => Ok(Val::Num(a % b)),
        _ => Err(err(format!("unknown operator '{}'", op))),
    }
}

/// Evaluates a single expression against string-valued variables.
pub fn evaluate(expr: &str, vars: &HashMap<String, String>) -> Result<String> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(err("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0, vars };
    let value = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(err(format!("unexpected trailing input in '{}'", expr)));
    }
    Ok(value.into_string())
}

pub fn has_placeholder(s: &str) -> bool {
    s.find("${").is_some_and(|start| s[start..].contains('}'))
}

/// Splits a template into literal text and placeholder bodies.
fn segments(template: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        if start > 0 {
            out.push((false, &rest[..start]));
        }
        out.push((true, &rest[start + 2..start + 2 + len]));
        rest = &rest[start + 3 + len..];
    }
    if !rest.is_empty() {
        out.push((false, rest));
    }
    out
}

/// True when the template is one placeholder joined to bare arithmetic, as in `${a}+1`.
fn is_arithmetic_around_one_placeholder(parts: &[(bool, &str)]) -> bool {
    let placeholders = parts.iter().filter(|(is_expr, _)| *is_expr).count();
    let literals: Vec<&str> = parts
        .iter()
        .filter(|(is_expr, _)| !*is_expr)
        .map(|(_, text)| *text)
        .collect();
    placeholders == 1
        && literals.iter().any(|text| text.chars().any(|c| "+-*/%".contains(c)))
        && literals.iter().all(|text| {
            text.chars()
                .all(|c| c.is_ascii_digit() || c.is_whitespace() || "+-*/%().".contains(c))
        })
}

/// Renders a field value containing `${...}` placeholders.
///
/// A single placeholder surrounded only by arithmetic (`${a}+1`) is evaluated as one
/// expression. Anything else substitutes each placeholder in place and keeps the literal text,
/// so `${year}-${seq}` stays a dash-joined string.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let parts = segments(template);
    if is_arithmetic_around_one_placeholder(&parts) {
        let whole: String = parts
            .iter()
            .map(|(is_expr, text)| if *is_expr { format!("({})", text) } else { text.to_string() })
            .collect();
        return evaluate(&whole, vars);
    }

    let mut out = String::with_capacity(template.len());
    for (is_expr, text) in parts {
        if is_expr {
            out.push_str(&evaluate(text, vars)?);
        } else {
            out.push_str(text);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn whole_value_arithmetic() {
        assert_eq!(render("${a}+1", &vars(&[("a", "1")])).unwrap(), "2");
        assert_eq!(render("${a * 2} - 1", &vars(&[("a", "2.5")])).unwrap(), "4");
        assert_eq!(render("${-(a % 4)}", &vars(&[("a", "10")])).unwrap(), "-2");
    }

    #[test]
    fn undefined_variable_is_an_error() {
        assert!(render("${a}+1", &vars(&[])).is_err());
    }

    #[test]
    fn template_substitution_keeps_literal_text() {
        let v = vars(&[("id", "R-7"), ("agency", " sec ")]);
        assert_eq!(render("Docket ${id}: filed", &v).unwrap(), "Docket R-7: filed");
        assert_eq!(render("${upper(trim(agency))} release", &v).unwrap(), "SEC release");
    }

    #[test]
    fn joined_placeholders_keep_their_separator() {
        let v = vars(&[("year", "2024"), ("seq", "15")]);
        assert_eq!(render("${year}-${seq}", &v).unwrap(), "2024-15");
        assert_eq!(render("${year}/${seq}", &v).unwrap(), "2024/15");
    }

    #[test]
    fn literal_words_are_not_parsed_as_code() {
        let v = vars(&[("x", "abc")]);
        assert_eq!(render("upper ${x}", &v).unwrap(), "upper abc");
        assert_eq!(render("trim (${x})", &v).unwrap(), "trim (abc)");
    }

    #[test]
    fn plus_concatenates_non_numbers() {
        let v = vars(&[("base", "https://x.test/"), ("path", "a")]);
        assert_eq!(render("${base + path + '.html'}", &v).unwrap(), "https://x.test/a.html");
    }

    #[test]
    fn arbitrary_code_is_rejected() {
        let v = vars(&[("a", "1")]);
        assert!(evaluate("process.exit(1)", &v).is_err());
        assert!(evaluate("a; a", &v).is_err());
        assert!(evaluate("a - 'x'", &v).is_err());
        assert!(evaluate("1 / 0", &v).is_err());
    }

    #[test]
    fn placeholder_detection() {
        assert!(has_placeholder("x ${y}"));
        assert!(!has_placeholder("x ${y"));
        assert!(!has_placeholder("$100"));
    }
}
