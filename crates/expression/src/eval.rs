//! The restricted expression language.
//!
//! Used by `if` conditions (`"a > 10 && status == 'open'"`) and by the
//! `code` handler. The grammar is deliberately small: literals, dotted
//! member access into the input, arithmetic, comparison, boolean operators
//! with short-circuit, and a handful of builtins (`if`, `len`, `contains`,
//! `str`, `num`, `fail`). There is no assignment, no loops, and no access
//! to anything outside the data the expression is evaluated against.

use conflux_core::value::{lookup_path, render, truthy};
use serde_json::Value;
use thiserror::Error;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The expression text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// An operand had an unusable type for the operator.
    #[error("type error: {0}")]
    Type(String),

    /// A call referenced a builtin that does not exist.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// A builtin was called with the wrong number of arguments.
    #[error("function `{name}` expects {expected} argument(s)")]
    Arity {
        /// Function name.
        name: String,
        /// Expected argument count.
        expected: usize,
    },

    /// The expression called `fail(...)` — a deliberate handler failure.
    #[error("{0}")]
    Failed(String),
}

/// Evaluate an expression against the given data.
pub fn evaluate(expr: &str, data: &Value) -> Result<Value, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;
    eval_node(&ast, data)
}

/// Evaluate an expression and reduce the result to a boolean using loose
/// truthiness.
pub fn evaluate_bool(expr: &str, data: &Value) -> Result<bool, EvalError> {
    Ok(truthy(&evaluate(expr, data)?))
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        // A digit followed by `.` then a non-digit is member
                        // access on a number literal, which we do not support;
                        // treat the dot as a separate token in that case.
                        if d == '.' {
                            let mut ahead = chars.clone();
                            ahead.next();
                            if !ahead.peek().is_some_and(char::is_ascii_digit) {
                                break;
                            }
                        }
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| EvalError::Parse(format!("bad number `{text}`")))?;
                tokens.push(Token::Num(value));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(d) = chars.next() {
                    if d == quote {
                        closed = true;
                        break;
                    }
                    if d == '\\' {
                        match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        }
                    } else {
                        text.push(d);
                    }
                }
                if !closed {
                    return Err(EvalError::Parse("unterminated string".to_string()));
                }
                tokens.push(Token::Str(text));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut word = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        word.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(EvalError::Parse("single `=` is not an operator".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(EvalError::Parse("single `&` is not an operator".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::OrOr);
                } else {
                    return Err(EvalError::Parse("single `|` is not an operator".to_string()));
                }
            }
            other => {
                return Err(EvalError::Parse(format!("unexpected character `{other}`")));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Path(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), EvalError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(EvalError::Parse(format!(
                "expected {token:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn expect_end(&self) -> Result<(), EvalError> {
        match self.peek() {
            None => Ok(()),
            Some(extra) => Err(EvalError::Parse(format!("trailing token {extra:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Lit(num_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::True) => Ok(Expr::Lit(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Lit(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Lit(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(first)) => {
                // `name(` is a builtin call; `a.b.c` is member access.
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(&Token::RParen)?;
                            break;
                        }
                    }
                    return Ok(Expr::Call(first, args));
                }
                let mut path = first;
                while self.eat(&Token::Dot) {
                    match self.next() {
                        Some(Token::Ident(segment)) => {
                            path.push('.');
                            path.push_str(&segment);
                        }
                        other => {
                            return Err(EvalError::Parse(format!(
                                "expected identifier after `.`, found {other:?}"
                            )));
                        }
                    }
                }
                Ok(Expr::Path(path))
            }
            other => Err(EvalError::Parse(format!("unexpected token {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator

fn eval_node(expr: &Expr, data: &Value) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Path(path) => Ok(lookup_path(data, path).cloned().unwrap_or(Value::Null)),
        Expr::Unary(op, inner) => {
            let value = eval_node(inner, data)?;
            match op {
                UnOp::Neg => Ok(num_value(-as_number(&value)?)),
                UnOp::Not => Ok(Value::Bool(!truthy(&value))),
            }
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, data),
        Expr::Call(name, args) => eval_call(name, args, data),
    }
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, data: &Value) -> Result<Value, EvalError> {
    // Boolean operators short-circuit; everything else is strict.
    match op {
        BinOp::And => {
            let l = eval_node(left, data)?;
            if !truthy(&l) {
                return Ok(Value::Bool(false));
            }
            let r = eval_node(right, data)?;
            return Ok(Value::Bool(truthy(&r)));
        }
        BinOp::Or => {
            let l = eval_node(left, data)?;
            if truthy(&l) {
                return Ok(Value::Bool(true));
            }
            let r = eval_node(right, data)?;
            return Ok(Value::Bool(truthy(&r)));
        }
        _ => {}
    }

    let l = eval_node(left, data)?;
    let r = eval_node(right, data)?;

    match op {
        BinOp::Add => {
            // String concatenation when either side is a string.
            if l.is_string() || r.is_string() {
                Ok(Value::String(format!("{}{}", render(&l), render(&r))))
            } else {
                Ok(num_value(as_number(&l)? + as_number(&r)?))
            }
        }
        BinOp::Sub => Ok(num_value(as_number(&l)? - as_number(&r)?)),
        BinOp::Mul => Ok(num_value(as_number(&l)? * as_number(&r)?)),
        BinOp::Div => {
            let divisor = as_number(&r)?;
            if divisor == 0.0 {
                return Err(EvalError::Type("division by zero".to_string()));
            }
            Ok(num_value(as_number(&l)? / divisor))
        }
        BinOp::Rem => {
            let divisor = as_number(&r)?;
            if divisor == 0.0 {
                return Err(EvalError::Type("division by zero".to_string()));
            }
            Ok(num_value(as_number(&l)? % divisor))
        }
        BinOp::Gt => compare(&l, &r).map(|ord| Value::Bool(ord == std::cmp::Ordering::Greater)),
        BinOp::Ge => compare(&l, &r).map(|ord| Value::Bool(ord != std::cmp::Ordering::Less)),
        BinOp::Lt => compare(&l, &r).map(|ord| Value::Bool(ord == std::cmp::Ordering::Less)),
        BinOp::Le => compare(&l, &r).map(|ord| Value::Bool(ord != std::cmp::Ordering::Greater)),
        BinOp::Eq => Ok(Value::Bool(loose_eq(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&l, &r))),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn eval_call(name: &str, args: &[Expr], data: &Value) -> Result<Value, EvalError> {
    let arity = |expected: usize| -> Result<(), EvalError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: name.to_string(),
                expected,
            })
        }
    };

    match name {
        // Lazy conditional: only the taken branch is evaluated.
        "if" => {
            arity(3)?;
            let cond = eval_node(&args[0], data)?;
            if truthy(&cond) {
                eval_node(&args[1], data)
            } else {
                eval_node(&args[2], data)
            }
        }
        "len" => {
            arity(1)?;
            let value = eval_node(&args[0], data)?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                other => {
                    return Err(EvalError::Type(format!("len() of {other}")));
                }
            };
            Ok(Value::Number(serde_json::Number::from(len as u64)))
        }
        "contains" => {
            arity(2)?;
            let hay = eval_node(&args[0], data)?;
            let needle = eval_node(&args[1], data)?;
            let found = match &hay {
                Value::String(s) => s.contains(&render(&needle)),
                Value::Array(items) => items.iter().any(|item| loose_eq(item, &needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "str" => {
            arity(1)?;
            Ok(Value::String(render(&eval_node(&args[0], data)?)))
        }
        "num" => {
            arity(1)?;
            Ok(num_value(as_number(&eval_node(&args[0], data)?)?))
        }
        "fail" => {
            arity(1)?;
            Err(EvalError::Failed(render(&eval_node(&args[0], data)?)))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// Numeric coercion: JSON numbers directly, numeric strings by parsing.
fn as_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EvalError::Type("non-finite number".to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| EvalError::Type(format!("`{s}` is not a number"))),
        other => Err(EvalError::Type(format!("{other} is not a number"))),
    }
}

fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering, EvalError> {
    if let (Ok(a), Ok(b)) = (as_number(l), as_number(r)) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| EvalError::Type("incomparable numbers".to_string()));
    }
    Ok(render(l).cmp(&render(r)))
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    if let (Ok(a), Ok(b)) = (as_number(l), as_number(r)) {
        return a == b;
    }
    l == r
}

/// Build a JSON number, preferring the integer form when exact.
fn num_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Number(serde_json::Number::from(f as i64))
    } else {
        serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("1 + 2 * 3", json!(7))]
    #[case("(1 + 2) * 3", json!(9))]
    #[case("10 / 4", json!(2.5))]
    #[case("7 % 3", json!(1))]
    #[case("-5 + 2", json!(-3))]
    #[case("'a' + 'b'", json!("ab"))]
    #[case("'n=' + 3", json!("n=3"))]
    fn arithmetic(#[case] expr: &str, #[case] expected: Value) {
        assert_eq!(evaluate(expr, &json!({})).unwrap(), expected);
    }

    #[rstest]
    #[case("a > 10", json!({"a": 5}), false)]
    #[case("a > 10", json!({"a": 11}), true)]
    #[case("a >= 10 && a <= 20", json!({"a": 10}), true)]
    #[case("a == 'open' || a == 'new'", json!({"a": "new"}), true)]
    #[case("!done", json!({"done": false}), true)]
    #[case("a != b", json!({"a": 1, "b": 2}), true)]
    #[case("'5' == 5", json!({}), true)]
    fn conditions(#[case] expr: &str, #[case] data: Value, #[case] expected: bool) {
        assert_eq!(evaluate_bool(expr, &data).unwrap(), expected);
    }

    #[test]
    fn dotted_member_access() {
        let data = json!({"order": {"total": 99.5, "lines": [1, 2, 3]}});
        assert_eq!(evaluate("order.total", &data).unwrap(), json!(99.5));
        assert_eq!(evaluate("len(order.lines)", &data).unwrap(), json!(3));
        assert_eq!(evaluate("order.missing", &data).unwrap(), Value::Null);
    }

    #[test]
    fn short_circuit_avoids_rhs_failure() {
        // The right side would fail(); short-circuit must skip it.
        let out = evaluate("false && fail('boom')", &json!({})).unwrap();
        assert_eq!(out, json!(false));
        let out = evaluate("true || fail('boom')", &json!({})).unwrap();
        assert_eq!(out, json!(true));
    }

    #[test]
    fn if_builtin_is_lazy() {
        let data = json!({"item": 3});
        let out = evaluate("if(item == 5, fail('item==5'), item * 2)", &data).unwrap();
        assert_eq!(out, json!(6));

        let err = evaluate("if(item == 5, fail('item==5'), item * 2)", &json!({"item": 5}))
            .unwrap_err();
        assert!(matches!(err, EvalError::Failed(msg) if msg == "item==5"));
    }

    #[test]
    fn contains_builtin() {
        let data = json!({"tags": ["a", "b"], "text": "hello world"});
        assert_eq!(evaluate("contains(tags, 'a')", &data).unwrap(), json!(true));
        assert_eq!(evaluate("contains(tags, 'z')", &data).unwrap(), json!(false));
        assert_eq!(
            evaluate("contains(text, 'world')", &data).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(evaluate("str(12)", &json!({})).unwrap(), json!("12"));
        assert_eq!(evaluate("num('12.5')", &json!({})).unwrap(), json!(12.5));
        assert!(evaluate("num('abc')", &json!({})).is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            evaluate("1 / 0", &json!({})),
            Err(EvalError::Type(_))
        ));
    }

    #[rstest]
    #[case("1 +")]
    #[case("(1")]
    #[case("a = 1")]
    #[case("a & b")]
    #[case("1 2")]
    #[case("'unterminated")]
    fn parse_errors(#[case] expr: &str) {
        assert!(matches!(
            evaluate(expr, &json!({})),
            Err(EvalError::Parse(_))
        ));
    }

    #[test]
    fn unknown_function() {
        assert!(matches!(
            evaluate("nope(1)", &json!({})),
            Err(EvalError::UnknownFunction(_))
        ));
    }
}
