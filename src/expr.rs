//! A small, closed expression language over JSON-like values.
//!
//! Rule functions and the dataset filter both need a user-written expression
//! evaluated against one input: the parsed content of a structured sidecar,
//! or the text of a quick label. The input is bound to the single variable
//! `x`; nothing else in the host is reachable.
//!
//! ## Syntax
//!
//! ```text
//! x.caption                     field access
//! x["weird key"]  x.tags[0]     key / index access (negative indices count from the end)
//! x.tags[-1]
//! 1 + 2 * 3   x.w / x.h   7 % 3 arithmetic
//! "a" + x.name                  string / list concatenation
//! == != < <= > >=               comparison
//! "cat" in x.tags               membership (substring, element, key)
//! "cat" not in x.tags
//! and or not   && || !          boolean logic (short-circuit, Python-style operands)
//! len(x.tags)  x.strip()        function call, or method call on the left operand
//! [1, 2, x.a]                   list literal
//! true false null  True False None  42 1.5 'text' "text"
//! ```
//!
//! ## Functions
//!
//! `len`, `str`, `int`, `float`, `bool`, `lower`, `upper`, `strip`/`trim`,
//! `lstrip`, `rstrip`, `startswith`/`starts_with`, `endswith`/`ends_with`,
//! `contains`, `split`, `lines`, `keys`, `values`, `get`, `abs`, `min`, `max`.
//!
//! Any failure (unknown key, type mismatch, division by zero) is an
//! [`ExprError`]; callers decide how to degrade.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Name of the single bound variable.
pub const VAR_NAME: &str = "x";

const FUNCTIONS: &[&str] = &[
    "len", "str", "bool", "int", "float", "lower", "upper", "strip", "trim", "lstrip", "rstrip",
    "startswith", "starts_with", "endswith", "ends_with", "contains", "split", "lines", "keys",
    "values", "get", "abs", "min", "max",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("Unknown name: {0}")]
    UnknownName(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Wrong number of arguments for {0}")]
    Arity(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Missing key: {0}")]
    MissingKey(String),
    #[error("Index out of range: {0}")]
    IndexOutOfRange(i64),
    #[error("Division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var,
    List(Vec<Expr>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        match parser.peek() {
            Token::End => Ok(expr),
            other => Err(parser.error(format!("unexpected {}", other.describe()))),
        }
    }

    /// Evaluate with `x` bound to `input`.
    pub fn evaluate(&self, input: &Value) -> Result<Value, ExprError> {
        eval(self, input)
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, input: &Value) -> Result<Value, ExprError> {
    Expr::parse(source)?.evaluate(input)
}

/// Display form of a result: strings verbatim, `null` as `null`, everything
/// else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Python-style truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are
/// false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {n}"),
            Token::Float(f) => format!("number {f}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Ident(s) => format!("name {s:?}"),
            Token::Sym(s) => format!("'{s}'"),
            Token::End => "end of input".to_string(),
        }
    }
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")", "[",
    "]", ",", ".",
];

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| syntax(pos, "bad number"))?)
            } else {
                Token::Int(text.parse().map_err(|_| syntax(pos, "number too large"))?)
            };
            tokens.push((token, pos));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            tokens.push((Token::Ident(text), pos));
        } else if c == '"' || c == '\'' {
            i += 1;
            let mut text = String::new();
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(syntax(pos, "unterminated string"));
                };
                i += 1;
                if ch == c {
                    break;
                }
                if ch == '\\' {
                    let Some(&(_, esc)) = chars.get(i) else {
                        return Err(syntax(pos, "unterminated string"));
                    };
                    i += 1;
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                } else {
                    text.push(ch);
                }
            }
            tokens.push((Token::Str(text), pos));
        } else {
            let rest = &source[pos..];
            let Some(sym) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) else {
                return Err(syntax(pos, &format!("unexpected character {c:?}")));
            };
            tokens.push((Token::Sym(*sym), pos));
            i += sym.chars().count();
        }
    }
    tokens.push((Token::End, source.len()));
    Ok(tokens)
}

fn check_function(name: &str) -> Result<(), ExprError> {
    if FUNCTIONS.contains(&name) {
        Ok(())
    } else {
        Err(ExprError::UnknownFunction(name.to_string()))
    }
}

fn syntax(pos: usize, msg: &str) -> ExprError {
    ExprError::Syntax {
        pos,
        msg: msg.to_string(),
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, msg: String) -> ExprError {
        ExprError::Syntax {
            pos: self.tokens[self.pos].1,
            msg,
        }
    }

    fn is_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Token::Sym(s) if *s == sym)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == word)
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.is_sym(sym) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{sym}', found {}", self.peek().describe())))
        }
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and()?;
        while self.is_keyword("or") || self.is_sym("||") {
            self.advance();
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.not()?;
        while self.is_keyword("and") || self.is_sym("&&") {
            self.advance();
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.is_keyword("not") || self.is_sym("!") {
            self.advance();
            let operand = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.additive()?;
        let (op, width) = match self.peek() {
            Token::Sym("==") => (BinaryOp::Eq, 1),
            Token::Sym("!=") => (BinaryOp::Ne, 1),
            Token::Sym("<") => (BinaryOp::Lt, 1),
            Token::Sym("<=") => (BinaryOp::Le, 1),
            Token::Sym(">") => (BinaryOp::Gt, 1),
            Token::Sym(">=") => (BinaryOp::Ge, 1),
            Token::Ident(s) if s == "in" => (BinaryOp::In, 1),
            Token::Ident(s)
                if s == "not" && matches!(self.peek_at(1), Token::Ident(n) if n == "in") =>
            {
                (BinaryOp::NotIn, 2)
            }
            _ => return Ok(left),
        };
        for _ in 0..width {
            self.advance();
        }
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Sym("+") => BinaryOp::Add,
                Token::Sym("-") => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Sym("*") => BinaryOp::Mul,
                Token::Sym("/") => BinaryOp::Div,
                Token::Sym("%") => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.is_sym("-") {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.is_sym(".") {
                self.advance();
                let Token::Ident(name) = self.advance() else {
                    return Err(self.error("expected a name after '.'".to_string()));
                };
                if self.is_sym("(") {
                    check_function(&name)?;
                    let mut args = vec![expr];
                    args.extend(self.arguments()?);
                    expr = Expr::Call(name, args);
                } else {
                    expr = Expr::Field(Box::new(expr), name);
                }
            } else if self.is_sym("[") {
                self.advance();
                let index = self.expression()?;
                self.expect_sym("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Parenthesized, comma-separated call arguments.
    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect_sym("(")?;
        self.sequence(")")
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.is_sym(close) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.is_sym(",") {
                self.advance();
                if self.is_sym(close) {
                    self.advance();
                    return Ok(items);
                }
            } else {
                self.expect_sym(close)?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let start = self.pos;
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => Ok(Expr::Literal(float_value(f)?)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Sym("(") => {
                let inner = self.expression()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Token::Sym("[") => Ok(Expr::List(self.sequence("]")?)),
            Token::Ident(name) => {
                if self.is_sym("(") {
                    check_function(&name)?;
                    let args = self.arguments()?;
                    return Ok(Expr::Call(name, args));
                }
                match name.as_str() {
                    VAR_NAME => Ok(Expr::Var),
                    "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" | "None" => Ok(Expr::Literal(Value::Null)),
                    _ => Err(ExprError::UnknownName(name)),
                }
            }
            other => {
                self.pos = start;
                Err(self.error(format!("unexpected {}", other.describe())))
            }
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval(expr: &Expr, input: &Value) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var => Ok(input.clone()),
        Expr::List(items) => items
            .iter()
            .map(|e| eval(e, input))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Field(target, name) => match eval(target, input)? {
            Value::Object(mut map) => map
                .remove(name)
                .ok_or_else(|| ExprError::MissingKey(name.clone())),
            other => Err(type_error(&format!("cannot read field {name:?} of"), &other)),
        },
        Expr::Index(target, index) => {
            let target = eval(target, input)?;
            let index = eval(index, input)?;
            index_value(target, &index)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|e| eval(e, input))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
        Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&eval(operand, input)?))),
        Expr::Unary(UnaryOp::Neg, operand) => match eval(operand, input)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i
                    .checked_neg()
                    .map(Value::from)
                    .ok_or_else(|| ExprError::Type("integer overflow".into())),
                None => float_value(-number_f64(&n)),
            },
            other => Err(type_error("cannot negate", &other)),
        },
        Expr::And(left, right) => {
            let left = eval(left, input)?;
            if truthy(&left) { eval(right, input) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, input)?;
            if truthy(&left) { Ok(left) } else { eval(right, input) }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, input)?;
            let right = eval(right, input)?;
            binary(*op, left, right)
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Value::Bool(values_equal(&left, &right))),
        Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        Lt | Le | Gt | Ge => {
            let ordering = compare(&left, &right)?;
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        In => contains(&right, &left).map(Value::Bool),
        NotIn => contains(&right, &left).map(|b| Value::Bool(!b)),
        Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
            (a, _) => Err(type_error("cannot add to", &a)),
        },
        Sub | Mul | Div | Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b),
            (a, _) => Err(type_error("arithmetic on", &a)),
        },
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, ExprError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem => {
                if y == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                x.checked_rem(y).map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
            }
            _ => None,
        };
        if let Some(r) = result {
            return Ok(Value::from(r));
        }
    }

    let (x, y) = (number_f64(a), number_f64(b));
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x / y
        }
        BinaryOp::Rem => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x - y * (x / y).floor()
        }
        _ => unreachable!("non-arithmetic operator"),
    };
    float_value(result)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_f64(x) == number_f64(y),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExprError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_f64(x)
            .partial_cmp(&number_f64(y))
            .ok_or_else(|| ExprError::Type("unordered numbers".into())),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (x, _) => Err(type_error("cannot order", x)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ExprError> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => Ok(s.contains(n.as_str())),
            other => Err(type_error("substring test needs a string, got", other)),
        },
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(type_error("key test needs a string, got", other)),
        },
        other => Err(type_error("membership test on", other)),
    }
}

fn index_value(target: Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Object(mut map), Value::String(key)) => map
            .remove(key)
            .ok_or_else(|| ExprError::MissingKey(key.clone())),
        (Value::Array(mut items), Value::Number(n)) => {
            let i = integer_index(n)?;
            let pos = resolve_index(i, items.len())?;
            Ok(items.swap_remove(pos))
        }
        (Value::String(s), Value::Number(n)) => {
            let i = integer_index(n)?;
            let chars: Vec<char> = s.chars().collect();
            let pos = resolve_index(i, chars.len())?;
            Ok(Value::String(chars[pos].to_string()))
        }
        (target, _) => Err(type_error("cannot index", &target)),
    }
}

fn integer_index(n: &Number) -> Result<i64, ExprError> {
    n.as_i64()
        .ok_or_else(|| ExprError::Type(format!("index must be an integer, got {n}")))
}

fn resolve_index(i: i64, len: usize) -> Result<usize, ExprError> {
    let len_i = len as i64;
    let pos = if i < 0 { len_i + i } else { i };
    if pos < 0 || pos >= len_i {
        return Err(ExprError::IndexOutOfRange(i));
    }
    Ok(pos as usize)
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "len" => {
            let [v] = take::<1>(name, args)?;
            let n = match &v {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => return Err(type_error("len() of", other)),
            };
            Ok(Value::from(n as u64))
        }
        "str" => {
            let [v] = take::<1>(name, args)?;
            Ok(Value::String(render(&v)))
        }
        "bool" => {
            let [v] = take::<1>(name, args)?;
            Ok(Value::Bool(truthy(&v)))
        }
        "int" => {
            let [v] = take::<1>(name, args)?;
            match &v {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Ok(Value::from(i)),
                    None => {
                        let t = number_f64(n).trunc();
                        // i64 spans [-2^63, 2^63); NaN fails both bounds
                        if t >= i64::MIN as f64 && t < -(i64::MIN as f64) {
                            Ok(Value::from(t as i64))
                        } else {
                            Err(ExprError::Type(format!("int() of {n} is out of range")))
                        }
                    }
                },
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| ExprError::Type(format!("int() of {s:?}"))),
                Value::Bool(b) => Ok(Value::from(*b as i64)),
                other => Err(type_error("int() of", other)),
            }
        }
        "float" => {
            let [v] = take::<1>(name, args)?;
            match &v {
                Value::Number(n) => float_value(number_f64(n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ExprError::Type(format!("float() of {s:?}")))
                    .and_then(float_value),
                other => Err(type_error("float() of", other)),
            }
        }
        "lower" => string_map(name, args, |s| s.to_lowercase()),
        "upper" => string_map(name, args, |s| s.to_uppercase()),
        "strip" | "trim" => string_map(name, args, |s| s.trim().to_string()),
        "lstrip" => string_map(name, args, |s| s.trim_start().to_string()),
        "rstrip" => string_map(name, args, |s| s.trim_end().to_string()),
        "startswith" | "starts_with" => {
            let [s, prefix] = take::<2>(name, args)?;
            Ok(Value::Bool(as_str(&s)?.starts_with(as_str(&prefix)?)))
        }
        "endswith" | "ends_with" => {
            let [s, suffix] = take::<2>(name, args)?;
            Ok(Value::Bool(as_str(&s)?.ends_with(as_str(&suffix)?)))
        }
        "contains" => {
            let [haystack, needle] = take::<2>(name, args)?;
            contains(&haystack, &needle).map(Value::Bool)
        }
        "split" => {
            let parts: Vec<Value> = match args.as_slice() {
                [s] => as_str(s)?.split_whitespace().map(Value::from).collect(),
                [s, sep] => as_str(s)?.split(as_str(sep)?).map(Value::from).collect(),
                _ => return Err(ExprError::Arity(name.to_string())),
            };
            Ok(Value::Array(parts))
        }
        "lines" => {
            let [s] = take::<1>(name, args)?;
            Ok(Value::Array(as_str(&s)?.lines().map(Value::from).collect()))
        }
        "keys" => {
            let [v] = take::<1>(name, args)?;
            let map = as_object(&v)?;
            Ok(Value::Array(map.keys().cloned().map(Value::String).collect()))
        }
        "values" => {
            let [v] = take::<1>(name, args)?;
            let map = as_object(&v)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        "get" => {
            let (target, key, default) = match <[Value; 3]>::try_from(args) {
                Ok([t, k, d]) => (t, k, d),
                Err(args) => {
                    let [t, k] = take::<2>(name, args)?;
                    (t, k, Value::Null)
                }
            };
            Ok(index_value(target, &key).unwrap_or(default))
        }
        "abs" => {
            let [v] = take::<1>(name, args)?;
            match &v {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => i
                        .checked_abs()
                        .map(Value::from)
                        .ok_or_else(|| ExprError::Type("integer overflow".into())),
                    None => float_value(number_f64(n).abs()),
                },
                other => Err(type_error("abs() of", other)),
            }
        }
        "min" | "max" => {
            let single_list = args.len() == 1 && args[0].is_array();
            let items = if single_list {
                match args.into_iter().next() {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            } else {
                args
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let ord = compare(&item, &current)?;
                        let replace = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                        if replace { item } else { current }
                    }
                });
            }
            best.ok_or_else(|| ExprError::Type(format!("{name}() of an empty list")))
        }
        other => Err(ExprError::UnknownFunction(other.to_string())),
    }
}

fn take<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], ExprError> {
    <[Value; N]>::try_from(args).map_err(|_| ExprError::Arity(name.to_string()))
}

fn string_map(name: &str, args: Vec<Value>, f: impl Fn(&str) -> String) -> Result<Value, ExprError> {
    let [v] = take::<1>(name, args)?;
    Ok(Value::String(f(as_str(&v)?)))
}

fn as_str(v: &Value) -> Result<&str, ExprError> {
    v.as_str().ok_or_else(|| type_error("expected a string, got", v))
}

fn as_object(v: &Value) -> Result<&Map<String, Value>, ExprError> {
    v.as_object().ok_or_else(|| type_error("expected an object, got", v))
}

fn number_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn float_value(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("non-finite number {f}")))
}

fn type_error(what: &str, value: &Value) -> ExprError {
    ExprError::Type(format!("{what} {}", type_name(value)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
