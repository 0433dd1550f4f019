//! Safe assertion expressions
//!
//! A tiny expression language evaluated against the deliverable, bound to
//! the single identifier `output`. The grammar is a whitelist: arithmetic,
//! comparison, boolean logic, membership, subscripting, list literals, and
//! calls to a fixed set of pure functions. There is no attribute access, no
//! assignment, no lambdas, and no way to reach anything outside the
//! expression. Any construct outside the whitelist fails with
//! [`ExprError::Unsupported`].
//!
//! ```text
//! len(output) >= 3 and output[0]["score"] > 0.5
//! sum(output["values"]) == 10
//! "done" in str(output)
//! ```

use serde_json::{json, Value};
use std::fmt;

pub const FUNCTION_WHITELIST: &[&str] = &[
    "len", "abs", "min", "max", "sum", "any", "all", "sorted", "range", "str", "int", "float",
    "bool",
];

/// Upper bound on values produced by range(), to keep evaluation cheap.
const MAX_RANGE_LEN: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    /// The expression uses a construct outside the whitelist.
    Unsupported,
    /// The expression is well-formed but failed to evaluate.
    Eval(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::Unsupported => f.write_str("unsupported"),
            ExprError::Eval(msg) => write!(f, "evaluation error: {}", msg),
        }
    }
}

/// Evaluate an assertion expression against `output`, returning its
/// truthiness.
pub fn evaluate(expression: &str, output: &Value) -> Result<bool, ExprError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(ExprError::Unsupported);
    }
    let value = eval(&ast, output)?;
    Ok(truthy(&value))
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&esc) => s.push(esc),
                                None => return Err(ExprError::Unsupported),
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(ExprError::Unsupported),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| ExprError::Unsupported)?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            // Attribute access, lambdas, comprehensions and everything else
            // land here.
            _ => return Err(ExprError::Unsupported),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser (precedence climbing)
// ============================================================================

#[derive(Debug, Clone)]
enum Ast {
    Literal(Value),
    Output,
    List(Vec<Ast>),
    Not(Box<Ast>),
    Neg(Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
    Index(Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn binding_power(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::In
        | BinOp::NotIn => 4,
        BinOp::Add | BinOp::Sub => 5,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: &Token) -> Result<(), ExprError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ExprError::Unsupported)
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_unary()?;

        loop {
            let Some(op) = self.peek_binop() else { break };
            let bp = binding_power(op);
            if bp < min_bp {
                break;
            }
            self.consume_binop(op);
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        match self.peek()? {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            Token::Percent => Some(BinOp::Mod),
            Token::Eq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Lt => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Gt => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            Token::Ident(word) => match word.as_str() {
                "and" => Some(BinOp::And),
                "or" => Some(BinOp::Or),
                "in" => Some(BinOp::In),
                "not" if matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(w)) if w == "in") => {
                    Some(BinOp::NotIn)
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn consume_binop(&mut self, op: BinOp) {
        self.pos += if op == BinOp::NotIn { 2 } else { 1 };
    }

    fn parse_unary(&mut self) -> Result<Ast, ExprError> {
        match self.peek() {
            Some(Token::Ident(word)) if word == "not" => {
                self.pos += 1;
                // `not` binds looser than comparisons, like Python.
                let inner = self.parse_expr(3)?;
                Ok(Ast::Not(Box::new(inner)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(Ast::Neg(Box::new(inner)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Ast, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr(0)?;
                    self.expect(&Token::RBracket)?;
                    expr = Ast::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Ast, ExprError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Ast::Literal(number(n))),
            Some(Token::Str(s)) => Ok(Ast::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Ast::List(items));
                }
                loop {
                    items.push(self.parse_expr(0)?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(ExprError::Unsupported),
                    }
                }
                Ok(Ast::List(items))
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "output" => Ok(Ast::Output),
                "true" | "True" => Ok(Ast::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Ast::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Ast::Literal(Value::Null)),
                name if FUNCTION_WHITELIST.contains(&name) => {
                    self.expect(&Token::LParen)?;
                    let mut args = Vec::new();
                    if self.peek() == Some(&Token::RParen) {
                        self.pos += 1;
                    } else {
                        loop {
                            args.push(self.parse_expr(0)?);
                            match self.advance() {
                                Some(Token::Comma) => continue,
                                Some(Token::RParen) => break,
                                _ => return Err(ExprError::Unsupported),
                            }
                        }
                    }
                    Ok(Ast::Call(name.to_string(), args))
                }
                // Unknown identifiers (or known ones used as bare values)
                // are outside the whitelist.
                _ => Err(ExprError::Unsupported),
            },
            _ => Err(ExprError::Unsupported),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

fn eval(ast: &Ast, output: &Value) -> Result<Value, ExprError> {
    match ast {
        Ast::Literal(v) => Ok(v.clone()),
        Ast::Output => Ok(output.clone()),
        Ast::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, output)?);
            }
            Ok(Value::Array(values))
        }
        Ast::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, output)?))),
        Ast::Neg(inner) => {
            let n = as_number(&eval(inner, output)?)?;
            Ok(number(-n))
        }
        Ast::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, output),
        Ast::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, output)?);
            }
            call_function(name, &values)
        }
        Ast::Index(target, index) => {
            let target = eval(target, output)?;
            let index = eval(index, output)?;
            index_value(&target, &index)
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Ast, rhs: &Ast, output: &Value) -> Result<Value, ExprError> {
    // Short-circuit the boolean operators.
    match op {
        BinOp::And => {
            let left = eval(lhs, output)?;
            if !truthy(&left) {
                return Ok(left);
            }
            return eval(rhs, output);
        }
        BinOp::Or => {
            let left = eval(lhs, output)?;
            if truthy(&left) {
                return Ok(left);
            }
            return eval(rhs, output);
        }
        _ => {}
    }

    let left = eval(lhs, output)?;
    let right = eval(rhs, output)?;

    let result = match op {
        BinOp::Eq => Value::Bool(values_equal(&left, &right)),
        BinOp::Ne => Value::Bool(!values_equal(&left, &right)),
        BinOp::Lt => Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Less),
        BinOp::Le => Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Greater),
        BinOp::Gt => Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Greater),
        BinOp::Ge => Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Less),
        BinOp::In => Value::Bool(contains(&right, &left)?),
        BinOp::NotIn => Value::Bool(!contains(&right, &left)?),
        BinOp::Add => match (&left, &right) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{}{}", a, b)),
            _ => number(as_number(&left)? + as_number(&right)?),
        },
        BinOp::Sub => number(as_number(&left)? - as_number(&right)?),
        BinOp::Mul => number(as_number(&left)? * as_number(&right)?),
        BinOp::Div => {
            let divisor = as_number(&right)?;
            if divisor == 0.0 {
                return Err(ExprError::Eval("division by zero".into()));
            }
            number(as_number(&left)? / divisor)
        }
        BinOp::Mod => {
            let divisor = as_number(&right)?;
            if divisor == 0.0 {
                return Err(ExprError::Eval("modulo by zero".into()));
            }
            number(as_number(&left)? % divisor)
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(result)
}

fn call_function(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExprError::Eval(format!("{} expects {} argument(s)", name, expected)))
        }
    };

    match name {
        "len" => {
            arity(1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err(ExprError::Eval("len() target has no length".into())),
            };
            Ok(number(len as f64))
        }
        "abs" => {
            arity(1)?;
            Ok(number(as_number(&args[0])?.abs()))
        }
        "min" | "max" => {
            let items: Vec<Value> = if args.len() == 1 {
                match &args[0] {
                    Value::Array(a) => a.clone(),
                    _ => return Err(ExprError::Eval(format!("{}() of non-sequence", name))),
                }
            } else {
                args.to_vec()
            };
            if items.is_empty() {
                return Err(ExprError::Eval(format!("{}() of empty sequence", name)));
            }
            let mut best = items[0].clone();
            for item in &items[1..] {
                let ord = compare(item, &best)?;
                let take = if name == "min" {
                    ord == std::cmp::Ordering::Less
                } else {
                    ord == std::cmp::Ordering::Greater
                };
                if take {
                    best = item.clone();
                }
            }
            Ok(best)
        }
        "sum" => {
            arity(1)?;
            let Value::Array(items) = &args[0] else {
                return Err(ExprError::Eval("sum() of non-sequence".into()));
            };
            let mut total = 0.0;
            for item in items {
                total += as_number(item)?;
            }
            Ok(number(total))
        }
        "any" | "all" => {
            arity(1)?;
            let Value::Array(items) = &args[0] else {
                return Err(ExprError::Eval(format!("{}() of non-sequence", name)));
            };
            let result = if name == "any" {
                items.iter().any(truthy)
            } else {
                items.iter().all(truthy)
            };
            Ok(Value::Bool(result))
        }
        "sorted" => {
            arity(1)?;
            let Value::Array(items) = &args[0] else {
                return Err(ExprError::Eval("sorted() of non-sequence".into()));
            };
            let mut sorted = items.clone();
            let mut err = None;
            sorted.sort_by(|a, b| match compare(a, b) {
                Ok(ord) => ord,
                Err(e) => {
                    err.get_or_insert(e);
                    std::cmp::Ordering::Equal
                }
            });
            match err {
                Some(e) => Err(e),
                None => Ok(Value::Array(sorted)),
            }
        }
        "range" => {
            let (start, stop) = match args.len() {
                1 => (0.0, as_number(&args[0])?),
                2 => (as_number(&args[0])?, as_number(&args[1])?),
                _ => return Err(ExprError::Eval("range() expects 1 or 2 arguments".into())),
            };
            if stop - start > MAX_RANGE_LEN {
                return Err(ExprError::Eval("range() too large".into()));
            }
            let mut items = Vec::new();
            let mut i = start;
            while i < stop {
                items.push(number(i));
                i += 1.0;
            }
            Ok(Value::Array(items))
        }
        "str" => {
            arity(1)?;
            Ok(Value::String(stringify(&args[0])))
        }
        "int" => {
            arity(1)?;
            let n = match &args[0] {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ExprError::Eval("int() of non-numeric string".into()))?,
                other => as_number(other)?,
            };
            Ok(number(n.trunc()))
        }
        "float" => {
            arity(1)?;
            let n = match &args[0] {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ExprError::Eval("float() of non-numeric string".into()))?,
                other => as_number(other)?,
            };
            Ok(json!(n))
        }
        "bool" => {
            arity(1)?;
            Ok(Value::Bool(truthy(&args[0])))
        }
        _ => Err(ExprError::Unsupported),
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Represent a float as a JSON integer when it is integral.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        json!(n)
    }
}

fn as_number(v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExprError::Eval("number out of range".into())),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(ExprError::Eval("expected a number".into())),
    }
}

pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExprError> {
    if let (Ok(x), Ok(y)) = (as_number(a), as_number(b)) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| ExprError::Eval("incomparable numbers".into()));
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(ExprError::Eval("incomparable values".into())),
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, ExprError> {
    match container {
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Err(ExprError::Eval("'in' on string expects a string".into())),
        },
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        _ => Err(ExprError::Eval("'in' expects a container".into())),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Array(items), idx) => {
            let i = as_number(idx)? as i64;
            let len = items.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ExprError::Eval("list index out of range".into()));
            }
            Ok(items[resolved as usize].clone())
        }
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::Eval(format!("key not found: {}", key))),
        (Value::String(s), idx) => {
            let i = as_number(idx)? as i64;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ExprError::Eval("string index out of range".into()));
            }
            Ok(Value::String(chars[resolved as usize].to_string()))
        }
        _ => Err(ExprError::Eval("value is not subscriptable".into())),
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(expr: &str, output: Value) -> Result<bool, ExprError> {
        evaluate(expr, &output)
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(check("1 + 2 * 3 == 7", json!(null)), Ok(true));
        assert_eq!(check("(1 + 2) * 3 == 9", json!(null)), Ok(true));
        assert_eq!(check("10 / 4 > 2", json!(null)), Ok(true));
        assert_eq!(check("10 % 3 == 1", json!(null)), Ok(true));
        assert_eq!(check("-5 < 0", json!(null)), Ok(true));
    }

    #[test]
    fn output_binding_and_subscript() {
        let output = json!({"items": [1, 2, 3], "name": "report"});
        assert_eq!(check("len(output[\"items\"]) == 3", output.clone()), Ok(true));
        assert_eq!(check("output[\"items\"][0] == 1", output.clone()), Ok(true));
        assert_eq!(check("output[\"items\"][-1] == 3", output.clone()), Ok(true));
        assert_eq!(check("output[\"name\"] == 'report'", output), Ok(true));
    }

    #[test]
    fn membership() {
        assert_eq!(check("2 in output", json!([1, 2, 3])), Ok(true));
        assert_eq!(check("5 in output", json!([1, 2, 3])), Ok(false));
        assert_eq!(check("5 not in output", json!([1, 2, 3])), Ok(true));
        assert_eq!(check("\"ell\" in output", json!("hello")), Ok(true));
        assert_eq!(check("\"k\" in output", json!({"k": 1})), Ok(true));
    }

    #[test]
    fn boolean_logic_short_circuits() {
        assert_eq!(check("true and false", json!(null)), Ok(false));
        assert_eq!(check("true or false", json!(null)), Ok(true));
        assert_eq!(check("not false", json!(null)), Ok(true));
        // The rhs would error, but the lhs decides first.
        assert_eq!(check("false and (1 / 0)", json!(null)), Ok(false));
        assert_eq!(check("true or (1 / 0)", json!(null)), Ok(true));
    }

    #[test]
    fn whitelisted_functions() {
        assert_eq!(check("sum(output) == 6", json!([1, 2, 3])), Ok(true));
        assert_eq!(check("min(output) == 1 and max(output) == 3", json!([1, 2, 3])), Ok(true));
        assert_eq!(check("any([false, true])", json!(null)), Ok(true));
        assert_eq!(check("all([true, true])", json!(null)), Ok(true));
        assert_eq!(check("sorted(output) == [1, 2, 3]", json!([3, 1, 2])), Ok(true));
        assert_eq!(check("len(range(5)) == 5", json!(null)), Ok(true));
        assert_eq!(check("abs(-4) == 4", json!(null)), Ok(true));
        assert_eq!(check("int(\"42\") == 42", json!(null)), Ok(true));
        assert_eq!(check("float(1) == 1.0", json!(null)), Ok(true));
        assert_eq!(check("bool([]) == false", json!(null)), Ok(true));
        assert_eq!(check("\"4\" in str(output)", json!({"n": 42})), Ok(true));
    }

    #[test]
    fn disallowed_constructs_are_unsupported() {
        // Attribute access
        assert_eq!(check("output.field", json!({})), Err(ExprError::Unsupported));
        // Unknown identifiers
        assert_eq!(check("import_os", json!(null)), Err(ExprError::Unsupported));
        assert_eq!(check("open('/etc/passwd')", json!(null)), Err(ExprError::Unsupported));
        assert_eq!(check("__import__('os')", json!(null)), Err(ExprError::Unsupported));
        // Lambdas and comprehensions never parse.
        assert_eq!(check("lambda x: x", json!(null)), Err(ExprError::Unsupported));
        assert_eq!(
            check("[x for x in output]", json!([1])),
            Err(ExprError::Unsupported)
        );
        // Assignment
        assert_eq!(check("x = 1", json!(null)), Err(ExprError::Unsupported));
    }

    #[test]
    fn runtime_errors_are_eval_errors() {
        assert!(matches!(check("1 / 0", json!(null)), Err(ExprError::Eval(_))));
        assert!(matches!(check("output[10]", json!([1])), Err(ExprError::Eval(_))));
        assert!(matches!(check("len(5)", json!(null)), Err(ExprError::Eval(_))));
        assert!(matches!(
            check("range(1000000)", json!(null)),
            Err(ExprError::Eval(_))
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert_eq!(check("1 == 1 extra", json!(null)), Err(ExprError::Unsupported));
    }
}
