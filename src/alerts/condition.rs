//! Safe condition expressions for alert rules
//!
//! Rules carry their trigger condition as a string so they can be loaded from
//! configuration and changed at runtime. Conditions are parsed into a small
//! tagged AST and evaluated against an allowlisted context; there is no
//! general-purpose evaluation, no I/O, and no looping construct, so a
//! condition's cost is bounded by its length.
//!
//! Grammar (loosest binding first): `||`, `&&`, comparisons
//! (`== != < <= > >=`), `+ -`, `* /`, unary `! -`, parentheses. Literals are
//! numbers, `true`/`false`, and quoted strings; `and`/`or`/`not` are accepted
//! as word operators. Identifiers are dotted paths such as `pattern.count`
//! resolved by [`ConditionContext`]; resolving an unknown path is an
//! evaluation error, which the alert engine treats as "rule not matched".

use crate::aggregator::ErrorPattern;
use crate::error::RuleError;
use crate::events::Timestamp;
use crate::trends::ErrorTrend;

/// A value produced while evaluating a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
        }
    }
}

/// The allowlisted fields a condition can reference
///
/// Built per evaluation from the pattern under test, the optional trend, and
/// the evaluating rule's window. Field resolution is the only bridge between
/// rule text and engine state.
pub struct ConditionContext<'a> {
    pattern: &'a ErrorPattern,
    trend: Option<&'a ErrorTrend>,
    window_minutes: f64,
    pattern_age_minutes: f64,
}

impl<'a> ConditionContext<'a> {
    /// Build a context for one rule evaluation
    pub fn new(
        pattern: &'a ErrorPattern,
        trend: Option<&'a ErrorTrend>,
        window_minutes: i64,
        now: Timestamp,
    ) -> Self {
        Self {
            pattern,
            trend,
            window_minutes: window_minutes as f64,
            pattern_age_minutes: pattern.age_minutes(now) as f64,
        }
    }

    fn resolve(&self, path: &str) -> Result<Value, RuleError> {
        match path {
            "pattern.count" => Ok(Value::Number(self.pattern.count as f64)),
            "pattern.affected_users" => {
                Ok(Value::Number(self.pattern.affected_users.len() as f64))
            }
            "pattern.affected_operations" => {
                Ok(Value::Number(self.pattern.affected_operations.len() as f64))
            }
            "pattern.trend_score" => Ok(Value::Number(self.pattern.trend_score)),
            "pattern.error_type" => Ok(Value::Str(self.pattern.signature.error_type.clone())),
            "pattern.module" => Ok(Value::Str(self.pattern.signature.module.clone())),
            "pattern.function" => Ok(Value::Str(self.pattern.signature.function.clone())),
            "window_minutes" => Ok(Value::Number(self.window_minutes)),
            "pattern_age_minutes" => Ok(Value::Number(self.pattern_age_minutes)),
            _ if path.starts_with("trend.") => {
                let trend = self
                    .trend
                    .ok_or_else(|| RuleError::TrendUnavailable(path.to_string()))?;
                match path {
                    "trend.growth_rate" => Ok(Value::Number(trend.growth_rate)),
                    "trend.acceleration" => Ok(Value::Number(trend.acceleration)),
                    "trend.is_spike" => Ok(Value::Bool(trend.is_spike)),
                    "trend.is_sustained" => Ok(Value::Bool(trend.is_sustained)),
                    "trend.window_count" => Ok(Value::Number(trend.time_windows.len() as f64)),
                    "trend.projection" => trend
                        .projection
                        .map(Value::Number)
                        .ok_or_else(|| RuleError::TrendUnavailable(path.to_string())),
                    _ => Err(RuleError::UnknownIdentifier(path.to_string())),
                }
            }
            _ => Err(RuleError::UnknownIdentifier(path.to_string())),
        }
    }
}

/// A parsed, evaluatable rule condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(input: &str) -> Result<Self, RuleError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(RuleError::Parse {
                offset: parser.tokens[parser.pos].offset,
                message: "unexpected trailing input".to_string(),
            });
        }
        Ok(Self { expr })
    }

    /// Evaluate against a context; the result must be a boolean
    pub fn evaluate(&self, ctx: &ConditionContext) -> Result<bool, RuleError> {
        match self.expr.eval(ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuleError::NotBoolean(other.type_name().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Bool(bool),
    Str(String),
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

impl Expr {
    fn eval(&self, ctx: &ConditionContext) -> Result<Value, RuleError> {
        match self {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Ident(path) => ctx.resolve(path),
            Expr::Unary(op, inner) => {
                let value = inner.eval(ctx)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Not, other) => Err(RuleError::TypeMismatch {
                        operation: "!".to_string(),
                        left: other.type_name().to_string(),
                        right: "boolean".to_string(),
                    }),
                    (UnaryOp::Neg, other) => Err(RuleError::TypeMismatch {
                        operation: "-".to_string(),
                        left: other.type_name().to_string(),
                        right: "number".to_string(),
                    }),
                }
            }
            Expr::Binary(op, lhs, rhs) => Self::eval_binary(*op, lhs, rhs, ctx),
        }
    }

    fn eval_binary(
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        ctx: &ConditionContext,
    ) -> Result<Value, RuleError> {
        // Short-circuit the boolean connectives
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = expect_bool(op, lhs.eval(ctx)?)?;
            if op == BinaryOp::And && !left {
                return Ok(Value::Bool(false));
            }
            if op == BinaryOp::Or && left {
                return Ok(Value::Bool(true));
            }
            let right = expect_bool(op, rhs.eval(ctx)?)?;
            return Ok(Value::Bool(right));
        }

        let left = lhs.eval(ctx)?;
        let right = rhs.eval(ctx)?;
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => a == b,
                    (Value::Bool(a), Value::Bool(b)) => a == b,
                    (Value::Str(a), Value::Str(b)) => a == b,
                    _ => return Err(mismatch(op, &left, &right)),
                };
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (a, b) = expect_numbers(op, &left, &right)?;
                let result = match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let (a, b) = expect_numbers(op, &left, &right)?;
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    _ => a / b,
                };
                Ok(Value::Number(result))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> Result<bool, RuleError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RuleError::TypeMismatch {
            operation: op.symbol().to_string(),
            left: other.type_name().to_string(),
            right: "boolean".to_string(),
        }),
    }
}

fn expect_numbers(op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64), RuleError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(mismatch(op, left, right)),
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> RuleError {
    RuleError::TypeMismatch {
        operation: op.symbol().to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Not,
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, RuleError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let offset = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, offset });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, offset });
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, offset });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, offset });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, offset });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, offset });
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token { kind: TokenKind::And, offset });
                    i += 2;
                } else {
                    return Err(RuleError::Parse {
                        offset,
                        message: "expected '&&'".to_string(),
                    });
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token { kind: TokenKind::Or, offset });
                    i += 2;
                } else {
                    return Err(RuleError::Parse {
                        offset,
                        message: "expected '||'".to_string(),
                    });
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Eq, offset });
                    i += 2;
                } else {
                    return Err(RuleError::Parse {
                        offset,
                        message: "expected '==' (assignment is not supported)".to_string(),
                    });
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Ne, offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Not, offset });
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Le, offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, offset });
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token { kind: TokenKind::Ge, offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, offset });
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(RuleError::Parse {
                                offset,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    offset,
                });
            }
            _ if c.is_ascii_digit() => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let text: String = chars[i..end].iter().collect();
                let number = text.parse::<f64>().map_err(|_| RuleError::Parse {
                    offset,
                    message: format!("invalid number '{}'", text),
                })?;
                tokens.push(Token {
                    kind: TokenKind::Number(number),
                    offset,
                });
                i = end;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '.')
                {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                let kind = match word.as_str() {
                    "true" => TokenKind::Ident("true".to_string()),
                    "false" => TokenKind::Ident("false".to_string()),
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word),
                };
                tokens.push(Token { kind, offset });
                i = end;
            }
            _ => {
                return Err(RuleError::Parse {
                    offset,
                    message: format!("unexpected character '{}'", c),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: &str) -> RuleError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|t| t.offset)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.offset + 1).unwrap_or(0));
        RuleError::Parse {
            offset,
            message: message.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            expr = Expr::Binary(BinaryOp::Or, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.parse_comparison()?;
        while self.peek() == Some(&TokenKind::And) {
            self.advance();
            let rhs = self.parse_comparison()?;
            expr = Expr::Binary(BinaryOp::And, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, RuleError> {
        let expr = self.parse_additive()?;
        let op = match self.peek() {
            Some(TokenKind::Eq) => BinaryOp::Eq,
            Some(TokenKind::Ne) => BinaryOp::Ne,
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Le) => BinaryOp::Le,
            Some(TokenKind::Gt) => BinaryOp::Gt,
            Some(TokenKind::Ge) => BinaryOp::Ge,
            _ => return Ok(expr),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(expr), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(expr),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(expr),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, RuleError> {
        match self.peek() {
            Some(TokenKind::Not) => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)))
            }
            Some(TokenKind::Minus) => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, RuleError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Number(n),
                ..
            }) => Ok(Expr::Number(n)),
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(Expr::Str(s)),
            Some(Token {
                kind: TokenKind::Ident(word),
                ..
            }) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Ident(word)),
            },
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let expr = self.parse_or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(expr),
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        Err(self.error_here("expected ')'"))
                    }
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error_here("expected a value"))
            }
        }
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::aggregator::PatternStore;
    use crate::events::ErrorEvent;
    use chrono::Utc;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_parse_never_panics(input: String) -> bool {
        // Arbitrary input either parses or returns a structured error
        let _ = Condition::parse(&input);
        true
    }

    #[quickcheck]
    fn prop_count_threshold_matches_comparison(count: u8, threshold: u8) -> bool {
        let count = count as u64 % 50 + 1;
        let mut store = PatternStore::default();
        let event = ErrorEvent::new("E", "m", "f", "failure");
        let mut pattern = store.ingest(&event);
        for _ in 1..count {
            pattern = store.ingest(&event);
        }

        let condition = Condition::parse(&format!("pattern.count >= {}", threshold)).unwrap();
        let ctx = ConditionContext::new(&pattern, None, 60, Utc::now());
        condition.evaluate(&ctx).unwrap() == (count >= threshold as u64)
    }
}
