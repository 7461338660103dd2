//! Condition expression language.
//!
//! A small, closed grammar for `?{...}` conditionals. It only knows literals,
//! variable references, comparisons and boolean operators; there is no
//! function call syntax, so evaluating caller-supplied text cannot reach
//! anything outside the expression and the interpolation context.
//!
//! A `@{name.path}` reference is a single operand. Its value is looked up in
//! the context after parsing and is never tokenized, so variable contents
//! cannot change the shape of the expression.
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not")* compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in") operand)?
//! operand := "(" or ")" | "[" (or ("," or)*)? "]" | reference | literal
//! reference := "@{" name ("." segment)* "}"
//! literal := number | "string" | 'string' | true | false | null | bareword
//! ```

use crate::error::{Error, Result};
use crate::resolver::{Context, lookup_reference};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Deepest nesting of parentheses and lists accepted in one expression.
pub const MAX_NESTING: usize = 32;

/// Evaluate an expression to a value.
pub fn evaluate(expression: &str, ctx: &Context<'_>) -> Result<Value> {
    let tokens = tokenize(expression).map_err(|message| malformed(expression, message))?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };

    let expr = parser
        .parse_or()
        .map_err(|message| malformed(expression, message))?;
    if parser.pos != tokens.len() {
        return Err(malformed(
            expression,
            format!("unexpected token {}", tokens[parser.pos].describe()),
        ));
    }

    expr.bind(ctx)?
        .eval()
        .map_err(|message| malformed(expression, message))
}

/// Evaluate an expression and reduce the result to a boolean.
pub fn evaluate_bool(expression: &str, ctx: &Context<'_>) -> Result<bool> {
    evaluate(expression, ctx).map(|value| is_truthy(&value))
}

/// Truthiness: null, false, zero, empty strings and empty containers are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Interpret a branch of a conditional as a literal value.
///
/// JSON scalars and containers keep their type, quoted text is unquoted, and
/// anything else is returned as a plain string.
pub fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }

    if let Some(inner) = strip_quotes(trimmed, '\'') {
        return Value::String(inner.to_string());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => Value::String(trimmed.to_string()),
    }
}

fn strip_quotes(text: &str, quote: char) -> Option<&str> {
    if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn malformed(expression: &str, message: impl Into<String>) -> Error {
    Error::MalformedCondition {
        expression: expression.to_string(),
        message: message.into(),
    }
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Op(Op),
    Reference(String),
    Literal(Value),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Op(op) => format!("operator {op:?}"),
            Self::Reference(name) => format!("reference @{{{name}}}"),
            Self::Literal(value) => format!("literal {value}"),
        }
    }
}

const WORD_BREAKS: &[char] = &['(', ')', '[', ']', ',', '!', '=', '<', '>', '&', '|', '"', '\''];

fn tokenize(expression: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            _ if c.is_whitespace() => i += 1,
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
            '|' if next == Some('|') => {
                tokens.push(Token::Op(Op::Or));
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::Op(Op::And));
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(Op::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(Op::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Op(Op::Not));
                i += 1;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Op(Op::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(Op::Lt));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Op(Op::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(Op::Gt));
                i += 1;
            }
            '@' if next == Some('{') => {
                let (name, end) = read_reference(&chars, i + 1)?;
                tokens.push(Token::Reference(name));
                i = end;
            }
            '@' if next == Some('@') && chars.get(i + 2) == Some(&'{') => {
                let (name, end) = read_reference(&chars, i + 2)?;
                tokens.push(Token::Literal(Value::String(format!("@{{{name}}}"))));
                i = end;
            }
            '"' | '\'' => {
                let (text, end) = read_quoted(&chars, i)?;
                tokens.push(Token::Literal(Value::String(text)));
                i = end;
            }
            '|' | '&' | '=' => return Err(format!("unexpected character '{c}'")),
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !WORD_BREAKS.contains(&chars[i])
                    && !(chars[i] == '@' && chars.get(i + 1) == Some(&'{'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(word_token(&word));
            }
        }
    }

    Ok(tokens)
}

fn read_quoted(chars: &[char], start: usize) -> std::result::Result<(String, usize), String> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err("unterminated string literal".to_string())
}

/// Read `{name.path}` starting at the opening brace.
fn read_reference(chars: &[char], open: usize) -> std::result::Result<(String, usize), String> {
    let close = chars[open..]
        .iter()
        .position(|&c| c == '}')
        .map(|offset| open + offset)
        .ok_or("unterminated reference")?;
    let name: String = chars[open + 1..close].iter().collect();

    let valid = name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    if !valid {
        return Err(format!("invalid reference '@{{{name}}}'"));
    }
    Ok((name, close + 1))
}

fn word_token(word: &str) -> Token {
    match word {
        "or" => Token::Op(Op::Or),
        "and" => Token::Op(Op::And),
        "not" => Token::Op(Op::Not),
        "in" => Token::Op(Op::In),
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        "null" => Token::Literal(Value::Null),
        _ => Token::Literal(number_literal(word).unwrap_or_else(|| Value::String(word.to_string()))),
    }
}

fn number_literal(word: &str) -> Option<Value> {
    let first = word.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    if let Ok(int) = word.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    word.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Reference(String),
    List(Vec<Expr>),
    Not(Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Compare(Op, Box<Expr>, Box<Expr>),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

type ParseResult = std::result::Result<Expr, String>;

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> ParseResult {
        let mut terms = vec![self.parse_and()?];
        while self.eat_op(Op::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Any(terms)
        })
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut terms = vec![self.parse_not()?];
        while self.eat_op(Op::And) {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::All(terms)
        })
    }

    fn parse_not(&mut self) -> ParseResult {
        let mut negations = 0usize;
        while self.eat_op(Op::Not) {
            negations += 1;
        }
        let inner = self.parse_compare()?;
        // Double negation still coerces to a boolean
        Ok(match negations {
            0 => inner,
            n if n % 2 == 1 => Expr::Not(Box::new(inner)),
            _ => Expr::Not(Box::new(Expr::Not(Box::new(inner)))),
        })
    }

    fn enter(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nests deeper than {MAX_NESTING} levels"));
        }
        Ok(())
    }

    fn parse_compare(&mut self) -> ParseResult {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Op(op @ (Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::In))) => {
                *op
            }
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_operand()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> ParseResult {
        match self.bump().cloned() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing ')'".to_string()),
                }
            }
            Some(Token::LBracket) => {
                self.enter()?;
                let list = self.parse_list()?;
                self.depth -= 1;
                Ok(list)
            }
            Some(Token::Reference(name)) => Ok(Expr::Reference(name)),
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(other) => Err(format!("expected a value, found {}", other.describe())),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_list(&mut self) -> ParseResult {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(Expr::List(items));
        }

        loop {
            items.push(self.parse_or()?);
            match self.bump() {
                Some(Token::Comma) => {}
                Some(Token::RBracket) => return Ok(Expr::List(items)),
                _ => return Err("missing closing ']'".to_string()),
            }
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl Expr {
    /// Replace every reference with its value from the context.
    fn bind(self, ctx: &Context<'_>) -> Result<Self> {
        let bind_all = |items: Vec<Self>| {
            items
                .into_iter()
                .map(|item| item.bind(ctx))
                .collect::<Result<Vec<_>>>()
        };
        Ok(match self {
            Self::Reference(name) => Self::Literal(lookup_reference(&name, ctx)?),
            Self::Literal(value) => Self::Literal(value),
            Self::List(items) => Self::List(bind_all(items)?),
            Self::All(terms) => Self::All(bind_all(terms)?),
            Self::Any(terms) => Self::Any(bind_all(terms)?),
            Self::Not(inner) => Self::Not(Box::new(inner.bind(ctx)?)),
            Self::Compare(op, left, right) => {
                Self::Compare(op, Box::new(left.bind(ctx)?), Box::new(right.bind(ctx)?))
            }
        })
    }

    fn eval(&self) -> std::result::Result<Value, String> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Reference(name) => Err(format!("reference @{{{name}}} was not bound")),
            Self::List(items) => items
                .iter()
                .map(Self::eval)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Not(inner) => Ok(Value::Bool(!is_truthy(&inner.eval()?))),
            Self::All(terms) => {
                for term in terms {
                    if !is_truthy(&term.eval()?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Self::Any(terms) => {
                for term in terms {
                    if is_truthy(&term.eval()?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Self::Compare(op, left, right) => {
                compare(*op, &left.eval()?, &right.eval()?).map(Value::Bool)
            }
        }
    }
}

fn compare(op: Op, left: &Value, right: &Value) -> std::result::Result<bool, String> {
    match op {
        Op::Eq => Ok(loose_eq(left, right)),
        Op::Ne => Ok(!loose_eq(left, right)),
        Op::In => contains(right, left),
        Op::Lt => order(left, right).map(Ordering::is_lt),
        Op::Le => order(left, right).map(Ordering::is_le),
        Op::Gt => order(left, right).map(Ordering::is_gt),
        Op::Ge => order(left, right).map(Ordering::is_ge),
        Op::Or | Op::And | Op::Not => Err(format!("{op:?} is not a comparison")),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
        if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
            return a == b;
        }
    }
    left == right
}

fn order(left: &Value, right: &Value) -> std::result::Result<Ordering, String> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| "numbers are not comparable".to_string());
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(format!("cannot order {left} and {right}")),
    }
}

fn contains(haystack: &Value, needle: &Value) -> std::result::Result<bool, String> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        Value::String(text) => match needle {
            Value::String(part) => Ok(text.contains(part.as_str())),
            other => Ok(text.contains(&other.to_string())),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(format!("object keys are strings, got {other}")),
        },
        other => Err(format!("'in' needs a list, string or object, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VariableStore;
    use serde_json::json;

    fn evaluate(expression: &str) -> Result<Value> {
        super::evaluate(expression, &Context::new(&VariableStore::new()))
    }

    fn evaluate_bool(expression: &str) -> Result<bool> {
        super::evaluate_bool(expression, &Context::new(&VariableStore::new()))
    }

    #[test]
    fn test_comparisons() {
        assert!(evaluate_bool("1 < 2").unwrap());
        assert!(evaluate_bool("2 >= 2").unwrap());
        assert!(!evaluate_bool("3 <= 2").unwrap());
        assert!(evaluate_bool("prod == \"prod\"").unwrap());
        assert!(evaluate_bool("'a' != 'b'").unwrap());
        assert!(evaluate_bool("\"10\" == 10").unwrap());
        assert!(evaluate_bool("apple < banana").unwrap());
    }

    #[test]
    fn test_boolean_operators_and_precedence() {
        assert!(evaluate_bool("true || false && false").unwrap());
        assert!(!evaluate_bool("(true || false) && false").unwrap());
        assert!(evaluate_bool("not false and !(1 == 2)").unwrap());
        assert!(evaluate_bool("1 == 2 or 2 == 2").unwrap());
    }

    #[test]
    fn test_in_operator() {
        assert!(evaluate_bool("dev in [dev, prod]").unwrap());
        assert!(!evaluate_bool("qa in [dev, prod]").unwrap());
        assert!(evaluate_bool("'east' in 'us-east-1'").unwrap());
        assert!(evaluate_bool("3 in [1, 2, 3]").unwrap());
    }

    #[test]
    fn test_bare_values_and_truthiness() {
        assert_eq!(evaluate("us-east-1").unwrap(), json!("us-east-1"));
        assert_eq!(evaluate("-2.5").unwrap(), json!(-2.5));
        assert!(!evaluate_bool("0").unwrap());
        assert!(!evaluate_bool("''").unwrap());
        assert!(!evaluate_bool("[]").unwrap());
        assert!(evaluate_bool("yes").unwrap());
        assert!(!evaluate_bool("null").unwrap());
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["", "1 ==", "(1 == 1", "[1, 2", "a = b", "'open", "1 < [2]", "1 2"] {
            let err = evaluate(bad).unwrap_err();
            assert!(
                matches!(err, Error::MalformedCondition { .. }),
                "expected malformed condition for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_references_are_single_operands() {
        let vars = VariableStore::with_values([
            ("name", json!("a b")),
            ("pipe", json!("x|y")),
            ("quote", json!("it's \"quoted\"")),
            ("size", json!(3)),
            ("tags", json!(["web", "db"])),
            ("db", json!({"host": "db.local"})),
        ]);
        let ctx = Context::new(&vars);

        assert!(super::evaluate_bool("@{name} == 'a b'", &ctx).unwrap());
        assert!(super::evaluate_bool("@{pipe} == \"x|y\"", &ctx).unwrap());
        assert!(super::evaluate_bool("@{quote} != ''", &ctx).unwrap());
        assert!(super::evaluate_bool("@{size} > 2 && db in @{tags}", &ctx).unwrap());
        assert!(super::evaluate_bool("@{db.host} == db.local", &ctx).unwrap());
        assert_eq!(super::evaluate("@@{name}", &ctx).unwrap(), json!("@{name}"));
    }

    #[test]
    fn test_missing_reference_is_resolution_error() {
        let err = evaluate("@{missing_name} == 1").unwrap_err();
        assert_eq!(err.missing_reference(), Some("missing_name"));

        let err = evaluate("@{bad name} == 1").unwrap_err();
        assert!(matches!(err, Error::MalformedCondition { .. }), "{err:?}");
    }

    #[test]
    fn test_long_chains_and_nesting_limit() {
        let negations = format!("{}true", "!".repeat(10_000));
        assert!(evaluate_bool(&negations).unwrap());
        assert!(!evaluate_bool(&format!("!{negations}")).unwrap());

        let chain = vec!["true"; 10_000].join(" && ");
        assert!(evaluate_bool(&chain).unwrap());

        let deep = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(evaluate(&deep).unwrap(), json!(1));

        let too_deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = evaluate(&too_deep).unwrap_err();
        assert!(err.to_string().contains("nests deeper"), "{err}");

        let lists = format!("{}1{}", "[".repeat(MAX_NESTING + 1), "]".repeat(MAX_NESTING + 1));
        assert!(matches!(evaluate(&lists), Err(Error::MalformedCondition { .. })));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal(" 42 "), json!(42));
        assert_eq!(parse_literal("true"), json!(true));
        assert_eq!(parse_literal("\"quoted text\""), json!("quoted text"));
        assert_eq!(parse_literal("'single'"), json!("single"));
        assert_eq!(parse_literal("[1, \"a\"]"), json!([1, "a"]));
        assert_eq!(parse_literal("plain words"), json!("plain words"));
        assert_eq!(parse_literal(""), json!(""));
    }
}
