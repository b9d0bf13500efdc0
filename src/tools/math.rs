//! @ai:module:intent Safe arithmetic expression evaluation tool
//! @ai:module:layer application
//! @ai:module:public_api MathTool, evaluate_expression
//! @ai:module:stateless true

use crate::error::ToolError;
use crate::tools::{Tool, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Longest expression accepted from a model
const MAX_EXPRESSION_LEN: usize = 4096;

/// Nesting limit for parentheses, signs and function calls
const MAX_DEPTH: usize = 256;

/// @ai:intent Calculator tool (`math_eval`); only numbers, operators and a fixed function set
pub struct MathTool;

#[async_trait]
impl Tool for MathTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "math_eval".to_string(),
            description: "Evaluate mathematical expressions safely".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "The mathematical expression to evaluate"
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    /// @ai:effects pure
    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing string field `expression`".to_string()))?;

        if expression.len() > MAX_EXPRESSION_LEN {
            return Err(ToolError::Execution(format!(
                "expression too long ({} bytes, limit {MAX_EXPRESSION_LEN})",
                expression.len()
            )));
        }

        let value = evaluate_expression(expression)?;
        Ok(json!({
            "expression": expression,
            "result": number_to_json(value),
        }))
    }
}

/// @ai:intent Integral results render as JSON integers so `2+2` yields `4`, not `4.0`
/// @ai:effects pure
fn number_to_json(value: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ToolError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                // exponent suffix, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("bad number literal `{literal}`")))?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            '+' => push(&mut tokens, Token::Plus, &mut i),
            '-' => push(&mut tokens, Token::Minus, &mut i),
            '*' => push(&mut tokens, Token::Star, &mut i),
            '/' => push(&mut tokens, Token::Slash, &mut i),
            '%' => push(&mut tokens, Token::Percent, &mut i),
            '^' => push(&mut tokens, Token::Caret, &mut i),
            '(' => push(&mut tokens, Token::LParen, &mut i),
            ')' => push(&mut tokens, Token::RParen, &mut i),
            ',' => push(&mut tokens, Token::Comma, &mut i),
            other => return Err(invalid(format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, token: Token, i: &mut usize) {
    tokens.push(token);
    *i += 1;
}

fn invalid(message: String) -> ToolError {
    ToolError::Execution(format!("Invalid expression: {message}"))
}

fn math_error(message: &str) -> ToolError {
    ToolError::Execution(format!("Math error: {message}"))
}

/// Recursive-descent parser. Precedence, loosest first: `+ -`, `* / %`, unary sign, `^`/`**`
/// (right-associative, so `-2**2 == -4` and `2**-1 == 0.5`).
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), ToolError> {
        match self.next() {
            Some(ref got) if *got == want => Ok(()),
            Some(got) => Err(invalid(format!("expected {want:?}, found {got:?}"))),
            None => Err(invalid(format!("expected {want:?}, found end of input"))),
        }
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(math_error("division by zero"));
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(math_error("modulo by zero"));
                    }
                    // floored modulo: result takes the sign of the divisor
                    value -= rhs * (value / rhs).floor();
                }
                _ => return Ok(value),
            }
        }
    }

    /// Every recursive cycle passes through here, so this is where depth is bounded
    fn unary(&mut self) -> Result<f64, ToolError> {
        if self.depth >= MAX_DEPTH {
            return Err(ToolError::Execution("expression too deeply nested".to_string()));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ToolError> {
        let base = self.atom()?;
        if let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, ToolError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let args = self.arguments()?;
                    call_function(&name, &args)
                } else {
                    match name.as_str() {
                        "pi" => Ok(std::f64::consts::PI),
                        "e" => Ok(std::f64::consts::E),
                        _ => Err(invalid(format!("unknown name `{name}`"))),
                    }
                }
            }
            Some(other) => Err(invalid(format!("unexpected token {other:?}"))),
            None => Err(invalid("unexpected end of input".to_string())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, ToolError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(invalid("unterminated argument list".to_string())),
            }
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, ToolError> {
    let arity = |n: usize| -> Result<(), ToolError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(invalid(format!("{name}() takes {n} argument(s), got {}", args.len())))
        }
    };

    match name {
        "abs" => {
            arity(1)?;
            Ok(args[0].abs())
        }
        "sqrt" => {
            arity(1)?;
            if args[0] < 0.0 {
                return Err(math_error("sqrt of negative number"));
            }
            Ok(args[0].sqrt())
        }
        "round" => match args {
            [x] => Ok(round_half_even(*x)),
            [x, digits] => {
                let factor = 10f64.powi(*digits as i32);
                Ok(round_half_even(x * factor) / factor)
            }
            _ => Err(invalid(format!("round() takes 1 or 2 arguments, got {}", args.len()))),
        },
        "min" | "max" if args.is_empty() => Err(invalid(format!("{name}() needs at least one argument"))),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        "sum" => Ok(args.iter().sum()),
        _ => Err(invalid(format!("function `{name}` not allowed"))),
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}

/// @ai:intent Evaluate an arithmetic expression
/// @ai:effects pure
pub fn evaluate_expression(expression: &str) -> Result<f64, ToolError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(invalid("empty expression".to_string()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;

    if parser.pos < parser.tokens.len() {
        return Err(invalid(format!(
            "unexpected trailing input at token {}",
            parser.pos + 1
        )));
    }
    if !value.is_finite() {
        return Err(math_error("result is not a finite number"));
    }

    Ok(value)
}
