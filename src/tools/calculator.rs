//! 计算器工具
//!
//! 手写词法 + Pratt 解析，只允许白名单内的函数与常量，不执行任何外部代码。
//! 支持四则运算、% 取余、^ 与 ** 幂（右结合）、一元负号、括号与多参函数。

use serde_json::json;

use crate::tools::registry::{CalculatorArgs, ToolResult};

pub fn run(args: &CalculatorArgs) -> ToolResult {
    match evaluate(&args.expression) {
        Ok(value) => ToolResult::ok(
            "calculator",
            json!({"expression": args.expression, "result": value}),
        ),
        Err(e) => ToolResult::fail("calculator", e),
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

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
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
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 科学计数法尾巴 1e-3
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
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| format!("无效数字: {text}"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("无法识别的字符: {other}")),
        }
    }
    Ok(tokens)
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
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(format!("期望 {token:?}，得到 {other:?}")),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<f64, String> {
        let mut lhs = match self.next() {
            Some(Token::Number(n)) => n,
            // 一元负号比幂松、比乘除紧，-2^2 == -(2^2)
            Some(Token::Minus) => -self.parse_expr(5)?,
            Some(Token::Plus) => self.parse_expr(5)?,
            Some(Token::LParen) => {
                let v = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                v
            }
            Some(Token::Ident(name)) => self.parse_ident(&name)?,
            other => return Err(format!("表达式语法错误: {other:?}")),
        };

        loop {
            let (l_bp, r_bp, op) = match self.peek() {
                Some(Token::Plus) => (1, 2, '+'),
                Some(Token::Minus) => (1, 2, '-'),
                Some(Token::Star) => (3, 4, '*'),
                Some(Token::Slash) => (3, 4, '/'),
                Some(Token::Percent) => (3, 4, '%'),
                // 幂右结合
                Some(Token::Caret) => (6, 5, '^'),
                _ => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(r_bp)?;
            lhs = apply_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_ident(&mut self, name: &str) -> Result<f64, String> {
        match name {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            _ => {}
        }

        if self.peek() != Some(&Token::LParen) {
            return Err(format!("未知标识符: {name}"));
        }
        self.pos += 1;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
        }
        self.expect(Token::RParen)?;
        apply_function(name, &args)
    }
}

fn apply_binary(op: char, lhs: f64, rhs: f64) -> Result<f64, String> {
    match op {
        '+' => Ok(lhs + rhs),
        '-' => Ok(lhs - rhs),
        '*' => Ok(lhs * rhs),
        '/' => {
            if rhs == 0.0 {
                Err("除数为零".to_string())
            } else {
                Ok(lhs / rhs)
            }
        }
        '%' => {
            if rhs == 0.0 {
                Err("除数为零".to_string())
            } else {
                Ok(lhs % rhs)
            }
        }
        '^' => Ok(lhs.powf(rhs)),
        _ => Err(format!("未知运算符: {op}")),
    }
}

fn apply_function(name: &str, args: &[f64]) -> Result<f64, String> {
    let one = |args: &[f64]| -> Result<f64, String> {
        if args.len() == 1 {
            Ok(args[0])
        } else {
            Err(format!("{name} 需要 1 个参数"))
        }
    };
    match name {
        "sin" => Ok(one(args)?.sin()),
        "cos" => Ok(one(args)?.cos()),
        "tan" => Ok(one(args)?.tan()),
        "asin" => Ok(one(args)?.asin()),
        "acos" => Ok(one(args)?.acos()),
        "atan" => Ok(one(args)?.atan()),
        "sqrt" => {
            let x = one(args)?;
            if x < 0.0 {
                Err("负数不能开平方".to_string())
            } else {
                Ok(x.sqrt())
            }
        }
        "exp" => Ok(one(args)?.exp()),
        "abs" => Ok(one(args)?.abs()),
        "floor" => Ok(one(args)?.floor()),
        "ceil" => Ok(one(args)?.ceil()),
        "round" => Ok(one(args)?.round()),
        "log10" => Ok(one(args)?.log10()),
        "log2" => Ok(one(args)?.log2()),
        "log" => match args {
            [x] => Ok(x.ln()),
            [x, base] => Ok(x.log(*base)),
            _ => Err("log 需要 1 或 2 个参数".to_string()),
        },
        "pow" => match args {
            [x, y] => Ok(x.powf(*y)),
            _ => Err("pow 需要 2 个参数".to_string()),
        },
        _ => Err(format!("未知函数: {name}")),
    }
}

pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("空表达式".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err("表达式末尾有多余内容".to_string());
    }
    if !value.is_finite() {
        return Err("计算结果溢出".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> f64 {
        evaluate(s).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 % 3"), 1.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("sqrt(16) + 2^3"), 12.0);
        assert!((eval("sin(pi / 2)") - 1.0).abs() < 1e-9);
        assert!((eval("log(8, 2)") - 3.0).abs() < 1e-9);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
        assert_eq!(eval("1e-3 * 1000"), 1.0);
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(evaluate("import os").is_err());
        assert!(evaluate("__builtins__").is_err());
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
        assert!(evaluate("1 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("2 3").is_err());
    }
}
