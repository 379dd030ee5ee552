//! Restricted expression language for the `expression` generator.
//!
//! A single scalar expression over a fixed name set: `prev`, `count`,
//! `random`, `time`, the calls `randint(a, b)` and `uniform(a, b)`, and the
//! `math` namespace. No statements, no assignments, no attribute access
//! beyond `math.*`. Arithmetic follows the usual dynamic-numeric rules:
//! int/int stays integral except `/`, `%` takes the divisor's sign,
//! `and`/`or` return their operands, and `null`, `false`, zero, and `""`
//! are falsy. Trusted-input functionality.

use crate::error::GeneratorError;
use crate::sim::value::Value;
use rand::rngs::StdRng;
use rand::Rng;

/// Names callable without a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Randint,
    Uniform,
}

/// Members of the `math` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathFn {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Pow,
    Log,
    Exp,
    Floor,
    Ceil,
    Fabs,
}

impl MathFn {
    fn from_name(name: &str) -> Option<MathFn> {
        Some(match name {
            "sin" => MathFn::Sin,
            "cos" => MathFn::Cos,
            "tan" => MathFn::Tan,
            "sqrt" => MathFn::Sqrt,
            "pow" => MathFn::Pow,
            "log" => MathFn::Log,
            "exp" => MathFn::Exp,
            "floor" => MathFn::Floor,
            "ceil" => MathFn::Ceil,
            "fabs" => MathFn::Fabs,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            MathFn::Pow => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Prev,
    Count,
    Random,
    Time,
    MathConst(f64),
    Call(Builtin, Vec<Expr>),
    MathCall(MathFn, Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Per-call evaluation context supplied by the generator.
pub struct EvalContext<'a> {
    pub prev: &'a Value,
    pub count: i64,
    /// Fresh draw in [0, 1), taken once per call whether or not referenced.
    pub random: f64,
    /// Seconds since the Unix epoch.
    pub time: f64,
    pub rng: &'a mut StdRng,
}

/// A parsed, reusable expression.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
}

impl CompiledExpr {
    /// Parse the expression; rejects anything outside the restricted grammar.
    pub fn parse(source: &str) -> Result<CompiledExpr, GeneratorError> {
        let tokens = tokenize(source)
            .map_err(|msg| GeneratorError::ExpressionParse(format!("{msg} in '{source}'")))?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser
            .parse_expr()
            .and_then(|ast| {
                if parser.pos == parser.tokens.len() {
                    Ok(ast)
                } else {
                    Err(format!("unexpected trailing token {:?}", parser.peek()))
                }
            })
            .map_err(|msg| GeneratorError::ExpressionParse(format!("{msg} in '{source}'")))?;
        Ok(CompiledExpr {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against the per-call context.
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<Value, GeneratorError> {
        eval(&self.ast, ctx)
            .map_err(|msg| GeneratorError::ExpressionEval(format!("{msg} in '{}'", self.source)))
    }
}

// ---------------------------------------------------------------------------
// Tokenizer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if !matches!(bytes.get(i + 1), Some(b'0'..=b'9')) => {
                tokens.push(Token::Dot);
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
                if bytes.get(i + 1) == Some(&b'*') {
                    tokens.push(Token::DoubleStar);
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
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err("assignment is not allowed".to_string());
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err("unexpected '!'".to_string());
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'0'..=b'9' => i += 1,
                        b'.' if !seen_dot => {
                            seen_dot = true;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                let text = &source[start..i];
                if seen_dot {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| format!("invalid number '{text}'"))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value: i64 = text
                        .parse()
                        .map_err(|_| format!("invalid number '{text}'"))?;
                    tokens.push(Token::Int(value));
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(source[start..i].to_string()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
//
// Precedence, loosest first: or, and, not, comparison, + -, * / %, unary -,
// ** (right-associative), primary.

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

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {expected:?}, got {other:?}")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("not") {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_arith()?;
        let op = match self.peek() {
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_arith()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_arith(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if self.eat(&Token::DoubleStar) {
            // right-associative, and `2 ** -1` parses the unary on the right
            let exponent = self.parse_unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_name(&name),
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_name(&mut self, name: &str) -> Result<Expr, String> {
        match name {
            "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
            "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
            "null" | "None" => Ok(Expr::Literal(Value::Null)),
            "prev" => Ok(Expr::Prev),
            "count" => Ok(Expr::Count),
            "random" => Ok(Expr::Random),
            "time" => Ok(Expr::Time),
            "randint" => {
                let args = self.parse_args()?;
                if args.len() != 2 {
                    return Err("randint takes exactly 2 arguments".to_string());
                }
                Ok(Expr::Call(Builtin::Randint, args))
            }
            "uniform" => {
                let args = self.parse_args()?;
                if args.len() != 2 {
                    return Err("uniform takes exactly 2 arguments".to_string());
                }
                Ok(Expr::Call(Builtin::Uniform, args))
            }
            "math" => self.parse_math_member(),
            other => Err(format!("unknown name '{other}'")),
        }
    }

    fn parse_math_member(&mut self) -> Result<Expr, String> {
        self.expect(Token::Dot)?;
        let member = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(format!("expected math member, got {other:?}")),
        };
        match member.as_str() {
            "pi" => Ok(Expr::MathConst(std::f64::consts::PI)),
            "e" => Ok(Expr::MathConst(std::f64::consts::E)),
            name => {
                let func = MathFn::from_name(name)
                    .ok_or_else(|| format!("unknown math function '{name}'"))?;
                let args = self.parse_args()?;
                if args.len() != func.arity() {
                    return Err(format!(
                        "math.{name} takes exactly {} argument(s)",
                        func.arity()
                    ));
                }
                Ok(Expr::MathCall(func, args))
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Interpreter

fn eval(expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<Value, String> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Prev => Ok(ctx.prev.clone()),
        Expr::Count => Ok(Value::Int(ctx.count)),
        Expr::Random => Ok(Value::Float(ctx.random)),
        Expr::Time => Ok(Value::Float(ctx.time)),
        Expr::MathConst(value) => Ok(Value::Float(*value)),
        Expr::Call(func, args) => {
            let a = as_f64(&eval(&args[0], ctx)?)?;
            let b = as_f64(&eval(&args[1], ctx)?)?;
            match func {
                Builtin::Randint => {
                    let (low, high) = (a.trunc() as i64, b.trunc() as i64);
                    if low > high {
                        return Err(format!("randint range is empty ({low} > {high})"));
                    }
                    Ok(Value::Int(ctx.rng.gen_range(low..=high)))
                }
                Builtin::Uniform => {
                    if a > b {
                        return Err(format!("uniform range is empty ({a} > {b})"));
                    }
                    Ok(Value::Float(ctx.rng.gen_range(a..=b)))
                }
            }
        }
        Expr::MathCall(func, args) => {
            let x = as_f64(&eval(&args[0], ctx)?)?;
            let result = match func {
                MathFn::Sin => x.sin(),
                MathFn::Cos => x.cos(),
                MathFn::Tan => x.tan(),
                MathFn::Sqrt => {
                    if x < 0.0 {
                        return Err("math domain error: sqrt of negative".to_string());
                    }
                    x.sqrt()
                }
                MathFn::Pow => {
                    let y = as_f64(&eval(&args[1], ctx)?)?;
                    x.powf(y)
                }
                MathFn::Log => {
                    if x <= 0.0 {
                        return Err("math domain error: log of non-positive".to_string());
                    }
                    x.ln()
                }
                MathFn::Exp => x.exp(),
                MathFn::Floor => return Ok(Value::Int(x.floor() as i64)),
                MathFn::Ceil => return Ok(Value::Int(x.ceil() as i64)),
                MathFn::Fabs => x.abs(),
            };
            Ok(Value::Float(result))
        }
        Expr::Neg(inner) => match eval(inner, ctx)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Bool(b) => Ok(Value::Int(-(b as i64))),
            other => Err(format!("cannot negate {other:?}")),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.is_truthy())),
        Expr::And(lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            if left.is_truthy() {
                eval(rhs, ctx)
            } else {
                Ok(left)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, ctx)
            }
        }
        Expr::Bin(op, lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            let right = eval(rhs, ctx)?;
            binary(*op, &left, &right)
        }
        Expr::Cmp(op, lhs, rhs) => {
            let left = eval(lhs, ctx)?;
            let right = eval(rhs, ctx)?;
            compare(*op, &left, &right)
        }
    }
}

/// Numeric view of a value; booleans count as 0/1.
fn as_number(value: &Value) -> Option<Value> {
    match value {
        Value::Int(_) | Value::Float(_) => Some(value.clone()),
        Value::Bool(b) => Some(Value::Int(*b as i64)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Result<f64, String> {
    match as_number(value) {
        Some(Value::Int(i)) => Ok(i as f64),
        Some(Value::Float(f)) => Ok(f),
        _ => Err(format!("expected a number, got {value:?}")),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, String> {
    if op == BinOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    let (a, b) = match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(format!("unsupported operand types: {left:?} and {right:?}")),
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_binary(op, x, y),
        (a, b) => {
            let x = as_f64(&a)?;
            let y = as_f64(&b)?;
            float_binary(op, x, y)
        }
    }
}

fn int_binary(op: BinOp, x: i64, y: i64) -> Result<Value, String> {
    match op {
        BinOp::Add => Ok(Value::Int(x.wrapping_add(y))),
        BinOp::Sub => Ok(Value::Int(x.wrapping_sub(y))),
        BinOp::Mul => Ok(Value::Int(x.wrapping_mul(y))),
        // division always yields a float
        BinOp::Div => float_binary(BinOp::Div, x as f64, y as f64),
        BinOp::Mod => {
            if y == 0 {
                Err("modulo by zero".to_string())
            } else {
                // result takes the sign of the divisor
                let r = x.wrapping_rem(y);
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) {
                    r + y
                } else {
                    r
                }))
            }
        }
        BinOp::Pow => {
            if y >= 0 {
                match u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)) {
                    Some(result) => Ok(Value::Int(result)),
                    None => float_binary(BinOp::Pow, x as f64, y as f64),
                }
            } else {
                float_binary(BinOp::Pow, x as f64, y as f64)
            }
        }
    }
}

fn float_binary(op: BinOp, x: f64, y: f64) -> Result<Value, String> {
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err("division by zero".to_string());
            }
            x / y
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err("modulo by zero".to_string());
            }
            // result takes the sign of the divisor
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(Value::Float(result))
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<Value, String> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let ordering = a.cmp(b);
        return Ok(Value::Bool(cmp_matches(op, ordering as i32 as f64, 0.0)));
    }
    match op {
        CmpOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        CmpOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        _ => {
            let a = as_f64(left)?;
            let b = as_f64(right)?;
            Ok(Value::Bool(cmp_matches(op, a, b)))
        }
    }
}

fn cmp_matches(op: CmpOp, a: f64, b: f64) -> bool {
    match op {
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (a, b) => as_f64(&a).unwrap_or(f64::NAN) == as_f64(&b).unwrap_or(f64::NAN),
        },
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn eval_once(source: &str, prev: Value, count: i64) -> Result<Value, GeneratorError> {
        let compiled = CompiledExpr::parse(source)?;
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = EvalContext {
            prev: &prev,
            count,
            random: 0.25,
            time: 1_000.0,
            rng: &mut rng,
        };
        compiled.eval(&mut ctx)
    }

    #[test]
    fn test_arithmetic_stays_integral() {
        assert_eq!(eval_once("1 + 2 * 3", Value::Null, 0).unwrap(), Value::Int(7));
        assert_eq!(
            eval_once("2 ** 10", Value::Null, 0).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            eval_once("7 % 3", Value::Null, 0).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        assert_eq!(eval_once("7 % -3", Value::Null, 0).unwrap(), Value::Int(-2));
        assert_eq!(eval_once("-7 % 3", Value::Null, 0).unwrap(), Value::Int(2));
        assert_eq!(eval_once("-7 % -3", Value::Null, 0).unwrap(), Value::Int(-1));
        assert_eq!(
            eval_once("7.5 % -2", Value::Null, 0).unwrap(),
            Value::Float(-0.5)
        );
    }

    #[test]
    fn test_division_is_float() {
        assert_eq!(
            eval_once("7 / 2", Value::Null, 0).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_prev_or_default() {
        assert_eq!(
            eval_once("(prev or 10) + 1", Value::Null, 0).unwrap(),
            Value::Int(11)
        );
        assert_eq!(
            eval_once("(prev or 10) + 1", Value::Int(11), 1).unwrap(),
            Value::Int(12)
        );
    }

    #[test]
    fn test_exposed_names() {
        assert_eq!(
            eval_once("count * 2", Value::Null, 4).unwrap(),
            Value::Int(8)
        );
        assert_eq!(
            eval_once("random", Value::Null, 0).unwrap(),
            Value::Float(0.25)
        );
        assert_eq!(
            eval_once("time", Value::Null, 0).unwrap(),
            Value::Float(1_000.0)
        );
    }

    #[test]
    fn test_math_namespace() {
        assert_eq!(
            eval_once("math.sqrt(9)", Value::Null, 0).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            eval_once("math.floor(2.9)", Value::Null, 0).unwrap(),
            Value::Int(2)
        );
        match eval_once("math.cos(0) + math.pi", Value::Null, 0).unwrap() {
            Value::Float(v) => assert!((v - (1.0 + std::f64::consts::PI)).abs() < 1e-12),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn test_randint_inclusive() {
        for _ in 0..20 {
            match eval_once("randint(1, 3)", Value::Null, 0).unwrap() {
                Value::Int(v) => assert!((1..=3).contains(&v)),
                other => panic!("expected int, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_comparisons_and_booleans() {
        assert_eq!(
            eval_once("1 < 2 and 2 <= 2", Value::Null, 0).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_once("not (1 == 2)", Value::Null, 0).unwrap(),
            Value::Bool(true)
        );
        // `or` returns its operand, not a coerced bool
        assert_eq!(
            eval_once("0 or 5", Value::Null, 0).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn test_rejects_unknown_names_and_statements() {
        assert!(CompiledExpr::parse("import os").is_err());
        assert!(CompiledExpr::parse("x = 1").is_err());
        assert!(CompiledExpr::parse("foo(1)").is_err());
        assert!(CompiledExpr::parse("math.system('x')").is_err());
        assert!(CompiledExpr::parse("prev.count").is_err());
    }

    #[test]
    fn test_eval_domain_errors() {
        assert!(eval_once("1 / 0", Value::Null, 0).is_err());
        assert!(eval_once("math.sqrt(0 - 1)", Value::Null, 0).is_err());
        assert!(eval_once("math.log(0)", Value::Null, 0).is_err());
    }
}
