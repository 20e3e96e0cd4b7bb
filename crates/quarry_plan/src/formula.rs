//! Arithmetic formulas for `multiple_calculation`.
//!
//! Formulas are parsed once into an [`Expr`] tree and evaluated per row.
//! Supported: numbers, variables, `+ - * /`, `^` (or `**`) for exponent,
//! unary minus and parentheses. `^` is right-associative and binds tighter
//! than unary minus, so `-2^2` is `-4`.

use indexmap::{IndexMap, IndexSet};
use quarry_core::{CoreError, CoreResult};

/// Deepest nesting of parentheses, signs and exponents a formula may use
const MAX_NESTING: usize = 64;

/// Longest formula accepted, in tokens
const MAX_TOKENS: usize = 4096;

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
}

impl BinaryOp {
    fn apply(self, lhs: f64, rhs: f64) -> CoreResult<f64> {
        let out = match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => {
                if rhs == 0.0 {
                    return Err(CoreError::formula("division by zero"));
                }
                lhs / rhs
            }
            Self::Pow => lhs.powf(rhs),
        };
        if out.is_finite() {
            Ok(out)
        } else {
            Err(CoreError::formula(format!(
                "{} {} {} is not a finite number",
                lhs, self, rhs
            )))
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        };
        f.write_str(symbol)
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Literal(f64),
    /// Variable bound to a column
    Variable(String),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary minus
    Negate(Box<Expr>),
}

impl Expr {
    /// Evaluate with variable values from `lookup`
    ///
    /// # Errors
    ///
    /// Returns `Formula` on an unbound variable, division by zero, or a
    /// non-finite result
    pub fn eval(&self, lookup: &impl Fn(&str) -> Option<f64>) -> CoreResult<f64> {
        match self {
            Self::Literal(n) => Ok(*n),
            Self::Variable(name) => lookup(name)
                .ok_or_else(|| CoreError::formula(format!("unbound variable '{}'", name))),
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?),
            Self::Negate(inner) => Ok(-inner.eval(lookup)?),
        }
    }

    fn collect_variables(&self, out: &mut IndexSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Variable(name) => {
                out.insert(name.clone());
            }
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Self::Negate(inner) => inner.collect_variables(out),
        }
    }
}

/// A parsed formula and its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse formula text
    ///
    /// # Errors
    ///
    /// Returns `Formula` describing the first syntax error
    pub fn parse(text: &str) -> CoreResult<Self> {
        let tokens = tokenize(text)?;
        if tokens.len() > MAX_TOKENS {
            return Err(CoreError::formula(format!(
                "formula has {} tokens, limit is {}",
                tokens.len(),
                MAX_TOKENS
            )));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(CoreError::formula(format!("unexpected '{}' in '{}'", tok, text)));
        }
        Ok(Self {
            source: text.to_string(),
            expr,
        })
    }

    /// Source text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root expression
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Variables in order of first appearance
    #[must_use]
    pub fn variables(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.expr.collect_variables(&mut out);
        out
    }

    /// Evaluate with variable values from `lookup`
    ///
    /// # Errors
    ///
    /// See [`Expr::eval`]
    pub fn eval(&self, lookup: impl Fn(&str) -> Option<f64>) -> CoreResult<f64> {
        self.expr.eval(&lookup)
    }

    /// Check that every variable is bound and that the formula evaluates
    /// with sample values.
    ///
    /// The n-th bound variable is given the value `(n % 10) + 1`.
    ///
    /// # Errors
    ///
    /// Returns `Formula` on an unbound variable or an evaluation failure
    pub fn check(&self, bindings: &IndexMap<String, String>) -> CoreResult<()> {
        if let Some(missing) = self.variables().iter().find(|v| !bindings.contains_key(*v)) {
            return Err(CoreError::formula(format!(
                "variable '{}' is not bound to a column",
                missing
            )));
        }
        let samples: IndexMap<&str, f64> = bindings
            .keys()
            .enumerate()
            .map(|(i, name)| (name.as_str(), ((i % 10) + 1) as f64))
            .collect();
        self.eval(|name| samples.get(name).copied()).map(|_| ())
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Ident(s) => f.write_str(s),
            Self::Op(op) => write!(f, "{}", op),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(text: &str) -> CoreResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
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
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| CoreError::formula(format!("bad number '{}'", literal)))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                let op = match c {
                    '+' => BinaryOp::Add,
                    '-' => BinaryOp::Sub,
                    '*' => BinaryOp::Mul,
                    '/' => BinaryOp::Div,
                    _ => BinaryOp::Pow,
                };
                tokens.push(Token::Op(op));
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
            other => {
                return Err(CoreError::formula(format!(
                    "unexpected character '{}' in '{}'",
                    other, text
                )));
            }
        }
    }
    if tokens.is_empty() {
        return Err(CoreError::formula("empty formula"));
    }
    Ok(tokens)
}

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
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_op(&mut self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> CoreResult<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&[BinaryOp::Add, BinaryOp::Sub]) {
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> CoreResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&[BinaryOp::Mul, BinaryOp::Div]) {
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> CoreResult<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(CoreError::formula(format!(
                "formula nested deeper than {} levels",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> CoreResult<Expr> {
        if self.eat_op(&[BinaryOp::Sub]).is_some() {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        if self.eat_op(&[BinaryOp::Add]).is_some() {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> CoreResult<Expr> {
        let base = self.atom()?;
        if self.eat_op(&[BinaryOp::Pow]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> CoreResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(CoreError::formula("missing closing parenthesis")),
                }
            }
            Some(tok) => Err(CoreError::formula(format!("unexpected '{}'", tok))),
            None => Err(CoreError::formula("unexpected end of formula")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, vars: &[(&str, f64)]) -> CoreResult<f64> {
        let formula = Formula::parse(text)?;
        formula.eval(|name| vars.iter().find(|(n, _)| *n == name).map(|(_, v)| *v))
    }

    fn bindings(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", &[]).unwrap(), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &[]).unwrap(), 9.0);
        assert_eq!(eval("10 - 4 - 3", &[]).unwrap(), 3.0);
        assert_eq!(eval("12 / 3 / 2", &[]).unwrap(), 2.0);
    }

    #[test]
    fn test_power() {
        assert_eq!(eval("2 ^ 3 ^ 2", &[]).unwrap(), 512.0);
        assert_eq!(eval("-2 ^ 2", &[]).unwrap(), -4.0);
        assert_eq!(eval("2 ** 3", &[]).unwrap(), 8.0);
        assert_eq!(eval("2 ^ -1", &[]).unwrap(), 0.5);
    }

    #[test]
    fn test_variables() {
        let out = eval("a * b + a", &[("a", 2.0), ("b", 5.0)]).unwrap();
        assert_eq!(out, 12.0);
        let formula = Formula::parse("b + a * b").unwrap();
        let vars: Vec<String> = formula.variables().into_iter().collect();
        assert_eq!(vars, vec!["b", "a"]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(Formula::parse("").is_err());
        assert!(Formula::parse("a +").is_err());
        assert!(Formula::parse("(a + b").is_err());
        assert!(Formula::parse("a b").is_err());
        assert!(Formula::parse("a % b").is_err());
        assert!(Formula::parse("1.2.3").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(matches!(Formula::parse(&deep), Err(CoreError::Formula { .. })));

        let signs = format!("{}1", "-".repeat(100));
        assert!(matches!(Formula::parse(&signs), Err(CoreError::Formula { .. })));

        let powers = vec!["2"; 500].join("^");
        assert!(matches!(Formula::parse(&powers), Err(CoreError::Formula { .. })));

        let nested = format!("{}a{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(eval(&nested, &[("a", 3.0)]).unwrap(), 3.0);
    }

    #[test]
    fn test_token_limit() {
        let long = vec!["1"; 5000].join("+");
        assert!(matches!(Formula::parse(&long), Err(CoreError::Formula { .. })));

        let ok = vec!["1"; 1000].join("+");
        assert_eq!(eval(&ok, &[]).unwrap(), 1000.0);
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("a / 0", &[("a", 1.0)]).unwrap_err();
        assert!(matches!(err, CoreError::Formula { .. }));
    }

    #[test]
    fn test_check_unbound_variable() {
        let formula = Formula::parse("a + c").unwrap();
        let err = formula.check(&bindings(&[("a", "SALARY")])).unwrap_err();
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_check_sample_division_by_zero() {
        let formula = Formula::parse("a / (b - b)").unwrap();
        assert!(formula.check(&bindings(&[("a", "X"), ("b", "Y")])).is_err());
        let formula = Formula::parse("a / b").unwrap();
        assert!(formula.check(&bindings(&[("a", "X"), ("b", "Y")])).is_ok());
    }

    proptest::proptest! {
        #[test]
        fn test_integer_arithmetic_matches_native(
            a in -1000i32..1000,
            b in -1000i32..1000,
            c in 1i32..100,
        ) {
            let text = format!("({}) + ({}) * ({}) - ({}) / ({})", a, b, c, a, c);
            let expected = a as f64 + b as f64 * c as f64 - a as f64 / c as f64;
            let got = eval(&text, &[]).unwrap();
            proptest::prop_assert!((got - expected).abs() < 1e-9);
        }
    }
}
