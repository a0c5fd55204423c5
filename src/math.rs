//! Data generator math
//!
//! Expressions are parsed with sqlparser's expression parser (PostgreSQL dialect, so
//! `^` is exponentiation and binds tighter than `*`) and compiled into a small tree that
//! is evaluated element-wise over variable series.
//!
//! Bare identifiers are quoted before parsing so that ids colliding with SQL keywords
//! (`time`, `value`, ...) stay plain identifiers.

use rustc_hash::FxHashMap;
use sqlparser::ast::{BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, UnaryOperator, Value};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use thiserror::Error;

/// Expression parse or evaluation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// Text is not a valid expression
    #[error("cannot parse `{expression}`: {reason}")]
    Parse {
        /// Expression text
        expression: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Construct outside the supported subset
    #[error("unsupported construct `{0}`")]
    Unsupported(String),

    /// Unknown function name or wrong arity
    #[error("unknown function `{name}` with {arity} argument(s)")]
    UnknownFunction {
        /// Function name
        name: String,
        /// Number of arguments given
        arity: usize,
    },

    /// Identifier that is neither a variable nor a parameter
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    /// Variables of different lengths
    #[error("variables have different lengths: {0}")]
    ShapeMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
    Pow,
    LogBase,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str, arity: usize) -> Option<Self> {
        let func = match (name.to_ascii_lowercase().as_str(), arity) {
            ("exp", 1) => Self::Exp,
            ("ln", 1) => Self::Ln,
            ("log" | "log10", 1) => Self::Log10,
            ("log", 2) => Self::LogBase,
            ("sqrt", 1) => Self::Sqrt,
            ("abs", 1) => Self::Abs,
            ("floor", 1) => Self::Floor,
            ("ceil" | "ceiling", 1) => Self::Ceil,
            ("sin", 1) => Self::Sin,
            ("cos", 1) => Self::Cos,
            ("tan", 1) => Self::Tan,
            ("pow" | "power", 2) => Self::Pow,
            ("min", n) if n >= 1 => Self::Min,
            ("max", n) if n >= 1 => Self::Max,
            _ => return None,
        };
        Some(func)
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Self::Exp => args[0].exp(),
            Self::Ln => args[0].ln(),
            Self::Log10 => args[0].log10(),
            Self::Sqrt => args[0].sqrt(),
            Self::Abs => args[0].abs(),
            Self::Floor => args[0].floor(),
            Self::Ceil => args[0].ceil(),
            Self::Sin => args[0].sin(),
            Self::Cos => args[0].cos(),
            Self::Tan => args[0].tan(),
            Self::Pow => args[0].powf(args[1]),
            // log(base, x)
            Self::LogBase => args[1].log(args[0]),
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Symbol(String),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

impl Node {
    fn eval(&self, lookup: &impl Fn(&str) -> Option<f64>) -> Result<f64, MathError> {
        Ok(match self {
            Self::Const(v) => *v,
            Self::Symbol(name) => lookup(name).ok_or_else(|| MathError::UnknownSymbol(name.clone()))?,
            Self::Neg(inner) => -inner.eval(lookup)?,
            Self::Binary(op, l, r) => {
                let (l, r) = (l.eval(lookup)?, r.eval(lookup)?);
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Rem => l % r,
                    BinOp::Pow => l.powf(r),
                }
            }
            Self::Call(func, args) => {
                let values = args.iter().map(|a| a.eval(lookup)).collect::<Result<Vec<_>, _>>()?;
                func.apply(&values)
            }
        })
    }

    fn symbols<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Symbol(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Neg(inner) => inner.symbols(out),
            Self::Binary(_, l, r) => {
                l.symbols(out);
                r.symbols(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.symbols(out)),
        }
    }
}

/// Compiled data generator expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    root: Node,
}

impl Expression {
    /// Parse an expression
    ///
    /// # Errors
    /// Returns `MathError` if the text is not in the supported subset
    pub fn parse(text: &str) -> Result<Self, MathError> {
        let parse_error = |reason: String| MathError::Parse {
            expression: text.to_string(),
            reason,
        };
        let quoted = quote_identifiers(text);
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(&quoted)
            .map_err(|e| parse_error(e.to_string()))?;
        let expr = parser.parse_expr().map_err(|e| parse_error(e.to_string()))?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(parse_error(format!("unexpected `{}`", trailing.token)));
        }
        Ok(Self {
            text: text.to_string(),
            root: compile(&expr)?,
        })
    }

    /// Source text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Distinct symbols referenced, in first-use order
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.symbols(&mut out);
        out
    }

    /// Evaluate with scalar bindings
    ///
    /// # Errors
    /// Returns `MathError::UnknownSymbol` for unbound identifiers
    pub fn eval(&self, lookup: impl Fn(&str) -> Option<f64>) -> Result<f64, MathError> {
        self.root.eval(&lookup)
    }

    /// Evaluate element-wise over variable series and scalar parameters
    ///
    /// All referenced series must have the same length; an expression without series
    /// yields a single value.
    ///
    /// # Errors
    /// Returns `MathError` for unknown symbols or mismatched lengths
    pub fn eval_series(
        &self,
        series: &FxHashMap<&str, &[f64]>,
        parameters: &FxHashMap<&str, f64>,
    ) -> Result<Vec<f64>, MathError> {
        let mut len = None;
        for symbol in self.symbols() {
            if let Some(values) = series.get(symbol) {
                match len {
                    None => len = Some(values.len()),
                    Some(n) if n != values.len() => {
                        let shapes: Vec<String> = self
                            .symbols()
                            .into_iter()
                            .filter_map(|s| series.get(s).map(|v| format!("{s}: {}", v.len())))
                            .collect();
                        return Err(MathError::ShapeMismatch(shapes.join(", ")));
                    }
                    Some(_) => {}
                }
            } else if !parameters.contains_key(symbol) {
                return Err(MathError::UnknownSymbol(symbol.to_string()));
            }
        }

        (0..len.unwrap_or(1))
            .map(|i| {
                self.eval(|name| {
                    series
                        .get(name)
                        .and_then(|v| v.get(i).copied())
                        .or_else(|| parameters.get(name).copied())
                })
            })
            .collect()
    }
}

fn compile(expr: &Expr) -> Result<Node, MathError> {
    match expr {
        Expr::Identifier(ident) => Ok(Node::Symbol(ident.value.clone())),
        Expr::Value(Value::Number(n, _)) => n
            .parse::<f64>()
            .map(Node::Const)
            .map_err(|_| MathError::Unsupported(n.clone())),
        Expr::Nested(inner) => compile(inner),
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Minus => Ok(Node::Neg(Box::new(compile(expr)?))),
            UnaryOperator::Plus => compile(expr),
            _ => Err(MathError::Unsupported(op.to_string())),
        },
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::Plus => BinOp::Add,
                BinaryOperator::Minus => BinOp::Sub,
                BinaryOperator::Multiply => BinOp::Mul,
                BinaryOperator::Divide => BinOp::Div,
                BinaryOperator::Modulo => BinOp::Rem,
                BinaryOperator::PGExp | BinaryOperator::BitwiseXor => BinOp::Pow,
                other => return Err(MathError::Unsupported(other.to_string())),
            };
            Ok(Node::Binary(op, Box::new(compile(left)?), Box::new(compile(right)?)))
        }
        Expr::Floor { expr, .. } => Ok(Node::Call(Func::Floor, vec![compile(expr)?])),
        Expr::Ceil { expr, .. } => Ok(Node::Call(Func::Ceil, vec![compile(expr)?])),
        Expr::Function(func) => {
            let name = func.name.to_string();
            let args = match &func.args {
                FunctionArguments::List(list) => list
                    .args
                    .iter()
                    .map(|arg| match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => compile(e),
                        other => Err(MathError::Unsupported(other.to_string())),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                FunctionArguments::None => Vec::new(),
                FunctionArguments::Subquery(_) => return Err(MathError::Unsupported(name)),
            };
            let func = Func::lookup(&name, args.len()).ok_or(MathError::UnknownFunction {
                name,
                arity: args.len(),
            })?;
            Ok(Node::Call(func, args))
        }
        other => Err(MathError::Unsupported(other.to_string())),
    }
}

/// Wrap every bare identifier that is not a function name in double quotes
fn quote_identifiers(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            // numeric literal, including an exponent part
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
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
            out.extend(&chars[start..i]);
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().find(|c| !c.is_whitespace());
            if next == Some(&'(') {
                out.push_str(&word);
            } else {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            }
        } else if c == '"' {
            // already quoted
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.extend(&chars[start..i]);
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> f64 {
        Expression::parse(text).unwrap().eval(|_| None).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert!((eval("1 + 2 * 3") - 7.0).abs() < 1e-12);
        assert!((eval("2 * 3 ^ 2") - 18.0).abs() < 1e-12);
        assert!((eval("-2 * 3") + 6.0).abs() < 1e-12);
        assert!((eval("(1 + 2) * 3") - 9.0).abs() < 1e-12);
        assert!((eval("1e-3 * 1000") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_functions() {
        assert!((eval("exp(0) + ln(1)") - 1.0).abs() < 1e-12);
        assert!((eval("log(100)") - 2.0).abs() < 1e-12);
        assert!((eval("log(2, 8)") - 3.0).abs() < 1e-12);
        assert!((eval("sqrt(16) + abs(-1)") - 5.0).abs() < 1e-12);
        assert!((eval("floor(1.7) + ceil(1.2)") - 3.0).abs() < 1e-12);
        assert!((eval("max(1, 5, 3) - min(4, 2)") - 3.0).abs() < 1e-12);
        assert!((eval("pow(2, 10)") - 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_identifiers() {
        let expr = Expression::parse("time * 2 + value").unwrap();
        assert_eq!(expr.symbols(), vec!["time", "value"]);
        let v = expr
            .eval(|name| match name {
                "time" => Some(3.0),
                "value" => Some(1.0),
                _ => None,
            })
            .unwrap();
        assert!((v - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_series_evaluation() {
        let expr = Expression::parse("A / scale + B").unwrap();
        let a = [2.0, 4.0];
        let b = [1.0, 1.0];
        let series: FxHashMap<&str, &[f64]> = [("A", &a[..]), ("B", &b[..])].into_iter().collect();
        let params: FxHashMap<&str, f64> = [("scale", 2.0)].into_iter().collect();
        assert_eq!(expr.eval_series(&series, &params).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_series_errors() {
        let expr = Expression::parse("A + C").unwrap();
        let a = [1.0];
        let series: FxHashMap<&str, &[f64]> = [("A", &a[..])].into_iter().collect();
        let err = expr.eval_series(&series, &FxHashMap::default()).unwrap_err();
        assert_eq!(err, MathError::UnknownSymbol("C".to_string()));

        let c = [1.0, 2.0];
        let series: FxHashMap<&str, &[f64]> = [("A", &a[..]), ("C", &c[..])].into_iter().collect();
        assert!(matches!(
            expr.eval_series(&series, &FxHashMap::default()),
            Err(MathError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported() {
        assert!(Expression::parse("A = 1").is_err());
        assert!(matches!(
            Expression::parse("frobnicate(A)"),
            Err(MathError::UnknownFunction { .. })
        ));
        assert!(matches!(Expression::parse("1 +"), Err(MathError::Parse { .. })));
        assert!(matches!(Expression::parse("A B"), Err(MathError::Parse { .. })));
    }
}
