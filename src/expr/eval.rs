//! Tree-walking evaluator.
//!
//! Every snippet runs in its own [`Scope`] over the row's bindings.

use std::collections::HashMap;

use super::parser::{BinOp, CmpOp, Expr, Program, Stmt, UnaryOp};
use super::value::{MAX_SEQUENCE_LEN, Value, float_to_int};
use crate::error::ExprError;

/// Immutable name → value map built once per row.
pub type Bindings = HashMap<String, Value>;

// ── Scope ───────────────────────────────────────────────────────────

/// A mutable overlay on top of a shared base binding.
///
/// Writes and deletions land in the overlay only, so evaluating one field
/// never changes what another field's snippet sees.
pub struct Scope<'a> {
    base: &'a Bindings,
    /// `None` marks a name deleted from the overlay.
    locals: HashMap<String, Option<Value>>,
}

impl<'a> Scope<'a> {
    pub fn new(base: &'a Bindings) -> Self {
        Self {
            base,
            locals: HashMap::new(),
        }
    }

    fn get(&self, name: &str) -> Option<Value> {
        match self.locals.get(name) {
            Some(slot) => slot.clone(),
            None => self.base.get(name).cloned(),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), Some(value));
    }

    fn delete(&mut self, name: &str) -> Result<(), ExprError> {
        if self.get(name).is_none() {
            return Err(ExprError::Undefined(name.to_string()));
        }
        self.locals.insert(name.to_string(), None);
        Ok(())
    }

    fn require(&self, name: &str) -> Result<Value, ExprError> {
        self.get(name)
            .ok_or_else(|| ExprError::Undefined(name.to_string()))
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<(), ExprError> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ExprError> {
        match stmt {
            Stmt::Expr(expr) => {
                eval(expr, self)?;
            }
            Stmt::Assign { targets, value } => {
                let value = eval(value, self)?;
                for target in targets {
                    self.set(target, value.clone());
                }
            }
            Stmt::AugAssign { target, op, value } => {
                let current = self.require(target)?;
                let rhs = eval(value, self)?;
                let updated = binary(*op, &current, &rhs)?;
                self.set(target, updated);
            }
            Stmt::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let value = eval(value, self)?;
                    self.set(target, value);
                }
            }
            Stmt::If { branches, orelse } => {
                for (test, body) in branches {
                    if eval(test, self)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(orelse)?;
            }
            Stmt::For { var, iter, body } => {
                let items = iterate(eval(iter, self)?)?;
                for item in items {
                    self.set(var, item);
                    self.exec_block(body)?;
                }
            }
            Stmt::Pass => {}
            Stmt::Del(names) => {
                for name in names {
                    self.delete(name)?;
                }
            }
        }
        Ok(())
    }
}

// ── Programs ────────────────────────────────────────────────────────

/// Run `program` in a fresh scope over `base` and return the value of its
/// final statement.
///
/// A trailing expression yields its value; a trailing plain, augmented, or
/// annotated assignment yields the (first) target's value afterwards. Any
/// other trailing statement yields `None`, meaning "no value".
pub fn run_program(program: &Program, base: &Bindings) -> Result<Option<Value>, ExprError> {
    let mut scope = Scope::new(base);
    let Some((last, init)) = program.body.split_last() else {
        return Ok(None);
    };
    scope.exec_block(init)?;
    match last {
        Stmt::Expr(expr) => eval(expr, &scope).map(Some),
        Stmt::Assign { targets, .. } => {
            scope.exec(last)?;
            match targets.first() {
                Some(target) => scope.require(target).map(Some),
                None => Ok(None),
            }
        }
        Stmt::AugAssign { target, .. } | Stmt::AnnAssign { target, .. } => {
            scope.exec(last)?;
            scope.require(target).map(Some)
        }
        _ => {
            scope.exec(last)?;
            Ok(None)
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────

/// Evaluate an expression against `env`.
pub fn eval(expr: &Expr, env: &Scope<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => env
            .get(name)
            .ok_or_else(|| ExprError::Undefined(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Unary(op, operand) => {
            let v = eval(operand, env)?;
            match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Pos => v.neg()?.neg(),
                UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, env)?;
            let b = eval(rhs, env)?;
            binary(*op, &a, &b)
        }
        Expr::And(lhs, rhs) => {
            let a = eval(lhs, env)?;
            if a.truthy() { eval(rhs, env) } else { Ok(a) }
        }
        Expr::Or(lhs, rhs) => {
            let a = eval(lhs, env)?;
            if a.truthy() { Ok(a) } else { eval(rhs, env) }
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, env)?;
            for (op, rhs) in rest {
                let right = eval(rhs, env)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Conditional { test, body, orelse } => {
            if eval(test, env)?.truthy() {
                eval(body, env)
            } else {
                eval(orelse, env)
            }
        }
        Expr::Call(name, args) => {
            let args = eval_args(args, env)?;
            call_builtin(name, args)
        }
        Expr::Method {
            receiver,
            name,
            args,
        } => {
            let receiver = eval(receiver, env)?;
            let args = eval_args(args, env)?;
            call_method(&receiver, name, args)
        }
        Expr::Index(target, index) => {
            let target = eval(target, env)?;
            let index = eval(index, env)?;
            subscript(&target, &index)
        }
    }
}

fn eval_args(args: &[Expr], env: &Scope<'_>) -> Result<Vec<Value>, ExprError> {
    args.iter().map(|a| eval(a, env)).collect()
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, ExprError> {
    match op {
        BinOp::Add => a.add(b),
        BinOp::Sub => a.sub(b),
        BinOp::Mul => a.mul(b),
        BinOp::Div => a.div(b),
        BinOp::FloorDiv => a.floor_div(b),
        BinOp::Rem => a.rem(b),
        BinOp::Pow => a.pow(b),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ExprError> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => a.py_eq(b),
        CmpOp::Ne => !a.py_eq(b),
        CmpOp::Lt => a.py_cmp(b)? == Less,
        CmpOp::Le => a.py_cmp(b)? != Greater,
        CmpOp::Gt => a.py_cmp(b)? == Greater,
        CmpOp::Ge => a.py_cmp(b)? != Less,
        CmpOp::In => b.contains(a)?,
        CmpOp::NotIn => !b.contains(a)?,
        CmpOp::Is => std::mem::discriminant(a) == std::mem::discriminant(b) && a.py_eq(b),
        CmpOp::IsNot => !(std::mem::discriminant(a) == std::mem::discriminant(b) && a.py_eq(b)),
    })
}

/// Items produced by `for x in value`.
fn iterate(value: Value) -> Result<Vec<Value>, ExprError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(ExprError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize, ExprError> {
    let i = index.as_i64().ok_or_else(|| {
        ExprError::Type(format!(
            "{what} indices must be integers, not {}",
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(ExprError::Value(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn subscript(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match target {
        Value::List(items) => {
            let i = normalize_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        other => Err(ExprError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

// ── Builtins ────────────────────────────────────────────────────────

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExprError::Type(format!(
            "{name}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn int_arg(name: &str, v: &Value) -> Result<i64, ExprError> {
    v.as_i64().ok_or_else(|| {
        ExprError::Type(format!(
            "{name}() expected an integer, got {}",
            v.type_name()
        ))
    })
}

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(ExprError::Type(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(|v| v.to_string()).unwrap_or_default()))
        }
        "int" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Str(s)) => s.trim().parse().map(Value::Int).map_err(|_| {
                    ExprError::Value(format!("invalid literal for int(): '{s}'"))
                }),
                Some(Value::Float(x)) => float_to_int(*x).map(Value::Int),
                Some(v) => v.as_i64().map(Value::Int).ok_or_else(|| {
                    ExprError::Type(format!("int() argument must be a number or string, not '{}'", v.type_name()))
                }),
            }
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => s.trim().parse().map(Value::Float).map_err(|_| {
                    ExprError::Value(format!("could not convert string to float: '{s}'"))
                }),
                Some(v) => v.as_f64().map(Value::Float).ok_or_else(|| {
                    ExprError::Type(format!("float() argument must be a number or string, not '{}'", v.type_name()))
                }),
            }
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(x) => Ok(Value::Float(x.abs())),
                v => {
                    let n = int_arg(name, v)?;
                    n.checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| ExprError::Value("integer overflow".into()))
                }
            }
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let x = args[0].as_f64().ok_or_else(|| {
                ExprError::Type(format!("type {} doesn't define __round__", args[0].type_name()))
            })?;
            match args.get(1) {
                None => float_to_int(x.round_ties_even()).map(Value::Int),
                Some(digits) => {
                    let factor = 10f64.powi(int_arg(name, digits)? as i32);
                    Ok(Value::Float((x * factor).round_ties_even() / factor))
                }
            }
        }
        "min" | "max" => {
            let items = match args.as_slice() {
                [Value::List(items)] => items.clone(),
                [] => return Err(ExprError::Type(format!("{name} expected at least 1 argument"))),
                _ => args,
            };
            let mut iter = items.into_iter();
            let mut best = iter
                .next()
                .ok_or_else(|| ExprError::Value(format!("{name}() arg is an empty sequence")))?;
            for item in iter {
                let ord = item.py_cmp(&best)?;
                let better = if name == "min" {
                    ord == std::cmp::Ordering::Less
                } else {
                    ord == std::cmp::Ordering::Greater
                };
                if better {
                    best = item;
                }
            }
            Ok(best)
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            iterate(args[0].clone())?
                .iter()
                .try_fold(Value::Int(0), |acc, item| acc.add(item))
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| int_arg(name, a))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked above"),
            };
            if step == 0 {
                return Err(ExprError::Value("range() arg 3 must not be zero".into()));
            }
            // Widened so that the span of any two i64 bounds fits.
            let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
            let len = if step > 0 {
                (stop - start + step - 1).max(0) / step
            } else {
                (start - stop - step - 1).max(0) / -step
            };
            if len > MAX_SEQUENCE_LEN as i128 {
                return Err(ExprError::Value(format!("range() of {len} items is too large")));
            }
            (0..len)
                .map(|i| {
                    i64::try_from(start + i * step)
                        .map(Value::Int)
                        .map_err(|_| ExprError::Value("integer overflow".into()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        other => Err(ExprError::Undefined(other.to_string())),
    }
}

fn str_arg<'v>(method: &str, v: &'v Value) -> Result<&'v str, ExprError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ExprError::Type(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn call_method(receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    let Value::Str(s) = receiver else {
        return Err(ExprError::Type(format!(
            "'{}' object has no attribute '{name}'",
            receiver.type_name()
        )));
    };
    let strip_set = |args: &[Value]| -> Result<Option<Vec<char>>, ExprError> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(v) => Ok(Some(str_arg(name, v)?.chars().collect())),
        }
    };
    match name {
        "upper" => Ok(Value::Str(s.to_uppercase())),
        "lower" => Ok(Value::Str(s.to_lowercase())),
        "title" => Ok(Value::Str(title_case(s))),
        "strip" | "lstrip" | "rstrip" => {
            let set = strip_set(&args)?;
            let matches = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            Ok(Value::Str(match name {
                "strip" => s.trim_matches(matches).to_string(),
                "lstrip" => s.trim_start_matches(matches).to_string(),
                _ => s.trim_end_matches(matches).to_string(),
            }))
        }
        "startswith" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(str_arg(name, &args[0])?)))
        }
        "endswith" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(str_arg(name, &args[0])?)))
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            let from = str_arg(name, &args[0])?;
            let to = str_arg(name, &args[1])?;
            Ok(Value::Str(s.replace(from, to)))
        }
        "split" => {
            arity(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(ExprError::Value("empty separator".into()));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::List(parts))
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let parts = iterate(args[0].clone())?
                .iter()
                .map(|p| str_arg(name, p).map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(s)))
        }
        other => Err(ExprError::Type(format!("'str' object has no attribute '{other}'"))),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_program;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(src: &str, base: &Bindings) -> Result<Option<Value>, ExprError> {
        run_program(&parse_program(src).unwrap(), base)
    }

    #[test]
    fn trailing_expression_is_the_result() {
        let base = bindings(&[("n", Value::Int(4))]);
        assert_eq!(run("n * 2 + 1", &base).unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn trailing_assignment_returns_its_target() {
        let base = bindings(&[("first", Value::from("Ada")), ("last", Value::from("Lovelace"))]);
        let out = run("full = first + ' ' + last", &base).unwrap();
        assert_eq!(out, Some(Value::from("Ada Lovelace")));
    }

    #[test]
    fn trailing_augmented_assignment_returns_updated_target() {
        let base = bindings(&[("count", Value::Int(2))]);
        assert_eq!(run("count += 3", &base).unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn trailing_annotated_assignment_returns_target() {
        let base = Bindings::new();
        assert_eq!(run("x: int = 7", &base).unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn trailing_for_loop_yields_nothing() {
        let base = bindings(&[("name", Value::from("abc"))]);
        let out = run("n = 0\nfor c in name:\n    n += 1\n", &base).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn trailing_pass_and_if_yield_nothing() {
        let base = Bindings::new();
        assert_eq!(run("pass", &base).unwrap(), None);
        assert_eq!(run("if True: x = 1", &base).unwrap(), None);
        assert_eq!(run("", &base).unwrap(), None);
    }

    #[test]
    fn expression_evaluating_to_none_is_a_value() {
        let base = Bindings::new();
        assert_eq!(run("None", &base).unwrap(), Some(Value::None));
    }

    #[test]
    fn mutations_stay_in_the_overlay() {
        let base = bindings(&[("n", Value::Int(1))]);
        assert_eq!(run("n = n + 10\nn", &base).unwrap(), Some(Value::Int(11)));
        assert_eq!(run("n", &base).unwrap(), Some(Value::Int(1)));
        assert_eq!(base.get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn deleted_base_name_is_undefined_in_that_scope_only() {
        let base = bindings(&[("n", Value::Int(1))]);
        assert_eq!(
            run("del n\nn", &base).unwrap_err(),
            ExprError::Undefined("n".into())
        );
        assert_eq!(run("n", &base).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn undefined_name_is_reported() {
        let err = run("missing + 1", &Bindings::new()).unwrap_err();
        assert_eq!(err, ExprError::Undefined("missing".into()));
    }

    #[test]
    fn runtime_error_in_earlier_statement_propagates() {
        let err = run("x = 1 / 0\n'unreachable'", &Bindings::new()).unwrap_err();
        assert_eq!(err, ExprError::ZeroDivision);
    }

    #[test]
    fn conditionals_and_boolean_operators() {
        let base = bindings(&[("age", Value::Int(30)), ("nick", Value::from(""))]);
        assert_eq!(
            run("'adult' if age >= 18 else 'minor'", &base).unwrap(),
            Some(Value::from("adult"))
        );
        assert_eq!(run("nick or 'anon'", &base).unwrap(), Some(Value::from("anon")));
        assert_eq!(run("0 < age < 65", &base).unwrap(), Some(Value::Bool(true)));
    }

    #[test]
    fn string_methods_and_builtins() {
        let base = bindings(&[("email", Value::from("  Ada@Example.com "))]);
        assert_eq!(
            run("email.strip().lower().split('@')[1]", &base).unwrap(),
            Some(Value::from("example.com"))
        );
        assert_eq!(run("len(email.strip())", &base).unwrap(), Some(Value::Int(15)));
        assert_eq!(run("', '.join(['a', 'b'])", &base).unwrap(), Some(Value::from("a, b")));
        assert_eq!(run("round(2.5)", &base).unwrap(), Some(Value::Int(2)));
        assert_eq!(run("max(3, 9, 4)", &base).unwrap(), Some(Value::Int(9)));
        assert_eq!(run("sum(range(5))", &base).unwrap(), Some(Value::Int(10)));
        assert_eq!(run("'mr jones'.title()", &base).unwrap(), Some(Value::from("Mr Jones")));
    }

    #[test]
    fn unknown_builtin_is_undefined() {
        let err = run("frobnicate(1)", &Bindings::new()).unwrap_err();
        assert_eq!(err, ExprError::Undefined("frobnicate".into()));
    }

    #[test]
    fn oversized_repetition_is_a_value_error() {
        let base = Bindings::new();
        assert!(matches!(run("'x' * 10**18", &base), Err(ExprError::Value(_))));
        assert!(matches!(run("[1] * 10**18", &base), Err(ExprError::Value(_))));
        assert_eq!(run("'ab' * 2", &base).unwrap(), Some(Value::from("abab")));
        assert_eq!(run("[0] * -3", &base).unwrap(), Some(Value::List(Vec::new())));
    }

    #[test]
    fn range_over_the_full_integer_span_is_rejected() {
        let base = Bindings::new();
        let err = run("range(-9223372036854775807, 9223372036854775807)", &base).unwrap_err();
        assert!(matches!(err, ExprError::Value(ref m) if m.contains("too large")));
        assert_eq!(
            run("range(9223372036854775800, 9223372036854775807, 3)", &base).unwrap(),
            Some(Value::List(vec![
                Value::Int(9_223_372_036_854_775_800),
                Value::Int(9_223_372_036_854_775_803),
                Value::Int(9_223_372_036_854_775_806),
            ]))
        );
        assert_eq!(
            run("list_len = len(range(10, 0, -3))", &base).unwrap(),
            Some(Value::Int(4))
        );
    }

    #[test]
    fn non_finite_floats_do_not_become_integers() {
        let base = bindings(&[("big", Value::Float(f64::INFINITY)), ("nan", Value::Float(f64::NAN))]);
        assert!(matches!(run("round(big)", &base), Err(ExprError::Value(_))));
        assert!(matches!(run("round(nan)", &base), Err(ExprError::Value(_))));
        assert!(matches!(run("int(1e300)", &base), Err(ExprError::Value(_))));
        assert_eq!(run("int(-2.7)", &base).unwrap(), Some(Value::Int(-2)));
    }

    #[test]
    fn index_out_of_range_is_a_value_error() {
        let err = run("[1, 2][5]", &Bindings::new()).unwrap_err();
        assert!(matches!(err, ExprError::Value(_)));
    }
}
