//! The expression evaluator.
//!
//! One pass over source text, fused parse+eval: every precedence level is
//! one method that parses its own operators and calls the next tighter
//! level, evaluating as it goes. There is no AST; an expression is
//! re-parsed each time it is evaluated.
//!
//! Short-circuiting works through the `evaluate` flag: an untaken branch
//! is parsed with `evaluate = false`, which validates syntax, consumes the
//! text, and yields `Value::Unknown` without touching variables or raising
//! semantic errors.
//!
//! The ladder, loosest first: ternary `?:` and coalescing `??`, `||`,
//! `&&`, comparisons, additive, multiplicative, unary leaders + primary +
//! postfix chain (index, slice, member, call, method sugar).

use std::rc::Rc;

use veil_value::{scan_float, scan_number, str_to_float, BlobHandle, DictHandle, Value};

use crate::error::{self, Result};
use crate::func::CallArgs;
use crate::interp::Interpreter;
use crate::lex::{self, Scanner};
use crate::stack::ensure_sufficient_stack;

/// Binary operator shared by expressions and compound assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Match,
    NoMatch,
    Is,
    IsNot,
}

/// One in-progress evaluation over a source string.
pub(crate) struct ExprEval<'i> {
    interp: &'i Interpreter,
    scan: Scanner<'i>,
}

impl<'i> ExprEval<'i> {
    pub(crate) fn new(interp: &'i Interpreter, src: &'i str) -> ExprEval<'i> {
        ExprEval { interp, scan: Scanner::new(src) }
    }

    /// Evaluate the whole string; trailing input is a syntax error.
    pub(crate) fn eval_whole(&mut self) -> Result<Value> {
        self.scan.skip_ws();
        let start = self.scan.pos();
        let value = self.sub_expr(true).map_err(|e| e.at(start))?;
        self.scan.skip_ws();
        if !self.scan.at_end() {
            return Err(error::trailing(self.scan.rest(), self.scan.pos()));
        }
        Ok(value)
    }

    /// One full expression at the current position; used for nested
    /// expressions inside lvalue paths as well.
    pub(crate) fn sub_expr(&mut self, evaluate: bool) -> Result<Value> {
        self.eval_ternary(evaluate)
    }

    // Scanner passthroughs for the lvalue resolver.

    pub(crate) fn pos(&self) -> usize {
        self.scan.pos()
    }

    pub(crate) fn rest(&self) -> &'i str {
        self.scan.rest()
    }

    pub(crate) fn skip_ws(&mut self) {
        self.scan.skip_ws();
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.scan.peek()
    }

    pub(crate) fn eat(&mut self, ch: char) -> bool {
        self.scan.eat(ch)
    }

    pub(crate) fn expect(&mut self, ch: char, what: &str) -> Result<()> {
        self.scan.expect(ch, what)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.scan.at_end()
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.scan.advance(n);
    }

    // Precedence ladder

    /// `a ? b : c` (right-associative) and `a ?? b` null-coalescing.
    fn eval_ternary(&mut self, evaluate: bool) -> Result<Value> {
        let _depth = self.interp.expr_depth_guard()?;
        ensure_sufficient_stack(|| self.eval_ternary_inner(evaluate))
    }

    fn eval_ternary_inner(&mut self, evaluate: bool) -> Result<Value> {
        let value = self.eval_or(evaluate)?;
        self.scan.skip_ws();
        if self.scan.peek() != Some('?') {
            return Ok(value);
        }
        if self.scan.peek_at(1) == Some('?') {
            // Coalescing: the right side runs only when the left is Null.
            self.scan.advance(2);
            let take = evaluate && matches!(value, Value::Null);
            let right = self.eval_ternary(take)?;
            return Ok(if take { right } else { value });
        }

        self.scan.advance(1);
        let cond = if evaluate { value.truthy()? } else { false };
        let then_value = self.eval_ternary(evaluate && cond)?;
        self.scan.skip_ws();
        self.scan.expect(':', "':' after '?'")?;
        let else_value = self.eval_ternary(evaluate && !cond)?;
        if !evaluate {
            return Ok(Value::Unknown);
        }
        Ok(if cond { then_value } else { else_value })
    }

    /// `||`, short-circuit, chainable; result is Bool.
    fn eval_or(&mut self, evaluate: bool) -> Result<Value> {
        let first = self.eval_and(evaluate)?;
        self.scan.skip_ws();
        if !(self.scan.peek() == Some('|') && self.scan.peek_at(1) == Some('|')) {
            return Ok(first);
        }
        let mut truth = evaluate && first.truthy()?;
        loop {
            self.scan.advance(2);
            let rhs = self.eval_and(evaluate && !truth)?;
            if evaluate && !truth {
                truth = rhs.truthy()?;
            }
            self.scan.skip_ws();
            if !(self.scan.peek() == Some('|') && self.scan.peek_at(1) == Some('|')) {
                break;
            }
        }
        Ok(if evaluate { Value::Bool(truth) } else { Value::Unknown })
    }

    /// `&&`, short-circuit, chainable; result is Bool.
    fn eval_and(&mut self, evaluate: bool) -> Result<Value> {
        let first = self.eval_compare(evaluate)?;
        self.scan.skip_ws();
        if !(self.scan.peek() == Some('&') && self.scan.peek_at(1) == Some('&')) {
            return Ok(first);
        }
        let mut truth = evaluate && first.truthy()?;
        loop {
            self.scan.advance(2);
            let rhs = self.eval_compare(evaluate && truth)?;
            if evaluate && truth {
                truth = rhs.truthy()?;
            }
            self.scan.skip_ws();
            if !(self.scan.peek() == Some('&') && self.scan.peek_at(1) == Some('&')) {
                break;
            }
        }
        Ok(if evaluate { Value::Bool(truth) } else { Value::Unknown })
    }

    /// One comparison (not chainable), with `#`/`?` case modifiers.
    fn eval_compare(&mut self, evaluate: bool) -> Result<Value> {
        let left = self.eval_add(evaluate)?;
        self.scan.skip_ws();
        let Some(op) = self.scan_cmp_op() else {
            return Ok(left);
        };
        let ignore_case = if self.scan.eat('#') {
            false
        } else if self.scan.eat('?') {
            true
        } else {
            self.interp.ignore_case.get()
        };
        let right = self.eval_add(evaluate)?;
        if !evaluate {
            return Ok(Value::Unknown);
        }
        self.compare(op, &left, &right, ignore_case)
    }

    fn scan_cmp_op(&mut self) -> Option<CmpOp> {
        let rest = self.scan.rest();
        let (op, len) = if rest.starts_with("==") {
            (CmpOp::Eq, 2)
        } else if rest.starts_with("!=") {
            (CmpOp::Ne, 2)
        } else if rest.starts_with("=~") {
            (CmpOp::Match, 2)
        } else if rest.starts_with("!~") {
            (CmpOp::NoMatch, 2)
        } else if rest.starts_with(">=") {
            (CmpOp::Ge, 2)
        } else if rest.starts_with("<=") {
            (CmpOp::Le, 2)
        } else if rest.starts_with('>') {
            (CmpOp::Gt, 1)
        } else if rest.starts_with('<') {
            (CmpOp::Lt, 1)
        } else if keyword_at(rest, "isnot") {
            (CmpOp::IsNot, 5)
        } else if keyword_at(rest, "is") {
            (CmpOp::Is, 2)
        } else {
            return None;
        };
        self.scan.advance(len);
        Some(op)
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value, ic: bool) -> Result<Value> {
        match op {
            CmpOp::Is | CmpOp::IsNot => {
                let same = values_identical(left, right, ic);
                Ok(Value::Bool(if op == CmpOp::Is { same } else { !same }))
            }
            CmpOp::Match | CmpOp::NoMatch => {
                let text = left.coerce_string()?;
                let pattern = right.coerce_string()?;
                let matched = self
                    .interp
                    .host
                    .pattern_matches(&pattern, &text, ic)
                    .map_err(error::host_error)?;
                Ok(Value::Bool(if op == CmpOp::Match { matched } else { !matched }))
            }
            CmpOp::Eq | CmpOp::Ne => {
                let equal = compare_equal(left, right, ic);
                Ok(Value::Bool(if op == CmpOp::Eq { equal } else { !equal }))
            }
            CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le => {
                let ordering = compare_order(left, right, ic)?;
                let ok = match ordering {
                    None => false,
                    Some(ord) => match op {
                        CmpOp::Gt => ord.is_gt(),
                        CmpOp::Ge => ord.is_ge(),
                        CmpOp::Lt => ord.is_lt(),
                        _ => ord.is_le(),
                    },
                };
                Ok(Value::Bool(ok))
            }
        }
    }

    /// `+`, `-`, and string concatenation `.`/`..`.
    ///
    /// The left operand is type-checked before the right one is
    /// evaluated, so a guaranteed error never triggers the right side's
    /// effects.
    fn eval_add(&mut self, evaluate: bool) -> Result<Value> {
        let mut left = self.eval_mult(evaluate)?;
        loop {
            self.scan.skip_ws();
            let op = match self.scan.peek() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                Some('.') if self.scan.peek_at(1) != Some('=') => BinOp::Concat,
                _ => break,
            };
            self.scan.advance(1);
            if op == BinOp::Concat {
                // `..` is the two-char spelling of the same operator.
                let _ = self.scan.eat('.');
            }
            if evaluate {
                precheck_left(op, &left)?;
            }
            let right = self.eval_mult(evaluate)?;
            if evaluate {
                left = apply_binop(self.interp, op, &left, &right)?;
            }
        }
        Ok(left)
    }

    /// `*`, `/`, `%` with float promotion and division sentinels.
    fn eval_mult(&mut self, evaluate: bool) -> Result<Value> {
        let mut left = self.eval_unary(evaluate)?;
        loop {
            self.scan.skip_ws();
            let op = match self.scan.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                Some('%') => BinOp::Mod,
                _ => break,
            };
            self.scan.advance(1);
            let right = self.eval_unary(evaluate)?;
            if evaluate {
                left = apply_binop(self.interp, op, &left, &right)?;
            }
        }
        Ok(left)
    }

    /// Unary leaders, the primary, and its postfix chain.
    ///
    /// Leaders apply after the postfix chain, right to left, except that a
    /// numeric literal consumes adjacent sign leaders directly (so
    /// `-1->f()` passes `-1` to `f`).
    fn eval_unary(&mut self, evaluate: bool) -> Result<Value> {
        self.scan.skip_ws();
        let mut leaders: Vec<char> = Vec::new();
        while let Some(ch) = self.scan.peek() {
            if ch == '!' || ch == '-' || ch == '+' {
                leaders.push(ch);
                self.scan.advance(1);
                self.scan.skip_ws();
            } else {
                break;
            }
        }

        let mut numeric_literal = false;
        let mut value = self.eval_primary(evaluate, &mut numeric_literal)?;

        if numeric_literal {
            while let Some(&leader) = leaders.last() {
                if leader == '-' {
                    value = negate(&value)?;
                } else if leader != '+' {
                    break;
                }
                leaders.pop();
            }
        }

        value = self.postfix_chain(value, evaluate)?;

        if evaluate {
            for leader in leaders.iter().rev() {
                value = match leader {
                    '!' => Value::Bool(!value.truthy()?),
                    '-' => negate(&value)?,
                    _ => match value {
                        Value::Number(_) | Value::Float(_) => value,
                        other => Value::Number(other.to_number()?),
                    },
                };
            }
        }
        Ok(value)
    }

    fn eval_primary(&mut self, evaluate: bool, numeric_literal: &mut bool) -> Result<Value> {
        self.scan.skip_ws();
        let pos = self.scan.pos();
        match self.scan.peek() {
            None => Err(error::syntax("unexpected end of expression", pos)),
            Some(ch) if ch.is_ascii_digit() => {
                *numeric_literal = true;
                self.scan_numeric()
            }
            Some('"') => {
                let (text, used) = lex::scan_double_quoted(self.scan.rest(), pos)?;
                self.scan.advance(used);
                Ok(Value::str(text))
            }
            Some('\'') => {
                let (text, used) = lex::scan_single_quoted(self.scan.rest(), pos)?;
                self.scan.advance(used);
                Ok(Value::str(text))
            }
            Some('$') => {
                if matches!(self.scan.peek_at(1), Some('"' | '\'')) {
                    self.interp_string(evaluate)
                } else {
                    self.scan.advance(1);
                    let len = lex::ident_len(self.scan.rest());
                    if len == 0 {
                        return Err(error::syntax("missing environment variable name", pos));
                    }
                    let name = &self.scan.rest()[..len];
                    self.scan.advance(len);
                    Ok(Value::str(std::env::var(name).unwrap_or_default()))
                }
            }
            Some('[') => self.list_literal(evaluate),
            Some('{') => {
                if let Some(lambda) = self.try_lambda(evaluate)? {
                    Ok(lambda)
                } else {
                    self.dict_literal(evaluate, false)
                }
            }
            Some('#') if self.scan.peek_at(1) == Some('{') => {
                self.scan.advance(1);
                self.dict_literal(evaluate, true)
            }
            Some('&') => self.option_ref(evaluate),
            Some('@') => {
                self.scan.advance(1);
                let Some(reg) = self.scan.bump() else {
                    return Err(error::syntax("missing register name", pos));
                };
                Ok(Value::str(self.interp.host.get_register(reg).unwrap_or_default()))
            }
            Some('(') => {
                self.scan.advance(1);
                let value = self.eval_ternary(evaluate)?;
                self.scan.skip_ws();
                self.scan.expect(')', "closing ')'")?;
                Ok(value)
            }
            Some(ch) if lex::is_ident_start(ch) => self.name_or_call(evaluate),
            Some(ch) => Err(error::syntax(format!("unexpected '{ch}'"), pos)),
        }
    }

    /// Number, float, or blob literal; the cursor is on a digit.
    fn scan_numeric(&mut self) -> Result<Value> {
        let rest = self.scan.rest();
        if rest.len() >= 2 && rest[..2].eq_ignore_ascii_case("0z") {
            let (bytes, used) = lex::scan_blob(rest, self.scan.pos())?;
            self.scan.advance(used);
            return Ok(Value::Blob(BlobHandle::new(bytes)));
        }
        if let Some((value, used)) = scan_float(rest) {
            self.scan.advance(used);
            return Ok(Value::Float(value));
        }
        let scanned = scan_number(rest);
        self.scan.advance(scanned.len);
        Ok(Value::Number(scanned.value))
    }

    /// `$"..."` / `$'...'` with `{expr}` interpolation spans.
    fn interp_string(&mut self, evaluate: bool) -> Result<Value> {
        let start = self.scan.pos();
        self.scan.advance(1);
        let quote = self.scan.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            let Some(ch) = self.scan.peek() else {
                return Err(error::unterminated("string", start));
            };
            match ch {
                '{' => {
                    if self.scan.peek_at(1) == Some('{') {
                        out.push('{');
                        self.scan.advance(2);
                    } else {
                        self.scan.advance(1);
                        let span = self.eval_ternary(evaluate)?;
                        self.scan.skip_ws();
                        self.scan.expect('}', "closing '}' in interpolation")?;
                        if evaluate {
                            out.push_str(&span.coerce_string()?);
                        }
                    }
                }
                '}' => {
                    if self.scan.peek_at(1) == Some('}') {
                        out.push('}');
                        self.scan.advance(2);
                    } else {
                        return Err(error::syntax("unbalanced '}' in string", self.scan.pos()));
                    }
                }
                '\\' if quote == '"' => {
                    self.scan.advance(1);
                    let (decoded, used) = lex::decode_escape(self.scan.rest());
                    if used == 0 {
                        return Err(error::unterminated("string", start));
                    }
                    out.push_str(&decoded);
                    self.scan.advance(used);
                }
                '\'' if quote == '\'' => {
                    if self.scan.peek_at(1) == Some('\'') {
                        out.push('\'');
                        self.scan.advance(2);
                    } else {
                        self.scan.advance(1);
                        return Ok(Value::str(out));
                    }
                }
                '"' if quote == '"' => {
                    self.scan.advance(1);
                    return Ok(Value::str(out));
                }
                _ => {
                    out.push(ch);
                    self.scan.advance(ch.len_utf8());
                }
            }
        }
    }

    fn list_literal(&mut self, evaluate: bool) -> Result<Value> {
        self.scan.advance(1);
        let mut items = Vec::new();
        self.scan.skip_ws();
        if !self.scan.eat(']') {
            loop {
                let item = self.eval_ternary(evaluate)?;
                if evaluate {
                    items.push(item);
                }
                self.scan.skip_ws();
                if self.scan.eat(',') {
                    self.scan.skip_ws();
                    if self.scan.eat(']') {
                        break;
                    }
                } else {
                    self.scan.expect(']', "closing ']' in list")?;
                    break;
                }
            }
        }
        if !evaluate {
            return Ok(Value::Unknown);
        }
        Ok(Value::List(self.interp.heap.new_list(items)))
    }

    /// `{'k': v}` or, with `bare_keys`, `#{k: v}`.
    fn dict_literal(&mut self, evaluate: bool, bare_keys: bool) -> Result<Value> {
        self.scan.advance(1);
        let mut entries: Vec<(Rc<str>, Value)> = Vec::new();
        self.scan.skip_ws();
        if !self.scan.eat('}') {
            loop {
                self.scan.skip_ws();
                let key: Option<Rc<str>> = if bare_keys {
                    let len = self
                        .scan
                        .rest()
                        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                        .unwrap_or(self.scan.rest().len());
                    if len == 0 {
                        return Err(error::syntax("missing dictionary key", self.scan.pos()));
                    }
                    let key = Rc::from(&self.scan.rest()[..len]);
                    self.scan.advance(len);
                    Some(key)
                } else {
                    let key = self.eval_ternary(evaluate)?;
                    if evaluate { Some(key.coerce_string()?) } else { None }
                };
                self.scan.skip_ws();
                self.scan.expect(':', "':' after dictionary key")?;
                let value = self.eval_ternary(evaluate)?;
                if evaluate {
                    if let Some(key) = key {
                        if entries.iter().any(|(k, _)| **k == *key) {
                            return Err(error::syntax(
                                format!("duplicate key in dictionary: {key}"),
                                self.scan.pos(),
                            ));
                        }
                        entries.push((key, value));
                    }
                }
                self.scan.skip_ws();
                if self.scan.eat(',') {
                    self.scan.skip_ws();
                    if self.scan.eat('}') {
                        break;
                    }
                } else {
                    self.scan.expect('}', "closing '}' in dictionary")?;
                    break;
                }
            }
        }
        if !evaluate {
            return Ok(Value::Unknown);
        }
        Ok(Value::Dict(self.interp.heap.new_dict(entries)))
    }

    /// `{a, b -> expr}`; `None` when the braces are not a lambda, with the
    /// cursor restored.
    fn try_lambda(&mut self, evaluate: bool) -> Result<Option<Value>> {
        let start = self.scan.pos();
        self.scan.advance(1);
        let mut params: Vec<Rc<str>> = Vec::new();
        self.scan.skip_ws();
        loop {
            let len = lex::ident_len(self.scan.rest());
            if len == 0 {
                break;
            }
            params.push(Rc::from(&self.scan.rest()[..len]));
            self.scan.advance(len);
            self.scan.skip_ws();
            if !self.scan.eat(',') {
                break;
            }
            self.scan.skip_ws();
        }
        if !self.scan.eat_str("->") {
            self.scan.set_pos(start);
            return Ok(None);
        }

        // The body is parsed (not evaluated) here to find its extent; it
        // re-parses on every call.
        self.scan.skip_ws();
        let body_start = self.scan.pos();
        self.sub_expr(false)?;
        let body_end = self.scan.pos();
        self.scan.skip_ws();
        self.scan.expect('}', "closing '}' in lambda")?;
        if !evaluate {
            return Ok(Some(Value::Unknown));
        }

        let body = self.scan.slice(body_start, body_end);
        let name = self.interp.register_lambda(params, body);
        Ok(Some(Value::Func(name)))
    }

    /// `&name`, `&g:name`, `&l:name`.
    fn option_ref(&mut self, evaluate: bool) -> Result<Value> {
        self.scan.advance(1);
        let scope = if self.scan.eat_str("g:") {
            crate::host::OptionScope::Global
        } else if self.scan.eat_str("l:") {
            crate::host::OptionScope::Local
        } else {
            crate::host::OptionScope::Auto
        };
        let len = lex::ident_len(self.scan.rest());
        if len == 0 {
            return Err(error::syntax("missing option name", self.scan.pos()));
        }
        let name = &self.scan.rest()[..len];
        self.scan.advance(len);
        if !evaluate {
            return Ok(Value::Unknown);
        }
        self.interp
            .host
            .get_option(name, scope)
            .ok_or_else(|| error::unknown_option(name))
    }

    /// Identifier: variable reference or function call, with curly-brace
    /// name expansion.
    fn name_or_call(&mut self, evaluate: bool) -> Result<Value> {
        let name = self.parse_name(evaluate)?;
        if self.scan.peek() == Some('(') {
            let args = self.parse_call_args(evaluate)?;
            let Some(name) = name else {
                return Ok(Value::Unknown);
            };
            if !evaluate {
                return Ok(Value::Unknown);
            }
            let callee = self.deref_callable(&name);
            return self.interp.call(&callee, args, None);
        }
        let Some(name) = name else {
            return Ok(Value::Unknown);
        };
        if !evaluate {
            return Ok(Value::Unknown);
        }
        self.interp.get_var(&name)
    }

    /// A possibly scope-prefixed name with `{expr}` expansion segments.
    /// Returns `None` when the name cannot be known because an expansion
    /// span was skipped (`evaluate = false`).
    pub(crate) fn parse_name(&mut self, evaluate: bool) -> Result<Option<String>> {
        let mut name = String::new();
        let rest = self.scan.rest();
        // Scope marker: single letter plus ':'.
        if rest.len() >= 2
            && matches!(rest.as_bytes()[0], b'g' | b'b' | b'w' | b't' | b's' | b'l' | b'a' | b'v')
            && rest.as_bytes()[1] == b':'
        {
            name.push_str(&rest[..2]);
            self.scan.advance(2);
        }
        let mut known = true;
        loop {
            let rest = self.scan.rest();
            let len = rest
                .find(|c: char| !lex::is_ident_char(c))
                .unwrap_or(rest.len());
            name.push_str(&rest[..len]);
            self.scan.advance(len);
            if self.scan.peek() == Some('{') {
                // Curly-brace expansion: evaluate, stringify, splice.
                self.scan.advance(1);
                let span = self.eval_ternary(evaluate)?;
                self.scan.skip_ws();
                self.scan.expect('}', "closing '}' in name")?;
                if evaluate {
                    name.push_str(&span.coerce_string()?);
                } else {
                    known = false;
                }
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(error::syntax("missing name", self.scan.pos()));
        }
        Ok(if known { Some(name) } else { None })
    }

    /// Resolve a call target: a variable holding a callable wins over the
    /// bare function name.
    fn deref_callable(&self, name: &str) -> Value {
        match self.interp.get_var(name) {
            Ok(value) if value.is_callable() => value,
            Ok(Value::Str(s)) => Value::Func(s),
            _ => Value::Func(Rc::from(name)),
        }
    }

    /// `(arg, arg, ...)` with every argument evaluated left to right.
    fn parse_call_args(&mut self, evaluate: bool) -> Result<CallArgs> {
        self.scan.expect('(', "'('")?;
        let mut args = CallArgs::new();
        self.scan.skip_ws();
        if self.scan.eat(')') {
            return Ok(args);
        }
        loop {
            let arg = self.eval_ternary(evaluate)?;
            args.push(arg);
            self.scan.skip_ws();
            if self.scan.eat(',') {
                self.scan.skip_ws();
            } else {
                self.scan.expect(')', "closing ')' in call")?;
                break;
            }
        }
        Ok(args)
    }

    /// Postfix chain: `[idx]`, `[a : b]`, `.key`, `(args)`, `->m(args)`.
    fn postfix_chain(&mut self, mut value: Value, evaluate: bool) -> Result<Value> {
        let mut from_dict: Option<DictHandle> = None;
        loop {
            match self.scan.peek() {
                Some('[') => {
                    value = self.eval_index(value, evaluate)?;
                    from_dict = None;
                }
                Some('.') if is_member_access(&value, self.scan.peek_at(1)) => {
                    self.scan.advance(1);
                    let len = lex::ident_len(self.scan.rest());
                    let key = self.scan.rest()[..len].to_owned();
                    self.scan.advance(len);
                    let Value::Dict(dict) = &value else {
                        return Err(error::not_indexable(value.kind_name()));
                    };
                    let item = dict.get(&key).ok_or_else(|| error::undefined_key(&key))?;
                    from_dict = Some(dict.clone());
                    value = item;
                }
                Some('(') if value.is_callable() || matches!(value, Value::Unknown) => {
                    let args = self.parse_call_args(evaluate)?;
                    value = if evaluate {
                        self.interp.call(&value, args, from_dict.take())?
                    } else {
                        Value::Unknown
                    };
                    from_dict = None;
                }
                _ => {
                    // `->` method sugar, with whitespace allowed before it.
                    let mark = self.scan.pos();
                    self.scan.skip_ws();
                    if self.scan.eat_str("->") {
                        value = self.method_call(value, evaluate)?;
                        from_dict = None;
                    } else {
                        self.scan.set_pos(mark);
                        break;
                    }
                }
            }
        }
        Ok(value)
    }

    /// `recv->name(args)` and `recv->{lambda}(args)`: the receiver becomes
    /// the first argument; a dictionary receiver is auto-bound as `self`
    /// unless the callee already binds one.
    fn method_call(&mut self, receiver: Value, evaluate: bool) -> Result<Value> {
        self.scan.skip_ws();
        let callee = match self.scan.peek() {
            Some('{') => {
                let Some(lambda) = self.try_lambda(evaluate)? else {
                    return Err(error::syntax("expected lambda after '->'", self.scan.pos()));
                };
                lambda
            }
            Some('(') => {
                self.scan.advance(1);
                let value = self.eval_ternary(evaluate)?;
                self.scan.skip_ws();
                self.scan.expect(')', "closing ')'")?;
                value
            }
            _ => {
                let Some(name) = self.parse_name(evaluate)? else {
                    return Ok(Value::Unknown);
                };
                if evaluate { self.deref_callable(&name) } else { Value::Unknown }
            }
        };
        let mut args = self.parse_call_args(evaluate)?;
        if !evaluate {
            return Ok(Value::Unknown);
        }
        let self_dict = match &receiver {
            Value::Dict(dict) => Some(dict.clone()),
            _ => None,
        };
        args.insert(0, receiver);
        self.interp.call(&callee, args, self_dict)
    }

    /// `[idx]` or `[a : b]` on the current value.
    fn eval_index(&mut self, value: Value, evaluate: bool) -> Result<Value> {
        self.scan.advance(1);
        self.scan.skip_ws();
        let mut lower: Option<Value> = None;
        let mut slice = false;
        if self.scan.eat(':') {
            slice = true;
        } else {
            lower = Some(self.eval_ternary(evaluate)?);
            self.scan.skip_ws();
            if self.scan.eat(':') {
                slice = true;
            }
        }
        let upper = if slice {
            self.scan.skip_ws();
            if self.scan.peek() == Some(']') {
                None
            } else {
                Some(self.eval_ternary(evaluate)?)
            }
        } else {
            None
        };
        self.scan.skip_ws();
        self.scan.expect(']', "closing ']'")?;
        if !evaluate {
            return Ok(Value::Unknown);
        }
        if slice {
            let lo = lower.map(|v| v.to_number()).transpose()?;
            let hi = upper.map(|v| v.to_number()).transpose()?;
            slice_value(self.interp, &value, lo, hi)
        } else {
            let idx = lower.unwrap_or(Value::Number(0));
            index_value(&value, &idx)
        }
    }
}

/// True when `word` starts `rest` and ends at a word boundary.
fn keyword_at(rest: &str, word: &str) -> bool {
    rest.starts_with(word)
        && !rest[word.len()..].starts_with(|c: char| lex::is_ident_char(c))
}

/// `.key` member access applies to dictionaries when an identifier
/// follows; everything else leaves the dot for string concatenation.
fn is_member_access(value: &Value, next: Option<char>) -> bool {
    matches!(value, Value::Dict(_)) && next.is_some_and(lex::is_ident_start)
}

/// Identity comparison for `is`/`isnot`: instance identity for
/// containers, function identity for callables, value equality for
/// scalars of the same dynamic type.
fn values_identical(left: &Value, right: &Value, ic: bool) -> bool {
    if let Some(same) = left.same_instance(right) {
        return same;
    }
    match (left, right) {
        (Value::Partial(a), Value::Partial(b)) => a.ptr_eq(b),
        (Value::Func(a), Value::Func(b)) => a == b,
        _ => {
            left.type_code() == right.type_code()
                && !matches!(left, Value::List(_) | Value::Dict(_) | Value::Blob(_))
                && veil_value::values_equal(left, right, ic)
        }
    }
}

/// `==`-family equality: numeric coercion across Number/Bool/Str, float
/// promotion, structural container equality; mismatched kinds are simply
/// unequal.
fn compare_equal(left: &Value, right: &Value, ic: bool) -> bool {
    match (left, right) {
        (Value::Float(_), Value::Str(s)) | (Value::Str(s), Value::Float(_)) => {
            let other = if matches!(left, Value::Float(_)) { left } else { right };
            let Ok(f) = other.to_float() else { return false };
            str_to_float(s).0.partial_cmp(&f) == Some(std::cmp::Ordering::Equal)
        }
        (Value::Number(_) | Value::Bool(_), Value::Str(_))
        | (Value::Str(_), Value::Number(_) | Value::Bool(_)) => {
            match (left.to_number(), right.to_number()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        _ => veil_value::values_equal(left, right, ic),
    }
}

/// Ordering for `<`/`>`-family operators; `None` when unordered (NaN).
/// Containers and callables refuse.
fn compare_order(left: &Value, right: &Value, ic: bool) -> Result<Option<std::cmp::Ordering>> {
    for side in [left, right] {
        if matches!(
            side,
            Value::List(_) | Value::Dict(_) | Value::Blob(_) | Value::Func(_) | Value::Partial(_)
        ) {
            return Err(error::wrong_operand("comparison", side.kind_name()));
        }
    }
    if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
        let a = order_float(left)?;
        let b = order_float(right)?;
        return Ok(a.partial_cmp(&b));
    }
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(Some(if ic {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.as_ref().cmp(b.as_ref())
        }));
    }
    Ok(Some(left.to_number()?.cmp(&right.to_number()?)))
}

/// Float coercion for ordered comparison: strings parse leniently.
fn order_float(value: &Value) -> Result<f64> {
    match value {
        Value::Str(s) => Ok(str_to_float(s).0),
        other => Ok(other.to_float()?),
    }
}

fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => Ok(Value::Number(n.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Ok(Value::Number(other.to_number()?.wrapping_neg())),
    }
}

/// Left-operand check performed before the right operand is evaluated.
fn precheck_left(op: BinOp, left: &Value) -> Result<()> {
    match op {
        BinOp::Concat => {
            left.coerce_string()?;
            Ok(())
        }
        BinOp::Add => match left {
            Value::Dict(_) | Value::Func(_) | Value::Partial(_) | Value::Unknown => {
                Err(error::wrong_operand("+", left.kind_name()))
            }
            _ => Ok(()),
        },
        _ => match left {
            Value::List(_) | Value::Blob(_) | Value::Dict(_) | Value::Func(_) | Value::Partial(_) => {
                Err(error::wrong_operand("-", left.kind_name()))
            }
            _ => Ok(()),
        },
    }
}

/// Apply a binary operator; shared with compound assignment.
pub(crate) fn apply_binop(interp: &Interpreter, op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinOp::Concat => {
            let mut out = left.coerce_string()?.to_string();
            out.push_str(&right.coerce_string()?);
            Ok(Value::str(out))
        }
        BinOp::Add => match (left, right) {
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.concat(b, &interp.heap))),
            (Value::Blob(a), Value::Blob(b)) => Ok(Value::Blob(a.concat(b))),
            (Value::List(_) | Value::Blob(_), other) | (other, Value::List(_) | Value::Blob(_)) => {
                Err(error::wrong_operand("+", other.kind_name()))
            }
            _ => numeric_binop(op, left, right),
        },
        _ => numeric_binop(op, left, right),
    }
}

fn numeric_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    let float = matches!(left, Value::Float(_)) || matches!(right, Value::Float(_));
    if float {
        if op == BinOp::Mod {
            return Err(error::type_error("cannot use % with a Float"));
        }
        let a = binop_float(left)?;
        let b = binop_float(right)?;
        let out = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            // IEEE already yields NaN for 0/0 and signed infinity otherwise.
            BinOp::Div => a / b,
            _ => unreachable!("Mod and Concat handled above"),
        };
        return Ok(Value::Float(out));
    }
    let a = left.to_number()?;
    let b = right.to_number()?;
    let out = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => divide_i64(a, b),
        BinOp::Mod => modulo_i64(a, b),
        BinOp::Concat => unreachable!("Concat handled above"),
    };
    Ok(Value::Number(out))
}

/// Coerce one side of a float-promoted operation.
fn binop_float(value: &Value) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        other => {
            #[expect(clippy::cast_precision_loss, reason = "script semantics: promotion is lossy past 2^53")]
            let promoted = other.to_number()? as f64;
            Ok(promoted)
        }
    }
}

/// Integer division that never traps: division by zero yields a sentinel
/// biased by the dividend's sign, and the one overflow case saturates.
pub(crate) fn divide_i64(a: i64, b: i64) -> i64 {
    if b == 0 {
        if a == 0 {
            i64::MIN
        } else if a > 0 {
            i64::MAX
        } else {
            -i64::MAX
        }
    } else if a == i64::MIN && b == -1 {
        i64::MAX
    } else {
        a.wrapping_div(b)
    }
}

/// Integer modulus; by zero yields zero, never traps.
pub(crate) fn modulo_i64(a: i64, b: i64) -> i64 {
    if b == 0 {
        0
    } else {
        a.wrapping_rem(b)
    }
}

/// Single-element indexing. Strings index by byte and yield an empty
/// string out of range or for negative indices (carried quirk); lists and
/// blobs wrap negative indices and error out of range.
pub(crate) fn index_value(value: &Value, index: &Value) -> Result<Value> {
    match value {
        Value::List(list) => {
            let idx = index.to_number()?;
            list.get(idx).ok_or_else(|| error::list_index(idx))
        }
        Value::Dict(dict) => {
            let key = index.coerce_string()?;
            dict.get(&key).ok_or_else(|| error::undefined_key(&key))
        }
        Value::Blob(blob) => {
            let idx = index.to_number()?;
            blob.get(idx).map(|b| Value::Number(i64::from(b))).ok_or_else(|| error::blob_index(idx))
        }
        Value::Str(s) => {
            let idx = index.to_number()?;
            let byte = usize::try_from(idx).ok().and_then(|i| s.as_bytes().get(i).copied());
            Ok(match byte {
                Some(b) => Value::str(latin1_char(b)),
                None => Value::str(""),
            })
        }
        other => Err(error::not_indexable(other.kind_name())),
    }
}

/// `[a : b]` slicing with inclusive bounds, negative wrap, and clamping.
pub(crate) fn slice_value(
    interp: &Interpreter,
    value: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
) -> Result<Value> {
    let len = match value {
        Value::List(list) => list.len(),
        Value::Blob(blob) => blob.len(),
        Value::Str(s) => s.len(),
        other => return Err(error::not_indexable(other.kind_name())),
    };
    let (start, end) = slice_bounds(len, lower, upper);
    Ok(match value {
        Value::List(list) => Value::List(list.slice(start, end, &interp.heap)),
        Value::Blob(blob) => Value::Blob(blob.slice(start, end)),
        Value::Str(s) => {
            let bytes = &s.as_bytes()[start.min(len)..end.min(len)];
            Value::str(String::from_utf8_lossy(bytes))
        }
        _ => unreachable!("kinds checked above"),
    })
}

/// Resolve inclusive slice bounds against `len`: negative indices count
/// from the end, out-of-range bounds clamp, inverted ranges come out
/// empty. Returns an exclusive-end byte/item range.
pub(crate) fn slice_bounds(len: usize, lower: Option<i64>, upper: Option<i64>) -> (usize, usize) {
    let n = i64::try_from(len).unwrap_or(i64::MAX);
    let lo = match lower {
        None => 0,
        Some(i) if i < 0 => (i + n).max(0),
        Some(i) => i,
    };
    let hi = match upper {
        None => n - 1,
        Some(i) if i < 0 => i + n,
        Some(i) => i.min(n - 1),
    };
    if lo > hi || lo >= n {
        return (0, 0);
    }
    let start = usize::try_from(lo).unwrap_or(0);
    let end = usize::try_from(hi + 1).unwrap_or(0);
    (start, end)
}

/// One byte as a one-char string, Latin-1 style for non-ASCII.
fn latin1_char(byte: u8) -> String {
    char::from(byte).to_string()
}
