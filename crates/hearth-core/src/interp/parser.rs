//! Recursive-descent parser producing [`Stmt`] lists.

use super::ast::*;
use super::error::Fault;
use super::lexer::{tokenize, Tok, Token};
use super::value::Value;
use std::rc::Rc;

/// Bracket nesting beyond this is rejected rather than risking the stack.
const MAX_NESTING: usize = 100;
const MAX_CHAIN: usize = 1000;

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "class", "lambda", "with", "yield", "from", "nonlocal", "async", "await",
];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "global", "if", "import", "in", "is", "not", "or", "pass",
    "raise", "return", "try", "while",
];

/// Parse a whole snippet.
pub fn parse_module(source: &str) -> Result<Vec<Stmt>, Fault> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_eof() {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        parser.statement(&mut body)?;
    }
    Ok(body)
}

/// Parse a single expression, used for f-string placeholders.
fn parse_expression(source: &str, line: usize) -> Result<Expr, Fault> {
    let mut tokens = tokenize(source.trim())?;
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.expr_list()?;
    parser.eat(&Tok::Newline);
    if !parser.at_eof() {
        return Err(Fault::syntax("f-string: invalid expression", line));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    loop_depth: usize,
    in_function: bool,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            loop_depth: 0,
            in_function: false,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_ahead(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> Fault {
        Fault::syntax(message, self.line())
    }

    fn unexpected(&self) -> Fault {
        let found = match self.peek() {
            Tok::Name(n) => format!("'{}'", n),
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            Tok::Str(_) | Tok::FStr(_) => "string".to_string(),
            Tok::Op(op) => format!("'{}'", op),
            Tok::Newline => "end of line".to_string(),
            Tok::Indent => "indent".to_string(),
            Tok::Dedent => "dedent".to_string(),
            Tok::Eof => "end of input".to_string(),
        };
        self.error(format!("invalid syntax (unexpected {})", found))
    }

    fn expect_op(&mut self, op: &str) -> Result<(), Fault> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), Fault> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", kw)))
        }
    }

    fn expect_name(&mut self) -> Result<String, Fault> {
        match self.peek().clone() {
            Tok::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_statement_end(&mut self) -> Result<(), Fault> {
        if self.eat(&Tok::Newline) || self.at_eof() || matches!(self.peek(), Tok::Dedent) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn enter(&mut self) -> Result<(), Fault> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error("too many nested parentheses"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    // ---- statements ----

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), Fault> {
        let line = self.line();
        if let Tok::Name(kw) = self.peek().clone() {
            if UNSUPPORTED_KEYWORDS.contains(&kw.as_str()) {
                return Err(self.error(format!("'{}' is not supported", kw)));
            }
            let compound = match kw.as_str() {
                "if" => Some(self.if_statement()?),
                "while" => Some(self.while_statement()?),
                "for" => Some(self.for_statement()?),
                "def" => Some(self.def_statement()?),
                "try" => Some(self.try_statement()?),
                _ => None,
            };
            if let Some(kind) = compound {
                out.push(Stmt { line, kind });
                return Ok(());
            }
        }

        loop {
            let line = self.line();
            let kind = self.simple_statement()?;
            out.push(Stmt { line, kind });
            if !self.eat_op(";") {
                break;
            }
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
        }
        self.expect_statement_end()
    }

    fn simple_statement(&mut self) -> Result<StmtKind, Fault> {
        if self.eat_kw("pass") {
            return Ok(StmtKind::Pass);
        }
        if self.check_kw("break") || self.check_kw("continue") {
            if self.loop_depth == 0 {
                let kw = if self.check_kw("break") { "break" } else { "continue" };
                return Err(self.error(format!("'{}' outside loop", kw)));
            }
            return Ok(match self.advance() {
                Tok::Name(kw) if kw == "break" => StmtKind::Break,
                _ => StmtKind::Continue,
            });
        }
        if self.check_kw("return") && !self.in_function {
            return Err(self.error("'return' outside function"));
        }
        if self.eat_kw("return") {
            if self.at_simple_end() {
                return Ok(StmtKind::Return(None));
            }
            return Ok(StmtKind::Return(Some(self.expr_list()?)));
        }
        if self.eat_kw("raise") {
            if self.at_simple_end() {
                return Ok(StmtKind::Raise(None));
            }
            return Ok(StmtKind::Raise(Some(self.expr()?)));
        }
        if self.eat_kw("assert") {
            let cond = self.expr()?;
            let message = if self.eat_op(",") {
                Some(self.expr()?)
            } else {
                None
            };
            return Ok(StmtKind::Assert { cond, message });
        }
        if self.eat_kw("del") {
            let mut targets = Vec::new();
            loop {
                let expr = self.expr()?;
                targets.push(self.to_target(expr)?);
                if !self.eat_op(",") {
                    break;
                }
            }
            return Ok(StmtKind::Del(targets));
        }
        if self.eat_kw("global") {
            let mut names = vec![self.expect_name()?];
            while self.eat_op(",") {
                names.push(self.expect_name()?);
            }
            return Ok(StmtKind::Global(names));
        }
        if self.eat_kw("import") {
            let mut modules = Vec::new();
            loop {
                let mut name = self.expect_name()?;
                while self.eat_op(".") {
                    name.push('.');
                    name.push_str(&self.expect_name()?);
                }
                let alias = if self.eat_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                modules.push((name, alias));
                if !self.eat_op(",") {
                    break;
                }
            }
            return Ok(StmtKind::Import(modules));
        }

        let first = self.expr_list()?;

        if let Some(op) = self.augmented_op() {
            let target = self.to_target(first)?;
            if matches!(target, Target::Unpack(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if self.check_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.expr_list()?);
            }
            let value = exprs.pop().ok_or_else(|| self.unexpected())?;
            let targets = exprs
                .into_iter()
                .map(|e| self.to_target(e))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(StmtKind::Assign { targets, value });
        }

        Ok(StmtKind::Expr(first))
    }

    fn at_simple_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Dedent) || self.check_op(";")
    }

    fn augmented_op(&mut self) -> Option<BinOp> {
        let op = match self.peek() {
            Tok::Op("+=") => BinOp::Add,
            Tok::Op("-=") => BinOp::Sub,
            Tok::Op("*=") => BinOp::Mul,
            Tok::Op("/=") => BinOp::Div,
            Tok::Op("//=") => BinOp::FloorDiv,
            Tok::Op("%=") => BinOp::Mod,
            Tok::Op("**=") => BinOp::Pow,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn to_target(&self, expr: Expr) -> Result<Target, Fault> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index(object, index) => Ok(Target::Index {
                object: *object,
                index: *index,
            }),
            Expr::Attr(object, name) => Ok(Target::Attr {
                object: *object,
                name,
            }),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<Result<_, _>>()?,
            )),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, Fault> {
        self.expect_op(":")?;
        let mut body = Vec::new();

        if !self.eat(&Tok::Newline) {
            // Single-line suite: `if x: y = 1`
            self.statement(&mut body)?;
            return Ok(body);
        }

        if !self.eat(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        while !self.eat(&Tok::Dedent) {
            if self.at_eof() {
                break;
            }
            if self.eat(&Tok::Newline) {
                continue;
            }
            self.statement(&mut body)?;
        }
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<StmtKind, Fault> {
        self.expect_kw("if")?;
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_kw("elif") {
                branches.push((self.expr()?, self.block()?));
            } else if self.eat_kw("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn while_statement(&mut self) -> Result<StmtKind, Fault> {
        self.expect_kw("while")?;
        let cond = self.expr()?;
        let body = self.loop_body()?;
        Ok(StmtKind::While { cond, body })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, Fault> {
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn for_statement(&mut self) -> Result<StmtKind, Fault> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.expr_list()?;
        let body = self.loop_body()?;
        Ok(StmtKind::For { target, iter, body })
    }

    /// Targets of `for` and comprehensions; stops before `in`.
    fn target_list(&mut self) -> Result<Target, Fault> {
        let first = self.atom_with_postfix()?;
        let mut targets = vec![self.to_target(first)?];
        let mut trailing_comma = false;
        while self.eat_op(",") {
            trailing_comma = true;
            if self.check_kw("in") {
                break;
            }
            let next = self.atom_with_postfix()?;
            targets.push(self.to_target(next)?);
            trailing_comma = false;
        }
        if targets.len() == 1 && !trailing_comma {
            return targets.pop().ok_or_else(|| self.unexpected());
        }
        Ok(Target::Unpack(targets))
    }

    fn def_statement(&mut self) -> Result<StmtKind, Fault> {
        self.expect_kw("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check_op(")") {
            let param = self.expect_name()?;
            if params.iter().any(|p| p.name == param) {
                return Err(self.error(format!(
                    "duplicate argument '{}' in function definition",
                    param
                )));
            }
            let default = if self.eat_op("=") {
                Some(self.expr()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error("non-default argument follows default argument"));
                }
                None
            };
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expr()?;
        }
        let saved = (self.loop_depth, self.in_function);
        self.loop_depth = 0;
        self.in_function = true;
        let body = self.block();
        (self.loop_depth, self.in_function) = saved;
        let body = body?;
        Ok(StmtKind::Def(Rc::new(FunctionDef {
            name: Rc::from(name.as_str()),
            params,
            body,
        })))
    }

    fn try_statement(&mut self) -> Result<StmtKind, Fault> {
        self.expect_kw("try")?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_kw("except") {
            if handlers
                .last()
                .is_some_and(|h: &Handler| h.class.is_none())
            {
                return Err(self.error("default 'except:' must be last"));
            }
            let class = if self.check_op(":") {
                None
            } else {
                Some(self.expr()?)
            };
            let name = if class.is_some() && self.eat_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(Handler { class, name, body });
        }
        let orelse = if !handlers.is_empty() && self.eat_kw("else") {
            self.block()?
        } else {
            Vec::new()
        };
        let finally = if self.eat_kw("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finally.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finally,
        })
    }

    // ---- expressions ----

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// makes a tuple.
    fn expr_list(&mut self) -> Result<Expr, Fault> {
        let first = self.expr()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expr_list_end() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expr_list_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Dedent)
            || ["=", ")", "]", "}", ";", ":"].iter().any(|op| self.check_op(op))
            || self.augmented_lookahead()
    }

    fn augmented_lookahead(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Op("+=" | "-=" | "*=" | "/=" | "//=" | "%=" | "**=")
        )
    }

    fn expr(&mut self) -> Result<Expr, Fault> {
        self.enter()?;
        let result = self.conditional();
        self.leave();
        result
    }

    fn conditional(&mut self) -> Result<Expr, Fault> {
        let then = self.or_test()?;
        if !self.check_kw("if") {
            return Ok(then);
        }
        self.advance();
        let cond = self.or_test()?;
        self.expect_kw("else")?;
        let orelse = self.expr()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            orelse: Box::new(orelse),
        })
    }

    fn or_test(&mut self) -> Result<Expr, Fault> {
        let mut left = self.and_test()?;
        let mut count = 0;
        while self.eat_kw("or") {
            self.chain_step(&mut count)?;
            let right = self.and_test()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, Fault> {
        let mut left = self.not_test()?;
        let mut count = 0;
        while self.eat_kw("and") {
            self.chain_step(&mut count)?;
            let right = self.not_test()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, Fault> {
        if self.eat_kw("not") {
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, Fault> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn compare_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().clone() {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::NotEq,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::LtE,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::GtE,
            Tok::Name(n) if n == "in" => CmpOp::In,
            Tok::Name(n) if n == "is" => {
                if matches!(self.peek_ahead(1), Tok::Name(m) if m == "not") {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            Tok::Name(n) if n == "not" => {
                if matches!(self.peek_ahead(1), Tok::Name(m) if m == "in") {
                    self.advance();
                    CmpOp::NotIn
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// Left-deep operator chains evaluate recursively, so their length is capped.
    fn chain_step(&self, count: &mut usize) -> Result<(), Fault> {
        *count += 1;
        if *count > MAX_CHAIN {
            return Err(self.error("expression too long"));
        }
        Ok(())
    }

    fn arith(&mut self) -> Result<Expr, Fault> {
        let mut left = self.term()?;
        let mut count = 0;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            self.chain_step(&mut count)?;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, Fault> {
        let mut left = self.factor()?;
        let mut count = 0;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            self.chain_step(&mut count)?;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, Fault> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Pos
        } else {
            return self.power();
        };
        self.enter()?;
        let operand = self.factor();
        self.leave();
        let operand = operand?;

        // Fold negative literals so `-9223372036854775808`-style constants and
        // `-1` previews stay literal.
        if op == UnaryOp::Neg {
            match &operand {
                Expr::Literal(Value::Int(i)) => {
                    if let Some(n) = i.checked_neg() {
                        return Ok(Expr::Literal(Value::Int(n)));
                    }
                }
                Expr::Literal(Value::Float(f)) => return Ok(Expr::Literal(Value::Float(-f))),
                _ => {}
            }
        }
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, Fault> {
        let base = self.atom_with_postfix()?;
        if self.eat_op("**") {
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent?)));
        }
        Ok(base)
    }

    fn atom_with_postfix(&mut self) -> Result<Expr, Fault> {
        let mut expr = self.atom()?;
        let mut count = 0;
        loop {
            if matches!(self.peek(), Tok::Op("(" | "[" | ".")) {
                self.chain_step(&mut count)?;
            }
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_op(".") {
                let name = match self.advance() {
                    Tok::Name(name) => name,
                    _ => return Err(self.error("expected attribute name")),
                };
                expr = Expr::Attr(Box::new(expr), name);
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, func: Expr) -> Result<Expr, Fault> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check_op(")") {
            let is_keyword = matches!(self.peek(), Tok::Name(_))
                && matches!(self.peek_ahead(1), Tok::Op("="));
            if is_keyword {
                let name = self.expect_name()?;
                self.expect_op("=")?;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument repeated: {}", name)));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.check_kw("for") {
                    // Bare generator argument: `sum(x for x in xs)`
                    args.push(self.comprehension_tail(arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> Result<Expr, Fault> {
        let start = if self.check_op(":") {
            None
        } else {
            let expr = self.expr_list()?;
            if !self.check_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let stop = if self.check_op(":") || self.check_op("]") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat_op(":") && !self.check_op("]") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice(start, stop, step))
    }

    fn comprehension_tail(&mut self, element: Expr) -> Result<Expr, Fault> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.or_test()?;
        let cond = if self.eat_kw("if") {
            Some(self.or_test()?)
        } else {
            None
        };
        if self.check_kw("for") {
            return Err(self.error("nested comprehensions are not supported"));
        }
        Ok(Expr::ListComp(Box::new(Comprehension {
            element,
            target,
            iter,
            cond,
        })))
    }

    fn atom(&mut self) -> Result<Expr, Fault> {
        let line = self.line();
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Tok::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Tok::Str(s) => {
                let mut text = s;
                let mut parts: Option<Vec<FPart>> = None;
                self.adjacent_strings(&mut text, &mut parts, line)?;
                Ok(match parts {
                    Some(parts) => Expr::FString(parts),
                    None => Expr::Literal(Value::from(text)),
                })
            }
            Tok::FStr(body) => {
                let mut parts = parse_fstring(&body, line)?;
                let mut text = String::new();
                let mut tail = Some(std::mem::take(&mut parts));
                self.adjacent_strings(&mut text, &mut tail, line)?;
                Ok(Expr::FString(tail.unwrap_or_default()))
            }
            Tok::Name(name) => match name.as_str() {
                "None" => Ok(Expr::Literal(Value::None)),
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    Err(self.error(format!("'{}' is not supported", kw)))
                }
                kw if KEYWORDS.contains(&kw) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Name(name)),
            },
            Tok::Op("(") => {
                self.enter()?;
                let result = self.paren_tail();
                self.leave();
                result
            }
            Tok::Op("[") => {
                self.enter()?;
                let result = self.list_tail();
                self.leave();
                result
            }
            Tok::Op("{") => {
                self.enter()?;
                let result = self.dict_tail();
                self.leave();
                result
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    /// Concatenate adjacent string literals; any f-string turns the whole
    /// run into an f-string.
    fn adjacent_strings(
        &mut self,
        text: &mut String,
        parts: &mut Option<Vec<FPart>>,
        line: usize,
    ) -> Result<(), Fault> {
        loop {
            match self.peek().clone() {
                Tok::Str(s) => {
                    self.advance();
                    match parts {
                        Some(p) => p.push(FPart::Literal(s)),
                        None => text.push_str(&s),
                    }
                }
                Tok::FStr(body) => {
                    self.advance();
                    let mut collected = parts.take().unwrap_or_else(|| {
                        if text.is_empty() {
                            Vec::new()
                        } else {
                            vec![FPart::Literal(std::mem::take(text))]
                        }
                    });
                    collected.extend(parse_fstring(&body, line)?);
                    *parts = Some(collected);
                }
                _ => return Ok(()),
            }
        }
    }

    fn paren_tail(&mut self) -> Result<Expr, Fault> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expr()?;
        if self.check_kw("for") {
            let comp = self.comprehension_tail(first)?;
            self.expect_op(")")?;
            return Ok(comp);
        }
        if self.eat_op(")") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op(")") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_tail(&mut self) -> Result<Expr, Fault> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.check_kw("for") {
            let comp = self.comprehension_tail(first)?;
            self.expect_op("]")?;
            return Ok(comp);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_tail(&mut self) -> Result<Expr, Fault> {
        let mut entries = Vec::new();
        while !self.check_op("}") {
            let key = self.expr()?;
            if !self.check_op(":") {
                return Err(self.error("set literals are not supported"));
            }
            self.advance();
            let value = self.expr()?;
            entries.push((key, value));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }
}

/// Split an f-string body into literal text and `{expr[!r][:spec]}` parts.
fn parse_fstring(body: &str, line: usize) -> Result<Vec<FPart>, Fault> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(Fault::syntax("f-string: single '}' is not allowed", line)),
            '{' => {
                if !literal.is_empty() {
                    parts.push(FPart::Literal(std::mem::take(&mut literal)));
                }
                i += 1;
                let start = i;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut expr_end = None;
                let mut conversion_at = None;
                let mut spec_at = None;

                while i < chars.len() {
                    let ch = chars[i];
                    if let Some(q) = quote {
                        if ch == q {
                            quote = None;
                        }
                    } else {
                        match ch {
                            '\'' | '"' => quote = Some(ch),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' => depth = depth.saturating_sub(1),
                            '}' if depth > 0 => depth -= 1,
                            '}' => {
                                expr_end.get_or_insert(i);
                                break;
                            }
                            '!' if depth == 0
                                && spec_at.is_none()
                                && chars.get(i + 1) != Some(&'=') =>
                            {
                                expr_end.get_or_insert(i);
                                conversion_at = Some(i + 1);
                            }
                            ':' if depth == 0 && spec_at.is_none() => {
                                expr_end.get_or_insert(i);
                                spec_at = Some(i + 1);
                            }
                            _ => {}
                        }
                    }
                    i += 1;
                }

                let close = i;
                if close >= chars.len() {
                    return Err(Fault::syntax("f-string: expecting '}'", line));
                }
                let end = expr_end.unwrap_or(close);
                let source: String = chars[start..end].iter().collect();
                if source.trim().is_empty() {
                    return Err(Fault::syntax("f-string: empty expression not allowed", line));
                }

                let repr = match conversion_at {
                    Some(at) => {
                        let conv_end = spec_at.map(|s| s - 1).unwrap_or(close);
                        let conv: String = chars[at..conv_end].iter().collect();
                        match conv.as_str() {
                            "r" => true,
                            "s" => false,
                            other => {
                                return Err(Fault::syntax(
                                    format!("f-string: invalid conversion character '{}'", other),
                                    line,
                                ))
                            }
                        }
                    }
                    None => false,
                };
                let spec = spec_at.map(|at| chars[at..close].iter().collect::<String>());

                parts.push(FPart::Expr {
                    expr: parse_expression(&source, line)?,
                    repr,
                    spec,
                });
                i = close + 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FPart::Literal(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Stmt> {
        parse_module(source).unwrap()
    }

    fn parse_err(source: &str) -> Fault {
        parse_module(source).unwrap_err()
    }

    #[test]
    fn test_assignment_chain() {
        let body = parse("a = b = 1");
        match &body[0].kind {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tuple_unpacking_target() {
        let body = parse("a, b = 1, 2");
        match &body[0].kind {
            StmtKind::Assign { targets, value } => {
                assert!(matches!(&targets[0], Target::Unpack(t) if t.len() == 2));
                assert!(matches!(value, Expr::Tuple(v) if v.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statement_lines() {
        let body = parse("x = 1\n\n\ny = 2\n");
        assert_eq!(body[0].line, 1);
        assert_eq!(body[1].line, 4);
    }

    #[test]
    fn test_compound_statements() {
        let body = parse(
            "def f(a, b=2):\n    if a:\n        return a\n    elif b:\n        pass\n    else:\n        return None\nfor i in range(3):\n    continue\n",
        );
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            StmtKind::Def(def) => {
                assert_eq!(&*def.name, "f");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(body[1].kind, StmtKind::For { .. }));
    }

    #[test]
    fn test_try_except_finally() {
        let body = parse(
            "try:\n    x = 1\nexcept ValueError as e:\n    pass\nexcept:\n    pass\nfinally:\n    y = 2\n",
        );
        match &body[0].kind {
            StmtKind::Try {
                handlers, finally, ..
            } => {
                assert_eq!(handlers.len(), 2);
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert_eq!(finally.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_line_suite_and_semicolons() {
        let body = parse("if True: x = 1; y = 2\n");
        match &body[0].kind {
            StmtKind::If { branches, .. } => assert_eq!(branches[0].1.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparison() {
        let body = parse("1 < x <= 3");
        match &body[0].kind {
            StmtKind::Expr(Expr::Compare(_, rest)) => {
                assert_eq!(rest[0].0, CmpOp::Lt);
                assert_eq!(rest[1].0, CmpOp::LtE);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_in_and_is_not() {
        let body = parse("a not in b\na is not None");
        assert!(matches!(
            &body[0].kind,
            StmtKind::Expr(Expr::Compare(_, rest)) if rest[0].0 == CmpOp::NotIn
        ));
        assert!(matches!(
            &body[1].kind,
            StmtKind::Expr(Expr::Compare(_, rest)) if rest[0].0 == CmpOp::IsNot
        ));
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let body = parse("-2 ** 2");
        match &body[0].kind {
            StmtKind::Expr(Expr::Unary(UnaryOp::Neg, inner)) => {
                assert!(matches!(**inner, Expr::Binary(BinOp::Pow, _, _)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slices() {
        let body = parse("a[1:]\na[::2]\na[:-1]");
        for stmt in &body {
            assert!(matches!(
                &stmt.kind,
                StmtKind::Expr(Expr::Index(_, idx)) if matches!(**idx, Expr::Slice(..))
            ));
        }
    }

    #[test]
    fn test_fstring_parts() {
        let body = parse("f'a{x!r:>5}b{{c}}'");
        match &body[0].kind {
            StmtKind::Expr(Expr::FString(parts)) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(
                    &parts[1],
                    FPart::Expr { repr: true, spec: Some(s), .. } if s == ">5"
                ));
                assert!(matches!(&parts[2], FPart::Literal(s) if s == "b{c}"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_list_comprehension() {
        let body = parse("[x * 2 for x in xs if x]");
        assert!(matches!(
            &body[0].kind,
            StmtKind::Expr(Expr::ListComp(c)) if c.cond.is_some()
        ));
    }

    #[test]
    fn test_keyword_arguments() {
        let body = parse("print(1, 2, sep='-', end='')");
        match &body[0].kind {
            StmtKind::Expr(Expr::Call { args, kwargs, .. }) => {
                assert_eq!(args.len(), 2);
                assert_eq!(kwargs.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors_carry_line() {
        let err = parse_err("x = 1\ny = (\n");
        assert_eq!(err.kind_name(), "SyntaxError");
        assert!(err.line().is_some());

        let err = parse_err("x = = 1");
        assert_eq!(err.kind_name(), "SyntaxError");

        let err = parse_err("1 = x");
        assert!(err.message().contains("cannot assign"));
    }

    #[test]
    fn test_unsupported_keyword() {
        let err = parse_err("class A:\n    pass\n");
        assert!(err.message().contains("'class' is not supported"));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_err(&source);
        assert!(err.message().contains("nested"));
    }

    #[test]
    fn test_long_postfix_chain_rejected() {
        let source = format!("y = x{}\n", "[0]".repeat(300_000));
        let err = parse_err(&source);
        assert_eq!(err.kind_name(), "SyntaxError");
        assert!(err.message().contains("expression too long"));

        parse(&format!("y = x{}\n", "[0]".repeat(50)));
        parse("a.b.c(1)[2].d()\n");
    }

    #[test]
    fn test_for_target_list() {
        let body = parse("for k, v in d.items():\n    pass\n");
        match &body[0].kind {
            StmtKind::For { target, .. } => {
                assert!(matches!(target, Target::Unpack(t) if t.len() == 2))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_control_flow_outside_context() {
        assert!(parse_err("break\n").message().contains("'break' outside loop"));
        assert!(parse_err("return 1\n").message().contains("'return' outside function"));
        assert!(parse_err("def f():\n    continue\n").message().contains("outside loop"));
        parse("while True:\n    def g():\n        return 1\n    break\n");
    }

    #[test]
    fn test_missing_block_is_error() {
        let err = parse_err("if x:\nprint(1)\n");
        assert!(err.message().contains("indented block"));
    }
}
