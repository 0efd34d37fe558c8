//! Tree-walking evaluator.

use super::ast::{
    BinOp, Comprehension, Expr, FPart, FunctionDef, Handler, Stmt, StmtKind, Target,
};
use super::builtins::{self, Kwargs};
use super::error::{ExcKind, ExceptionObj, Fault};
use super::format::format_spec;
use super::ops::{self, SliceBounds};
use super::parser::parse_module;
use super::value::{Dict, Function, ModuleKind, StreamKind, TypeKind, Value};
use super::Output;
use crate::config::EngineConfig;
use crate::engine::Namespace;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Outcome of a statement that did not raise.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    scope: Rc<str>,
    locals: HashMap<String, Value>,
    /// Names declared `global` in this frame.
    globals: HashSet<String>,
}

/// Runs parsed code against a namespace, writing output through `out`.
///
/// Top-level bindings go straight into the namespace, so everything bound
/// before a fault stays bound.
pub struct Interpreter<'a> {
    globals: &'a mut Namespace,
    out: &'a mut dyn Output,
    frames: Vec<Frame>,
    max_depth: usize,
    /// Exceptions currently being handled, innermost last.
    handling: Vec<Rc<ExceptionObj>>,
    module_scope: Rc<str>,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: &'a mut Namespace, out: &'a mut dyn Output) -> Self {
        Self {
            globals,
            out,
            frames: Vec::new(),
            max_depth: EngineConfig::MAX_CALL_DEPTH,
            handling: Vec::new(),
            module_scope: Rc::from("<module>"),
        }
    }

    /// Limit on nested function calls before `RecursionError`.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Parse and run `source` at module level.
    pub fn run(&mut self, source: &str) -> Result<(), Fault> {
        let module = parse_module(source)?;
        self.exec_block(&module).map(|_| ())
    }

    pub fn write_stream(&mut self, stream: StreamKind, text: &str) {
        self.out.write(stream, text);
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }

    fn scope(&self) -> Rc<str> {
        match self.frames.last() {
            Some(frame) => Rc::clone(&frame.scope),
            None => Rc::clone(&self.module_scope),
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow, Fault> {
        for stmt in body {
            match self.exec_stmt(stmt) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(mut fault) => {
                    fault.record_frame(self.depth(), stmt.line, &self.scope());
                    return Err(fault);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, Fault> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StmtKind::For { target, iter, body } => return self.exec_for(target, iter, body),
            StmtKind::Def(def) => {
                let function = self.make_function(def)?;
                self.store_name(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(expr) => return Err(self.raise(expr.as_ref())?),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finally,
            } => return self.exec_try(body, handlers, orelse, finally),
            StmtKind::Assert { cond, message } => {
                if !self.eval(cond)?.is_truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr)?.to_str(),
                        None => String::new(),
                    };
                    return Err(Fault::new(ExcKind::AssertionError, message));
                }
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            StmtKind::Import(modules) => {
                for (name, alias) in modules {
                    let module = ModuleKind::from_name(name).ok_or_else(|| {
                        Fault::new(
                            ExcKind::ModuleNotFoundError,
                            format!("No module named '{}'", name),
                        )
                    })?;
                    self.store_name(alias.as_deref().unwrap_or(name), Value::Module(module));
                }
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, target: &Target, iter: &Expr, body: &[Stmt]) -> Result<Flow, Fault> {
        let iterable = self.eval(iter)?;
        // Ranges are walked lazily so `for i in range(10**12): break` is cheap.
        let mut next: Box<dyn FnMut() -> Option<Value>> = match iterable {
            Value::Range(range) => {
                let mut index = 0;
                Box::new(move || {
                    let item = range.get(index).map(Value::Int);
                    index += 1;
                    item
                })
            }
            other => {
                let mut items = other.iter_values()?.into_iter();
                Box::new(move || items.next())
            }
        };

        while let Some(item) = next() {
            self.assign(target, item)?;
            match self.exec_block(body)? {
                Flow::Break => break,
                Flow::Normal | Flow::Continue => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finally: &[Stmt],
    ) -> Result<Flow, Fault> {
        let outcome = match self.exec_block(body) {
            Err(fault) => match self.find_handler(handlers, &fault) {
                Ok(Some(handler)) => self.run_handler(handler, &fault),
                Ok(None) => Err(fault),
                Err(other) => Err(other),
            },
            Ok(Flow::Normal) => self.exec_block(orelse),
            flow => flow,
        };

        if !finally.is_empty() {
            match self.exec_block(finally)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn find_handler<'h>(
        &mut self,
        handlers: &'h [Handler],
        fault: &Fault,
    ) -> Result<Option<&'h Handler>, Fault> {
        for handler in handlers {
            let Some(class) = &handler.class else {
                return Ok(Some(handler));
            };
            let class = self.eval(class)?;
            if exception_matches(fault.kind(), &class)? {
                return Ok(Some(handler));
            }
        }
        Ok(None)
    }

    fn run_handler(&mut self, handler: &Handler, fault: &Fault) -> Result<Flow, Fault> {
        let exc = fault.exception();
        if let Some(name) = &handler.name {
            self.store_name(name, Value::Exception(Rc::clone(&exc)));
        }
        self.handling.push(exc);
        let result = self.exec_block(&handler.body);
        self.handling.pop();
        if let Some(name) = &handler.name {
            self.unbind(name);
        }
        result
    }

    fn raise(&mut self, expr: Option<&Expr>) -> Result<Fault, Fault> {
        let Some(expr) = expr else {
            return match self.handling.last() {
                Some(exc) => Ok(Fault::from_exception(Rc::clone(exc))),
                None => Ok(Fault::new(
                    ExcKind::RuntimeError,
                    "No active exception to reraise",
                )),
            };
        };
        match self.eval(expr)? {
            Value::Exception(exc) => Ok(Fault::from_exception(exc)),
            Value::Type(TypeKind::Exception(kind)) => Ok(Fault::new(kind, "")),
            _ => Ok(Fault::type_error("exceptions must derive from BaseException")),
        }
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>) -> Result<Value, Fault> {
        let defaults = def
            .params
            .iter()
            .map(|p| p.default.as_ref().map(|e| self.eval(e)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Function(Rc::new(Function {
            def: Rc::clone(def),
            defaults,
        })))
    }

    // ---- binding ----

    fn in_local_scope(&self, name: &str) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| !frame.globals.contains(name))
    }

    fn store_name(&mut self, name: &str, value: Value) {
        if self.in_local_scope(name) {
            if let Some(frame) = self.frames.last_mut() {
                frame.locals.insert(name.to_string(), value);
            }
        } else {
            self.globals.set(name, value);
        }
    }

    /// Current binding of `name` in the scope assignments would write to.
    fn binding(&self, name: &str) -> Option<Value> {
        if self.in_local_scope(name) {
            self.frames.last().and_then(|f| f.locals.get(name).cloned())
        } else {
            self.globals.get(name).cloned()
        }
    }

    fn unbind(&mut self, name: &str) -> Option<Value> {
        if self.in_local_scope(name) {
            self.frames.last_mut().and_then(|f| f.locals.remove(name))
        } else {
            self.globals.remove(name)
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Fault> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(value) = frame.locals.get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::lookup_builtin(name).ok_or_else(|| name_error(name))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), Fault> {
        match target {
            Target::Name(name) => self.store_name(name, value),
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                match index {
                    Expr::Slice(start, stop, step) => {
                        let bounds = self.slice_bounds(start, stop, step)?;
                        ops::set_slice(&object, bounds, &value)?;
                    }
                    index => {
                        let index = self.eval(index)?;
                        ops::set_item(&object, &index, value)?;
                    }
                }
            }
            Target::Attr { object, name } => {
                let object = self.eval(object)?;
                return Err(read_only_attr(&object, name));
            }
            Target::Unpack(targets) => {
                let items = value.iter_values()?;
                if items.len() < targets.len() {
                    return Err(Fault::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(Fault::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<(), Fault> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = in_place(op, &current, &rhs)?;
                self.store_name(name, updated);
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = ops::get_item(&object, &index)?;
                let rhs = self.eval(value)?;
                let updated = in_place(op, &current, &rhs)?;
                ops::set_item(&object, &index, updated)?;
            }
            Target::Attr { object, name } => {
                let object = self.eval(object)?;
                return Err(read_only_attr(&object, name));
            }
            Target::Unpack(_) => {
                return Err(Fault::new(
                    ExcKind::SyntaxError,
                    "illegal expression for augmented assignment",
                ))
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Target) -> Result<(), Fault> {
        match target {
            Target::Name(name) => {
                self.unbind(name).ok_or_else(|| name_error(name))?;
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                match index {
                    Expr::Slice(start, stop, step) => {
                        let bounds = self.slice_bounds(start, stop, step)?;
                        ops::del_slice(&object, bounds)?;
                    }
                    index => {
                        let index = self.eval(index)?;
                        ops::del_item(&object, &index)?;
                    }
                }
            }
            Target::Attr { object, name } => {
                let object = self.eval(object)?;
                return Err(read_only_attr(&object, name));
            }
            Target::Unpack(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
        }
        Ok(())
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr) -> Result<Value, Fault> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::FString(parts) => self.eval_fstring(parts),
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::ListComp(comp) => self.eval_comprehension(comp),
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                ops::unary(*op, &operand)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, expr) in rest {
                    let right = self.eval(expr)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::IfElse { cond, then, orelse } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let args = self.eval_all(args)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, expr)| Ok((name.clone(), self.eval(expr)?)))
                    .collect::<Result<Kwargs, Fault>>()?;
                self.call_value(&callee, args, kwargs)
            }
            Expr::Attr(object, name) => {
                let object = self.eval(object)?;
                get_attr(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                match index.as_ref() {
                    Expr::Slice(start, stop, step) => {
                        let bounds = self.slice_bounds(start, stop, step)?;
                        ops::get_slice(&object, bounds)
                    }
                    index => {
                        let index = self.eval(index)?;
                        ops::get_item(&object, &index)
                    }
                }
            }
            Expr::Slice(..) => Err(Fault::new(ExcKind::SyntaxError, "invalid syntax")),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, Fault> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_fstring(&mut self, parts: &[FPart]) -> Result<Value, Fault> {
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Literal(text) => out.push_str(text),
                FPart::Expr { expr, repr, spec } => {
                    let mut value = self.eval(expr)?;
                    if *repr {
                        value = Value::from(value.repr());
                    }
                    match spec {
                        Some(spec) => out.push_str(&format_spec(&value, spec)?),
                        None => out.push_str(&value.to_str()),
                    }
                }
            }
        }
        Ok(Value::from(out))
    }

    /// Comprehension variables do not leak: prior bindings of the target
    /// names are restored afterwards, even on error.
    fn eval_comprehension(&mut self, comp: &Comprehension) -> Result<Value, Fault> {
        let items = self.eval(&comp.iter)?.iter_values()?;
        let names: Vec<String> = comp.target.names().into_iter().map(String::from).collect();
        let saved: Vec<Option<Value>> = names.iter().map(|n| self.binding(n)).collect();

        let result = self.collect_comprehension(comp, items);

        for (name, previous) in names.iter().zip(saved) {
            match previous {
                Some(value) => self.store_name(name, value),
                None => {
                    self.unbind(name);
                }
            }
        }
        result
    }

    fn collect_comprehension(
        &mut self,
        comp: &Comprehension,
        items: Vec<Value>,
    ) -> Result<Value, Fault> {
        let mut out = Vec::new();
        for item in items {
            self.assign(&comp.target, item)?;
            if let Some(cond) = &comp.cond {
                if !self.eval(cond)?.is_truthy() {
                    continue;
                }
            }
            out.push(self.eval(&comp.element)?);
        }
        Ok(Value::list(out))
    }

    fn slice_bounds(
        &mut self,
        start: &Option<Box<Expr>>,
        stop: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
    ) -> Result<SliceBounds, Fault> {
        Ok(SliceBounds {
            start: self.slice_index(start)?,
            stop: self.slice_index(stop)?,
            step: self.slice_index(step)?,
        })
    }

    fn slice_index(&mut self, expr: &Option<Box<Expr>>) -> Result<Option<i64>, Fault> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.eval(expr)? {
            Value::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                Fault::type_error("slice indices must be integers or None")
            }),
        }
    }

    // ---- calls ----

    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, Fault> {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(builtin) => builtins::call_builtin(self, *builtin, args, kwargs),
            Value::Method(method) => builtins::call_method(self, method, args, kwargs),
            Value::Type(kind) => builtins::construct(*kind, args, kwargs),
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, Fault> {
        if self.depth() >= self.max_depth {
            return Err(Fault::new(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let locals = bind_arguments(function, args, kwargs)?;
        self.frames.push(Frame {
            scope: Rc::clone(function.name()),
            locals,
            globals: HashSet::new(),
        });
        let result = self.exec_block(&function.def.body);
        self.frames.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<HashMap<String, Value>, Fault> {
    let name = function.name();
    let params = &function.def.params;
    if args.len() > params.len() {
        return Err(Fault::type_error(format!(
            "{}() takes {} positional argument{} but {} {} given",
            name,
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len(),
            if args.len() == 1 { "was" } else { "were" },
        )));
    }

    let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    slots.resize(params.len(), None);

    for (key, value) in kwargs {
        let Some(position) = params.iter().position(|p| p.name == key) else {
            return Err(Fault::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                name, key
            )));
        };
        if slots[position].is_some() {
            return Err(Fault::type_error(format!(
                "{}() got multiple values for argument '{}'",
                name, key
            )));
        }
        slots[position] = Some(value);
    }

    let mut missing = Vec::new();
    let mut locals = HashMap::with_capacity(params.len());
    for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => {
                locals.insert(param.name.clone(), value);
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }

    if !missing.is_empty() {
        let listed = match missing.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
            _ => missing.join(""),
        };
        return Err(Fault::type_error(format!(
            "{}() missing {} required positional argument{}: {}",
            name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            listed
        )));
    }
    Ok(locals)
}

/// `x op= y`; lists extend in place for `+=`.
fn in_place(op: BinOp, current: &Value, rhs: &Value) -> Result<Value, Fault> {
    if let (BinOp::Add, Value::List(items)) = (op, current) {
        let extra = rhs.iter_values()?;
        items.borrow_mut().extend(extra);
        return Ok(current.clone());
    }
    ops::binary(op, current, rhs)
}

fn exception_matches(kind: ExcKind, class: &Value) -> Result<bool, Fault> {
    match class {
        Value::Type(TypeKind::Exception(base)) => Ok(kind.is_subclass_of(*base)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(kind, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Fault::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn get_attr(object: &Value, name: &str) -> Result<Value, Fault> {
    match object {
        Value::Module(module) => builtins::module_attr(*module, name).ok_or_else(|| {
            Fault::new(
                ExcKind::AttributeError,
                format!("module '{}' has no attribute '{}'", module.name(), name),
            )
        }),
        Value::Exception(exc) if name == "args" => Ok(if exc.message.is_empty() {
            Value::tuple(Vec::new())
        } else {
            Value::tuple(vec![Value::from(exc.message.as_str())])
        }),
        other => builtins::bind_method(other, name).ok_or_else(|| ops::attr_error(other, name)),
    }
}

fn name_error(name: &str) -> Fault {
    Fault::new(
        ExcKind::NameError,
        format!("name '{}' is not defined", name),
    )
}

fn read_only_attr(object: &Value, name: &str) -> Fault {
    Fault::new(
        ExcKind::AttributeError,
        format!(
            "'{}' object attribute '{}' is read-only",
            object.type_name(),
            name
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collected {
        stdout: String,
        stderr: String,
    }

    impl Output for Collected {
        fn write(&mut self, stream: StreamKind, text: &str) {
            match stream {
                StreamKind::Stdout => self.stdout.push_str(text),
                StreamKind::Stderr => self.stderr.push_str(text),
            }
        }
    }

    fn run_in(ns: &mut Namespace, source: &str) -> (Collected, Result<(), Fault>) {
        let mut out = Collected::default();
        let result = Interpreter::new(ns, &mut out).run(source);
        (out, result)
    }

    fn stdout_of(source: &str) -> String {
        let mut ns = Namespace::new();
        let (out, result) = run_in(&mut ns, source);
        if let Err(fault) = result {
            panic!("unexpected fault: {}", fault.render());
        }
        out.stdout
    }

    fn fault_of(source: &str) -> Fault {
        let mut ns = Namespace::new();
        run_in(&mut ns, source).1.unwrap_err()
    }

    #[test]
    fn test_print_and_arithmetic() {
        assert_eq!(stdout_of("x = 1\nprint(x)"), "1\n");
        assert_eq!(stdout_of("print(7 // 2, 7 / 2, 2 ** 10)"), "3 3.5 1024\n");
        assert_eq!(stdout_of("print('a', 'b', sep='-', end='!')"), "a-b!");
    }

    #[test]
    fn test_bindings_persist_in_namespace() {
        let mut ns = Namespace::new();
        run_in(&mut ns, "x = 1").1.unwrap();
        let (out, result) = run_in(&mut ns, "print(x + 1)");
        result.unwrap();
        assert_eq!(out.stdout, "2\n");
    }

    #[test]
    fn test_partial_effects_survive_fault() {
        let mut ns = Namespace::new();
        let (_, result) = run_in(&mut ns, "x = 1\nraise Exception()\ny = 2");
        let fault = result.unwrap_err();
        assert_eq!(fault.kind(), ExcKind::Exception);
        assert!(ns.contains("x"));
        assert!(!ns.contains("y"));
    }

    #[test]
    fn test_undefined_name() {
        let fault = fault_of("print(x)");
        assert_eq!(fault.kind(), ExcKind::NameError);
        assert_eq!(fault.message(), "name 'x' is not defined");
    }

    #[test]
    fn test_control_flow() {
        let source = "\
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
print(total, n)
";
        assert_eq!(stdout_of(source), "16 3\n");
    }

    #[test]
    fn test_functions_defaults_and_kwargs() {
        let source = "\
def greet(name, greeting='Hello'):
    return f'{greeting}, {name}!'
print(greet('Ada'))
print(greet('Bob', greeting='Hi'))
";
        assert_eq!(stdout_of(source), "Hello, Ada!\nHi, Bob!\n");
    }

    #[test]
    fn test_argument_errors() {
        let fault = fault_of("def f(a, b):\n    pass\nf(1)");
        assert_eq!(
            fault.message(),
            "f() missing 1 required positional argument: 'b'"
        );
        let fault = fault_of("def f(a):\n    pass\nf(1, 2)");
        assert_eq!(
            fault.message(),
            "f() takes 1 positional argument but 2 were given"
        );
        let fault = fault_of("def f(a):\n    pass\nf(a=1, b=2)");
        assert!(fault.message().contains("unexpected keyword argument 'b'"));
    }

    #[test]
    fn test_locals_do_not_leak_and_global_statement() {
        let source = "\
count = 0
def bump():
    global count
    count += 1
    temp = 5
bump()
bump()
print(count)
";
        let mut ns = Namespace::new();
        let (out, result) = run_in(&mut ns, source);
        result.unwrap();
        assert_eq!(out.stdout, "2\n");
        assert!(!ns.contains("temp"));
    }

    #[test]
    fn test_try_except_finally() {
        let source = "\
try:
    1 / 0
except ZeroDivisionError as e:
    print('caught', e)
finally:
    print('done')
try:
    {}['k']
except (IndexError, KeyError):
    print('lookup')
";
        assert_eq!(stdout_of(source), "caught division by zero\ndone\nlookup\n");
    }

    #[test]
    fn test_handler_name_unbound_after_block() {
        let mut ns = Namespace::new();
        let (_, result) = run_in(&mut ns, "try:\n    raise ValueError('x')\nexcept ValueError as err:\n    pass");
        result.unwrap();
        assert!(!ns.contains("err"));
    }

    #[test]
    fn test_bare_raise_reraises_current() {
        let fault = fault_of("try:\n    raise KeyError('k')\nexcept KeyError:\n    raise");
        assert_eq!(fault.kind(), ExcKind::KeyError);
    }

    #[test]
    fn test_unhandled_exception_passes_through_else_less_try() {
        let fault = fault_of("try:\n    raise TypeError('bad')\nexcept ValueError:\n    pass");
        assert_eq!(fault.kind(), ExcKind::TypeError);
        assert_eq!(fault.message(), "bad");
    }

    #[test]
    fn test_traceback_lists_frames() {
        let source = "\
def inner():
    return 1 / 0
def outer():
    return inner()
outer()
";
        let text = fault_of(source).render();
        assert_eq!(
            text,
            "Traceback (most recent call last):\n  \
             File \"<kernel>\", line 5, in <module>\n  \
             File \"<kernel>\", line 4, in outer\n  \
             File \"<kernel>\", line 2, in inner\n\
             ZeroDivisionError: division by zero\n"
        );
    }

    #[test]
    fn test_recursion_limit() {
        let mut ns = Namespace::new();
        let mut out = Collected::default();
        let result = Interpreter::new(&mut ns, &mut out)
            .with_max_depth(20)
            .run("def f(n):\n    return f(n + 1)\nf(0)");
        assert_eq!(result.unwrap_err().kind(), ExcKind::RecursionError);
    }

    #[test]
    fn test_comprehension_restores_target() {
        let mut ns = Namespace::new();
        let (out, result) = run_in(&mut ns, "i = 'kept'\nsq = [i * i for i in range(4) if i != 2]\nprint(sq, i)");
        result.unwrap();
        assert_eq!(out.stdout, "[0, 1, 9] kept\n");

        let (_, result) = run_in(&mut ns, "[j for j in range(2)]");
        result.unwrap();
        assert!(!ns.contains("j"));
    }

    #[test]
    fn test_unpacking_and_subscripts() {
        let source = "\
a, b = 1, 2
a, b = b, a
xs = [1, 2, 3, 4]
xs[0] = 10
xs[1:3] = [7]
d = {'k': 1}
d['k'] += 5
del xs[-1]
print(a, b, xs, d)
";
        assert_eq!(stdout_of(source), "2 1 [10, 7] {'k': 6}\n");
        let fault = fault_of("a, b = [1, 2, 3]");
        assert_eq!(fault.message(), "too many values to unpack (expected 2)");
    }

    #[test]
    fn test_list_plus_equals_mutates_alias() {
        assert_eq!(stdout_of("a = [1]\nb = a\nb += [2]\nprint(a)"), "[1, 2]\n");
    }

    #[test]
    fn test_imports_and_streams() {
        let mut ns = Namespace::new();
        let (out, result) = run_in(
            &mut ns,
            "import math\nimport sys\nprint(math.sqrt(16))\nprint('oops', file=sys.stderr)\nsys.stderr.write('raw')",
        );
        result.unwrap();
        assert_eq!(out.stdout, "4.0\n");
        assert_eq!(out.stderr, "oops\nraw");

        let fault = fault_of("import numpy");
        assert_eq!(fault.kind(), ExcKind::ModuleNotFoundError);
        assert_eq!(fault.message(), "No module named 'numpy'");
    }

    #[test]
    fn test_output_before_fault_is_kept() {
        let mut ns = Namespace::new();
        let (out, result) = run_in(&mut ns, "print('before')\nundefined_name");
        assert!(result.is_err());
        assert_eq!(out.stdout, "before\n");
    }

    #[test]
    fn test_assert_and_chained_comparison() {
        assert_eq!(stdout_of("print(1 < 2 < 3, 1 < 3 < 2)"), "True False\n");
        let fault = fault_of("assert 1 == 2, 'nope'");
        assert_eq!(fault.kind(), ExcKind::AssertionError);
        assert_eq!(fault.message(), "nope");
    }

    #[test]
    fn test_calling_non_callable() {
        let fault = fault_of("x = 3\nx()");
        assert_eq!(fault.message(), "'int' object is not callable");
    }
}
