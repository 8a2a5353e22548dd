//! Tree-walking evaluator for Devin
//!
//! A single-threaded, strict, left-to-right recursive walk over the
//! checked AST. The runtime state is an environment (global frame plus a
//! stack of call frames, each a stack of `name → slot` scopes), the heap
//! of cells and array records, and the function table with its own scope
//! stack so nested declarations die with their block.
//!
//! Statements produce a [`Flow`]: either execution continues, or a
//! `return` value unwinds out to the nearest call frame. Runtime errors
//! abort the whole evaluation immediately.

mod error;
mod value;

pub use error::{EvalError, EvalErrorKind};
pub use value::{ArrayId, ArrayRecord, CellId, FunId, Heap, Value};

use crate::ast::{
    AssignOp, BinaryOp, Declaration, ExprKind, Expression, Ident, Program, Statement, StmtKind,
    UnaryOp,
};
use crate::span::Span;
use crate::typeck::{Ty, TypedProgram};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::collections::HashMap;

/// Maximum interpreter call depth; exceeding it surfaces `StackOverflow`
/// instead of exhausting the host stack
pub const MAX_CALL_DEPTH: usize = 512;

/// One parameter of a registered function
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub is_ref: bool,
    pub ty: Ty,
}

/// A function table entry
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub ret: Ty,
    pub body: Statement,
}

/// The function table plus the scope stack governing which entries are
/// currently in view. Entries live for the whole run; scopes only control
/// visibility.
#[derive(Debug)]
pub struct Functions {
    table: Vec<FunctionDef>,
    scopes: Vec<HashMap<String, Vec<FunId>>>,
}

impl Default for Functions {
    fn default() -> Self {
        Self::new()
    }
}

impl Functions {
    pub fn new() -> Self {
        Self {
            table: Vec::new(),
            scopes: vec![HashMap::new()],
        }
    }

    pub fn def(&self, id: FunId) -> &FunctionDef {
        &self.table[id.0]
    }

    pub fn register(&mut self, def: FunctionDef) -> FunId {
        let id = FunId(self.table.len());
        let name = def.name.clone();
        self.table.push(def);
        self.scopes
            .last_mut()
            .expect("at least the global scope")
            .entry(name)
            .or_default()
            .push(id);
        id
    }

    /// All overloads of `name` in view, innermost scope first
    pub fn candidates(&self, name: &str) -> Vec<FunId> {
        self.scopes
            .iter()
            .rev()
            .filter_map(|s| s.get(name))
            .flatten()
            .copied()
            .collect()
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

/// A storage slot a name can be bound to: a cell, or one element of an
/// array. `ref` parameters alias either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Cell(CellId),
    Element(ArrayId, usize),
}

/// One call frame: a stack of lexical scopes
#[derive(Debug)]
pub struct Frame {
    scopes: Vec<HashMap<String, Slot>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    fn declare(&mut self, name: &str, slot: Slot) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .insert(name.to_string(), slot);
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }
}

/// The variable environment: the global frame plus the call stack. Lookup
/// sees the active frame and the globals; enclosing frames are shadowed.
#[derive(Debug)]
pub struct Env {
    globals: Frame,
    frames: Vec<Frame>,
}

impl Env {
    pub fn new() -> Self {
        Self {
            globals: Frame::new(),
            frames: Vec::new(),
        }
    }

    fn active_frame_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Slot> {
        if let Some(frame) = self.frames.last() {
            if let Some(slot) = frame.lookup(name) {
                return Some(slot);
            }
        }
        self.globals.lookup(name)
    }

    pub fn declare(&mut self, name: &str, slot: Slot) {
        self.active_frame_mut().declare(name, slot);
    }

    fn push_scope(&mut self) {
        self.active_frame_mut().scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.active_frame_mut().scopes.pop();
    }

    fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

/// The whole runtime state, threaded state-in/state-out through
/// [`evaluate`]
#[derive(Debug)]
pub struct State {
    pub env: Env,
    pub heap: Heap,
    pub functions: Functions,
}

impl State {
    /// The initial state. The core defines no built-ins, so this is empty
    /// scaffolding for a host to extend.
    pub fn predefined() -> Self {
        Self {
            env: Env::new(),
            heap: Heap::new(),
            functions: Functions::new(),
        }
    }

    /// The runtime type of a value, for overload selection
    pub fn value_ty(&self, value: &Value) -> Ty {
        match value {
            Value::Unit => Ty::Unit,
            Value::Bool(_) => Ty::Bool,
            Value::Int(_) => Ty::Int,
            Value::Float(_) => Ty::Float,
            Value::Array(aid) => Ty::array(self.heap.array(*aid).elem_ty.clone()),
            Value::Function(fid) => {
                let def = self.functions.def(*fid);
                Ty::function(
                    def.params.iter().map(|p| p.ty.clone()).collect(),
                    def.ret.clone(),
                )
            }
        }
    }
}

/// Statement outcome
#[derive(Debug)]
enum Flow {
    /// Fall through to the next statement
    Normal,
    /// A `return` is unwinding to the enclosing call
    Return(Value),
}

/// How an argument reaches a call: as an aliasable slot (the argument was
/// an l-value) or as a plain value
enum ArgSource {
    Slot(Slot),
    Value(Value),
}

/// Run a checked program: install the top-level declarations in order,
/// then invoke the zero-parameter `main`.
pub fn evaluate(program: &TypedProgram, state: &mut State) -> Result<(), EvalError> {
    Interpreter { state, depth: 0 }.run(&program.program)
}

struct Interpreter<'s> {
    state: &'s mut State,
    depth: usize,
}

impl Interpreter<'_> {
    fn run(&mut self, program: &Program) -> Result<(), EvalError> {
        for decl in &program.decls {
            self.execute_declaration(decl)?;
        }

        let main = self
            .state
            .functions
            .candidates("main")
            .into_iter()
            .find(|fid| self.state.functions.def(*fid).params.is_empty());
        match main {
            Some(fid) => {
                self.invoke(fid, Vec::new(), program.span)?;
                Ok(())
            }
            None => Err(EvalError::new(EvalErrorKind::NoMain, program.span)),
        }
    }

    // ============ Declarations ============

    fn execute_declaration(&mut self, decl: &Declaration) -> Result<(), EvalError> {
        match decl {
            Declaration::Variable(v) => {
                let value = self.eval_expression(&v.value)?;
                self.bind_var(&v.name.name, value);
                Ok(())
            }
            Declaration::Function(d) => {
                let def = FunctionDef {
                    name: d.name.name.clone(),
                    params: d
                        .params
                        .iter()
                        .map(|p| ParamSpec {
                            name: p.name.name.clone(),
                            is_ref: p.is_ref,
                            ty: Ty::from_annotation(p.annotation.as_ref()),
                        })
                        .collect(),
                    ret: Ty::from_annotation(d.return_type.as_ref()),
                    body: d.body.clone(),
                };
                self.state.functions.register(def);
                Ok(())
            }
        }
    }

    /// `var` binding clones the whole array structure, so the new name
    /// never aliases the initializer. Sharing happens through `ref` and
    /// through by-value array parameters, not through `var`.
    fn bind_var(&mut self, name: &str, value: Value) {
        let value = self.state.heap.deep_copy(&value);
        let cell = self.state.heap.alloc_cell(value);
        self.state.env.declare(name, Slot::Cell(cell));
    }

    // ============ Statements ============

    fn execute_statement(&mut self, stmt: &Statement) -> Result<Flow, EvalError> {
        match &stmt.kind {
            StmtKind::Expression(e) => {
                self.eval_expression(e)?;
                Ok(Flow::Normal)
            }
            StmtKind::If {
                predicate,
                then_branch,
            } => {
                if self.eval_predicate(predicate)? {
                    self.execute_scoped(then_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::IfElse {
                predicate,
                then_branch,
                else_branch,
            } => {
                if self.eval_predicate(predicate)? {
                    self.execute_scoped(then_branch)
                } else {
                    self.execute_scoped(else_branch)
                }
            }
            StmtKind::While { predicate, body } => {
                while self.eval_predicate(predicate)? {
                    if let Flow::Return(v) = self.execute_scoped(body)? {
                        return Ok(Flow::Return(v));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, predicate } => {
                loop {
                    if let Flow::Return(v) = self.execute_scoped(body)? {
                        return Ok(Flow::Return(v));
                    }
                    if !self.eval_predicate(predicate)? {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(None) => Ok(Flow::Return(Value::Unit)),
            StmtKind::Return(Some(e)) => Ok(Flow::Return(self.eval_expression(e)?)),
            StmtKind::Assert(e) => {
                if self.eval_predicate(e)? {
                    Ok(Flow::Normal)
                } else {
                    Err(EvalError::new(EvalErrorKind::AssertionFailure, e.span))
                }
            }
            StmtKind::Block(stmts) => {
                self.state.env.push_scope();
                self.state.functions.push_scope();
                let result = self.execute_sequence(stmts);
                self.state.functions.pop_scope();
                self.state.env.pop_scope();
                result
            }
            StmtKind::Declaration(decl) => {
                self.execute_declaration(decl)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn execute_sequence(&mut self, stmts: &[Statement]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            if let Flow::Return(v) = self.execute_statement(stmt)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    /// Branches and loop bodies run in a fresh block scope
    fn execute_scoped(&mut self, stmt: &Statement) -> Result<Flow, EvalError> {
        self.state.env.push_scope();
        self.state.functions.push_scope();
        let result = self.execute_statement(stmt);
        self.state.functions.pop_scope();
        self.state.env.pop_scope();
        result
    }

    fn eval_predicate(&mut self, e: &Expression) -> Result<bool, EvalError> {
        match self.eval_expression(e)? {
            Value::Bool(b) => Ok(b),
            _ => Err(EvalError::new(EvalErrorKind::TypeMismatch, e.span)),
        }
    }

    // ============ Expressions ============

    fn eval_expression(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Integer(i) => Ok(Value::Int(i.clone())),
            ExprKind::Rational(r) => Ok(Value::Float(r.clone())),
            ExprKind::Boolean(b) => Ok(Value::Bool(*b)),
            ExprKind::Variable(id) => {
                let slot = self.lookup_slot(id)?;
                Ok(self.read_slot(slot))
            }
            ExprKind::Array(elems) => {
                let values: Vec<Value> = elems
                    .iter()
                    .map(|e| self.eval_expression(e))
                    .collect::<Result<_, _>>()?;
                let elem_ty = values
                    .first()
                    .map(|v| self.state.value_ty(v))
                    .unwrap_or_else(Ty::placeholder);
                Ok(Value::Array(self.state.heap.alloc_array(elem_ty, values)))
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, expr.span),
            ExprKind::Binary { op, left, right } => {
                let lv = self.eval_expression(left)?;
                let rv = self.eval_expression(right)?;
                self.apply_binary(*op, lv, rv, expr.span)
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, expr.span),
            ExprKind::Access { array, index } => {
                let (aid, idx) = self.eval_index(array, index)?;
                Ok(self.state.heap.array(aid).elems[idx].clone())
            }
            ExprKind::Parenthesized(inner) => self.eval_expression(inner),
        }
    }

    // ============ Slots and l-values ============

    fn lookup_slot(&self, id: &Ident) -> Result<Slot, EvalError> {
        self.state
            .env
            .lookup(&id.name)
            .ok_or_else(|| EvalError::new(EvalErrorKind::UnknownVariable(id.name.clone()), id.span))
    }

    fn read_slot(&self, slot: Slot) -> Value {
        match slot {
            Slot::Cell(cell) => self.state.heap.cell(cell).clone(),
            Slot::Element(aid, idx) => self.state.heap.array(aid).elems[idx].clone(),
        }
    }

    fn write_slot(&mut self, slot: Slot, value: Value) {
        match slot {
            Slot::Cell(cell) => *self.state.heap.cell_mut(cell) = value,
            Slot::Element(aid, idx) => self.state.heap.array_mut(aid).elems[idx] = value,
        }
    }

    /// Resolve an expression to the slot it denotes. Only bare variables
    /// and index chains denote slots.
    fn resolve_lvalue(&mut self, expr: &Expression) -> Result<Slot, EvalError> {
        match &expr.kind {
            ExprKind::Variable(id) => self.lookup_slot(id),
            ExprKind::Access { array, index } => {
                let (aid, idx) = self.eval_index(array, index)?;
                Ok(Slot::Element(aid, idx))
            }
            _ => Err(EvalError::new(EvalErrorKind::RefExpectsLValue, expr.span)),
        }
    }

    fn eval_index(
        &mut self,
        array: &Expression,
        index: &Expression,
    ) -> Result<(ArrayId, usize), EvalError> {
        let base = self.eval_expression(array)?;
        let aid = match base {
            Value::Array(aid) => aid,
            _ => return Err(EvalError::new(EvalErrorKind::TypeMismatch, array.span)),
        };
        let idx = match self.eval_expression(index)? {
            Value::Int(i) => i,
            _ => return Err(EvalError::new(EvalErrorKind::TypeMismatch, index.span)),
        };

        let len = self.state.heap.array(aid).elems.len();
        match idx.to_usize() {
            Some(u) if u < len => Ok((aid, u)),
            _ => Err(EvalError::new(
                EvalErrorKind::IndexOutOfBounds { index: idx, len },
                index.span,
            )),
        }
    }

    // ============ Calls ============

    fn eval_call(&mut self, callee: &Ident, args: &[Expression]) -> Result<Value, EvalError> {
        // Arguments are processed strictly left to right. An l-value
        // argument resolves to its slot so a `ref` parameter can alias it;
        // anything else evaluates to a value.
        let mut sources = Vec::with_capacity(args.len());
        for arg in args {
            let source = match &arg.kind {
                ExprKind::Variable(_) | ExprKind::Access { .. } => {
                    ArgSource::Slot(self.resolve_lvalue(arg)?)
                }
                _ => ArgSource::Value(self.eval_expression(arg)?),
            };
            sources.push((source, arg.span));
        }

        let arg_tys: Vec<Ty> = sources
            .iter()
            .map(|(source, _)| match source {
                ArgSource::Slot(slot) => {
                    let value = self.read_slot(*slot);
                    self.state.value_ty(&value)
                }
                ArgSource::Value(v) => self.state.value_ty(v),
            })
            .collect();

        // The checker proved a matching overload exists for well-typed
        // programs, so a miss here is an internal error.
        let fid = self
            .state
            .functions
            .candidates(&callee.name)
            .into_iter()
            .find(|fid| {
                let params: Vec<Ty> = self
                    .state
                    .functions
                    .def(*fid)
                    .params
                    .iter()
                    .map(|p| p.ty.clone())
                    .collect();
                Ty::all_compatible(&params, &arg_tys)
            })
            .ok_or_else(|| {
                EvalError::new(EvalErrorKind::UnknownFunction(callee.name.clone()), callee.span)
            })?;

        self.invoke(fid, sources, callee.span)
    }

    fn invoke(
        &mut self,
        fid: FunId,
        sources: Vec<(ArgSource, Span)>,
        span: Span,
    ) -> Result<Value, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::new(EvalErrorKind::StackOverflow, span));
        }

        let def = self.state.functions.def(fid).clone();

        let mut frame = Frame::new();
        for (param, (source, arg_span)) in def.params.iter().zip(sources) {
            match (param.is_ref, source) {
                // A ref parameter binds the caller's slot: no copy.
                (true, ArgSource::Slot(slot)) => frame.declare(&param.name, slot),
                (true, ArgSource::Value(_)) => {
                    return Err(EvalError::new(EvalErrorKind::RefExpectsLValue, arg_span))
                }
                (false, source) => {
                    let value = match source {
                        ArgSource::Slot(slot) => self.read_slot(slot),
                        ArgSource::Value(v) => v,
                    };
                    let cell = self.state.heap.alloc_cell(value);
                    frame.declare(&param.name, Slot::Cell(cell));
                }
            }
        }

        self.state.env.push_frame(frame);
        self.depth += 1;
        let flow = self.execute_statement(&def.body);
        self.depth -= 1;
        self.state.env.pop_frame();

        match flow? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => {
                if def.ret.compatible(&Ty::Unit) {
                    Ok(Value::Unit)
                } else {
                    Err(EvalError::new(EvalErrorKind::MissingReturnValue, span))
                }
            }
        }
    }

    // ============ Operators ============

    fn eval_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expression,
        span: Span,
    ) -> Result<Value, EvalError> {
        let value = self.eval_expression(operand)?;
        match (op, value) {
            (UnaryOp::Plus, Value::Int(i)) => Ok(Value::Int(i)),
            (UnaryOp::Plus, Value::Float(r)) => Ok(Value::Float(r)),
            (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(-i)),
            (UnaryOp::Minus, Value::Float(r)) => Ok(Value::Float(-r)),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Len, Value::Array(aid)) => {
                Ok(Value::Int(BigInt::from(self.state.heap.array(aid).elems.len())))
            }
            _ => Err(EvalError::new(EvalErrorKind::TypeMismatch, span)),
        }
    }

    fn apply_binary(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        span: Span,
    ) -> Result<Value, EvalError> {
        use BinaryOp::*;

        match (op, left, right) {
            // Integer arithmetic, exact and unbounded
            (Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (Div, Value::Int(a), Value::Int(b)) => {
                if b.is_zero() {
                    Err(EvalError::new(EvalErrorKind::DivisionByZero, span))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            // Truncated remainder: the result takes the dividend's sign
            (Rem, Value::Int(a), Value::Int(b)) => {
                if b.is_zero() {
                    Err(EvalError::new(EvalErrorKind::DivisionByZero, span))
                } else {
                    Ok(Value::Int(a % b))
                }
            }

            // Rational arithmetic, exact
            (Add, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Sub, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Mul, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Div, Value::Float(a), Value::Float(b)) => {
                if b.is_zero() {
                    Err(EvalError::new(EvalErrorKind::DivisionByZero, span))
                } else {
                    Ok(Value::Float(a / b))
                }
            }
            (Rem, Value::Float(a), Value::Float(b)) => {
                if b.is_zero() {
                    Err(EvalError::new(EvalErrorKind::DivisionByZero, span))
                } else {
                    let quotient = (&a / &b).trunc();
                    Ok(Value::Float(a - quotient * b))
                }
            }

            // Array repetition, in either operand order
            (Mul, Value::Array(aid), Value::Int(n)) | (Mul, Value::Int(n), Value::Array(aid)) => {
                Ok(self.repeat_array(aid, &n))
            }

            // Deep equality
            (Eq, a, b) => Ok(Value::Bool(self.state.heap.deep_eq(&a, &b))),
            (Ne, a, b) => Ok(Value::Bool(!self.state.heap.deep_eq(&a, &b))),

            // Ordering
            (Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
            (Le, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a <= b)),
            (Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
            (Ge, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a >= b)),
            (Lt, Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a < b)),
            (Le, Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a <= b)),
            (Gt, Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a > b)),
            (Ge, Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a >= b)),

            // Logical operators evaluate both operands; no short-circuit
            (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
            (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (Xor, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a ^ b)),

            _ => Err(EvalError::new(EvalErrorKind::TypeMismatch, span)),
        }
    }

    /// `a * n` / `n * a`: a fresh array with `max(0, n)` repetitions of the
    /// elements. Element values are shared, so nested arrays alias.
    fn repeat_array(&mut self, aid: ArrayId, n: &BigInt) -> Value {
        let record = self.state.heap.array(aid);
        let (elem_ty, elems) = (record.elem_ty.clone(), record.elems.clone());
        let count = n.to_usize().unwrap_or(0);

        let mut values = Vec::with_capacity(count * elems.len());
        for _ in 0..count {
            values.extend(elems.iter().cloned());
        }
        Value::Array(self.state.heap.alloc_array(elem_ty, values))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> Result<Value, EvalError> {
        let slot = self.resolve_lvalue(target)?;
        let rhs = self.eval_expression(value)?;

        let stored = match op.binary_op() {
            None => rhs,
            Some(bin) => {
                let current = self.read_slot(slot);
                self.apply_binary(bin, current, rhs, span)?
            }
        };

        self.write_slot(slot, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::typeck;

    fn run(source: &str) -> Result<State, EvalError> {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        let (typed, diagnostics) = typeck::check(program);
        assert!(diagnostics.is_empty(), "Diagnostics: {:?}", diagnostics);
        let mut state = State::predefined();
        evaluate(&typed, &mut state)?;
        Ok(state)
    }

    fn run_ok(source: &str) {
        if let Err(e) = run(source) {
            panic!("Runtime error: {}", e);
        }
    }

    fn run_err(source: &str) -> EvalError {
        match run(source) {
            Ok(_) => panic!("Expected a runtime error"),
            Err(e) => e,
        }
    }

    // ============ End-to-end scenarios ============

    #[test]
    fn test_arithmetic_and_assert() {
        run_ok("def main() { var x = 1; var y = 2; var z = 2*y + x; assert z == 5; }");
    }

    #[test]
    fn test_var_binding_copies_arrays() {
        run_ok(
            "def main() { var a1 = [4, -2, 1, 0]; var a2 = a1; a1[1] = 7; \
             assert a1 == [4, 7, 1, 0]; assert a2 == [4, -2, 1, 0]; }",
        );
    }

    #[test]
    fn test_array_repetition() {
        run_ok(
            "def main() { var a = [1, 2]; \
             assert a * 5 == [1, 2, 1, 2, 1, 2, 1, 2, 1, 2]; \
             assert a * 0 == []; \
             assert a * (-2) == []; \
             assert 3 * a == [1, 2, 1, 2, 1, 2]; }",
        );
    }

    #[test]
    fn test_forward_reference() {
        run_ok(
            "def main() { assert factorial(6) == 720; } \
             def factorial(n) { if n == 0 { return 1; } return n * factorial(n - 1); }",
        );
    }

    #[test]
    fn test_ref_parameter_mutates_caller() {
        run_ok(
            "def main() { var a = [9, 7, 2, 5]; update(a, 1, -42); assert a == [9, -42, 2, 5]; } \
             def update(ref a, i, v) { a[i] = v; }",
        );
    }

    #[test]
    fn test_mutual_recursion() {
        run_ok(
            "def main() { assert isOdd(69); assert isEven(420); } \
             def isEven(n) { if n == 0 return true; else return isOdd(n - 1); } \
             def isOdd(n) { if n == 0 return false; else return isEven(n - 1); }",
        );
    }

    // ============ Parameter passing ============

    #[test]
    fn test_ref_scalar_aliases() {
        run_ok("def bump(ref x) { x += 1; } def main() { var n = 1; bump(n); assert n == 2; }");
    }

    #[test]
    fn test_by_value_scalar_does_not_propagate() {
        run_ok("def f(x) { x += 1; } def main() { var n = 1; f(n); assert n == 1; }");
    }

    #[test]
    fn test_by_value_array_shares_elements() {
        run_ok(
            "def fill(a, v) { a[0] = v; } \
             def main() { var xs = [1, 2]; fill(xs, 9); assert xs == [9, 2]; }",
        );
    }

    #[test]
    fn test_ref_to_array_element() {
        run_ok(
            "def set(ref row, i, v) { row[i] = v; } \
             def main() { var m = [[1, 2], [3, 4]]; set(m[1], 0, 9); \
             assert m == [[1, 2], [9, 4]]; }",
        );
    }

    #[test]
    fn test_ref_requires_lvalue() {
        let error = run_err("def f(ref x) { x += 1; } def main() { f(1 + 2); }");
        assert_eq!(error.kind, EvalErrorKind::RefExpectsLValue);
    }

    // ============ Arithmetic ============

    #[test]
    fn test_rational_arithmetic_is_exact() {
        run_ok(
            "def main() { \
               assert 1.0/3.0 + 1.0/3.0 + 1.0/3.0 == 1.0; \
               assert 0.1 + 0.2 == 0.3; \
             }",
        );
    }

    #[test]
    fn test_integer_arithmetic_is_unbounded() {
        run_ok(
            "def main() { assert factorial(30) > 1000000000000000000; } \
             def factorial(n) { if n == 0 { return 1; } return n * factorial(n - 1); }",
        );
    }

    #[test]
    fn test_truncated_remainder() {
        run_ok(
            "def main() { \
               assert 7 % 2 == 1; \
               assert -7 % 2 == -1; \
               assert 7 % -2 == 1; \
               assert 7.5 % 2.0 == 1.5; \
               assert -7.5 % 2.0 == -1.5; \
             }",
        );
    }

    #[test]
    fn test_division_by_zero() {
        let error = run_err("def main() { var x = 1 / 0; }");
        assert_eq!(error.kind, EvalErrorKind::DivisionByZero);
        let error = run_err("def main() { var x = 1.0 / 0.0; }");
        assert_eq!(error.kind, EvalErrorKind::DivisionByZero);
        let error = run_err("def main() { var x = 1 % 0; }");
        assert_eq!(error.kind, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn test_logical_operators() {
        run_ok(
            "def main() { \
               assert true and true; \
               assert not (true and false); \
               assert true or false; \
               assert true xor false; \
               assert not (true xor true); \
             }",
        );
    }

    // ============ Arrays ============

    #[test]
    fn test_array_equality_is_deep() {
        run_ok(
            "def main() { var a = [1, 2, 3]; var b = [1, 2, 3]; assert a == b; \
             a[0] = 0; assert a != b; }",
        );
    }

    #[test]
    fn test_len() {
        run_ok("def main() { assert len [1, 2, 3] == 3; var e = []; assert len e == 0; }");
    }

    #[test]
    fn test_index_out_of_bounds() {
        let error = run_err("def main() { var a = [1, 2]; var x = a[5]; }");
        assert!(matches!(
            error.kind,
            EvalErrorKind::IndexOutOfBounds { len: 2, .. }
        ));
        let error = run_err("def main() { var a = [1, 2]; var x = a[-1]; }");
        assert!(matches!(error.kind, EvalErrorKind::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_var_deep_copies_nested_arrays() {
        run_ok(
            "def main() { var m = [[1, 2], [3, 4]]; var n = m; m[0][0] = 9; \
             assert n == [[1, 2], [3, 4]]; }",
        );
    }

    #[test]
    fn test_repetition_aliases_nested_arrays() {
        // Parameters bind by value without cloning structure, so the
        // repeated rows are visibly the same array inside the callee.
        run_ok(
            "def check(grid) { grid[0][0] = 1; assert grid == [[1], [1]]; } \
             def main() { var row = [0]; check([row] * 2); }",
        );
    }

    // ============ Control flow ============

    #[test]
    fn test_while_loop() {
        run_ok(
            "def main() { var sum = 0; var i = 1; \
             while i <= 10 { sum += i; i += 1; } assert sum == 55; }",
        );
    }

    #[test]
    fn test_do_while_runs_at_least_once() {
        run_ok("def main() { var n = 0; do { n += 1; } while false; assert n == 1; }");
    }

    #[test]
    fn test_return_unwinds_loops() {
        run_ok(
            "def first(limit) { var i = 0; while true { if i == limit { return i; } i += 1; } } \
             def main() { assert first(7) == 7; }",
        );
    }

    #[test]
    fn test_nested_function_declaration() {
        run_ok(
            "def main() { \
               def double(n) { return 2 * n; } \
               assert double(21) == 42; \
             }",
        );
    }

    #[test]
    fn test_compound_assignment_on_element() {
        run_ok("def main() { var a = [1, 2]; a[1] *= 10; assert a == [1, 20]; }");
    }

    #[test]
    fn test_assignment_yields_stored_value() {
        run_ok("def main() { var x = 0; var y = x = 5; assert y == 5; assert x == 5; }");
    }

    // ============ Failures ============

    #[test]
    fn test_assertion_failure_carries_span() {
        let source = "def main() { assert 1 == 2; }";
        let error = run_err(source);
        assert_eq!(error.kind, EvalErrorKind::AssertionFailure);
        assert_eq!(error.span.text(source), "1 == 2");
    }

    #[test]
    fn test_no_main() {
        let error = run_err("def helper() { return; }");
        assert_eq!(error.kind, EvalErrorKind::NoMain);
    }

    #[test]
    fn test_main_must_take_no_arguments() {
        let error = run_err("def main(n) { return; }");
        assert_eq!(error.kind, EvalErrorKind::NoMain);
    }

    #[test]
    fn test_stack_overflow() {
        let error = run_err("def spin() { spin(); } def main() { spin(); }");
        assert_eq!(error.kind, EvalErrorKind::StackOverflow);
    }

    #[test]
    fn test_global_variables() {
        run_ok("var counter = 0; def main() { counter += 1; assert counter == 1; }");
    }

    #[test]
    fn test_overload_dispatch_on_runtime_types() {
        run_ok(
            "def describe(n: Int): Int { return 1; } \
             def describe(b: Bool): Int { return 2; } \
             def main() { assert describe(0) == 1; assert describe(true) == 2; }",
        );
    }
}
