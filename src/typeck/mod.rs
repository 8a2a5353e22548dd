//! Type checker for Devin
//!
//! Checking is two passes over each declaration list, sharing one mutable
//! checker state. Pass 1 installs every function signature in the current
//! scope, which is what lets bodies forward-reference siblings and lets
//! mutually recursive functions check. Pass 2 then checks each declaration
//! fully. Entering a function body pushes a fresh variable scope (holding
//! the parameters) and a fresh, empty function scope, so nested
//! declarations never leak out.
//!
//! Diagnostics accumulate and never abort: whatever fails to type gets
//! `Ty::Error`, which is compatible with everything and so suppresses
//! cascades downstream.

mod error;
mod expr;
mod ty;

pub use error::{TypeDiagnostic, TypeDiagnosticKind, TypeWarning, TypeWarningKind};
pub use ty::Ty;

use crate::ast::{Declaration, Expression, FnDecl, Program, Statement, StmtKind, TypeExpr, VarDecl};
use crate::span::Span;
use std::collections::HashMap;

/// Main entry point for type checking a program.
///
/// Returns the typed program and the accumulated diagnostics; evaluation
/// must be skipped when the diagnostics list is non-empty.
pub fn check(program: Program) -> (TypedProgram, Vec<TypeDiagnostic>) {
    let mut checker = TypeChecker::new();

    checker.pass1(&program.decls);
    for decl in &program.decls {
        checker.pass2(decl);
    }

    let TypeChecker {
        expr_types,
        diagnostics,
        warnings,
        ..
    } = checker;

    (
        TypedProgram {
            program,
            expr_types,
            warnings,
        },
        diagnostics,
    )
}

/// A type-checked program
#[derive(Debug)]
pub struct TypedProgram {
    /// The program as parsed
    pub program: Program,
    /// The type of every expression, keyed by its span
    pub expr_types: HashMap<Span, Ty>,
    /// Non-fatal warnings
    pub warnings: Vec<TypeWarning>,
}

/// One entry in a name's overload set
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

/// The checker state: scope stacks for variables and function overloads,
/// plus the accumulating outputs
pub struct TypeChecker {
    var_scopes: Vec<HashMap<String, Ty>>,
    fn_scopes: Vec<HashMap<String, Vec<Overload>>>,
    expr_types: HashMap<Span, Ty>,
    diagnostics: Vec<TypeDiagnostic>,
    warnings: Vec<TypeWarning>,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            var_scopes: vec![HashMap::new()],
            fn_scopes: vec![HashMap::new()],
            expr_types: HashMap::new(),
            diagnostics: Vec::new(),
            warnings: Vec::new(),
        }
    }

    // ============ Scope management ============

    fn push_scopes(&mut self) {
        self.var_scopes.push(HashMap::new());
        self.fn_scopes.push(HashMap::new());
    }

    fn pop_scopes(&mut self) {
        self.var_scopes.pop();
        self.fn_scopes.pop();
    }

    pub(crate) fn vars_mut(&mut self) -> &mut HashMap<String, Ty> {
        self.var_scopes.last_mut().expect("at least the global scope")
    }

    pub(crate) fn lookup_variable(&self, name: &str) -> Option<&Ty> {
        self.var_scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub(crate) fn lookup_overload(&self, name: &str, args: &[Ty]) -> Option<&Overload> {
        self.fn_scopes
            .iter()
            .rev()
            .filter_map(|s| s.get(name))
            .flatten()
            .find(|o| Ty::all_compatible(&o.params, args))
    }

    pub(crate) fn install_placeholder(&mut self, name: &str, args: Vec<Ty>) {
        self.fn_scopes
            .last_mut()
            .expect("at least the global scope")
            .entry(name.to_string())
            .or_default()
            .push(Overload {
                params: args,
                ret: Ty::Error,
            });
    }

    pub(crate) fn diagnose(&mut self, diagnostic: TypeDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn record(&mut self, span: Span, ty: Ty) {
        self.expr_types.insert(span, ty);
    }

    /// Resolve a written annotation, reporting unrecognized names
    fn resolve_annotation(&mut self, written: &TypeExpr) -> Ty {
        match Ty::resolve(written) {
            Ok(ty) => ty,
            Err(name) => {
                self.diagnose(TypeDiagnostic::unknown_type(name.clone(), written.span));
                Ty::Unknown(name)
            }
        }
    }

    // ============ Pass 1: signature installation ============

    /// Install the signatures of all function declarations in a list
    fn pass1(&mut self, decls: &[Declaration]) {
        for decl in decls {
            if let Declaration::Function(d) = decl {
                self.install_function(d);
            }
        }
    }

    fn install_function(&mut self, d: &FnDecl) {
        let params: Vec<Ty> = d
            .params
            .iter()
            .map(|p| match &p.annotation {
                Some(te) => self.resolve_annotation(te),
                None => Ty::placeholder(),
            })
            .collect();
        let ret = match &d.return_type {
            Some(te) => self.resolve_annotation(te),
            None => Ty::placeholder(),
        };

        let duplicate = self
            .fn_scopes
            .last()
            .expect("at least the global scope")
            .get(&d.name.name)
            .is_some_and(|overloads| {
                overloads
                    .iter()
                    .any(|o| Ty::all_compatible(&o.params, &params))
            });
        if duplicate {
            self.diagnose(TypeDiagnostic::function_redefinition(
                d.name.name.clone(),
                d.name.span,
            ));
            return;
        }

        self.fn_scopes
            .last_mut()
            .expect("at least the global scope")
            .entry(d.name.name.clone())
            .or_default()
            .push(Overload { params, ret });
    }

    // ============ Pass 2: full checking ============

    fn pass2(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Variable(v) => self.check_var_decl(v),
            Declaration::Function(d) => self.check_fn_decl(d),
        }
    }

    fn check_var_decl(&mut self, v: &VarDecl) {
        let value_ty = self.check_expression(&v.value);
        let bound = match &v.annotation {
            Some(te) => {
                let annotated = self.resolve_annotation(te);
                if !annotated.compatible(&value_ty) {
                    self.diagnose(TypeDiagnostic::invalid_type(
                        annotated.clone(),
                        value_ty,
                        v.value.span,
                    ));
                }
                annotated
            }
            None => value_ty,
        };
        self.vars_mut().insert(v.name.name.clone(), bound);
    }

    fn check_fn_decl(&mut self, d: &FnDecl) {
        // Annotations were already resolved (and reported) by pass 1.
        let ret = Ty::from_annotation(d.return_type.as_ref());

        self.push_scopes();
        for p in &d.params {
            let ty = Ty::from_annotation(p.annotation.as_ref());
            self.vars_mut().insert(p.name.name.clone(), ty);
        }
        self.check_statement(&d.body, &ret);
        self.pop_scopes();

        if !ret.compatible(&Ty::Unit) && !always_returns(&d.body) {
            self.diagnose(TypeDiagnostic::missing_return_path(
                d.name.name.clone(),
                d.name.span,
            ));
        }
    }

    // ============ Statement checking ============

    fn check_statement(&mut self, stmt: &Statement, expected: &Ty) {
        match &stmt.kind {
            StmtKind::Expression(e) => {
                self.check_expression(e);
                if expr::is_pure(e) {
                    self.warnings.push(TypeWarning {
                        kind: TypeWarningKind::NoSideEffects,
                        span: stmt.span,
                    });
                }
            }
            StmtKind::If {
                predicate,
                then_branch,
            } => {
                self.check_predicate(predicate);
                self.check_branch(then_branch, expected);
            }
            StmtKind::IfElse {
                predicate,
                then_branch,
                else_branch,
            } => {
                self.check_predicate(predicate);
                self.check_branch(then_branch, expected);
                self.check_branch(else_branch, expected);
            }
            StmtKind::While { predicate, body } => {
                self.check_predicate(predicate);
                self.check_branch(body, expected);
            }
            StmtKind::DoWhile { body, predicate } => {
                self.check_branch(body, expected);
                self.check_predicate(predicate);
            }
            StmtKind::Return(None) => {
                if !expected.compatible(&Ty::Unit) {
                    self.diagnose(TypeDiagnostic::missing_return_value(
                        expected.clone(),
                        stmt.span,
                    ));
                }
            }
            StmtKind::Return(Some(v)) => {
                let ty = self.check_expression(v);
                if !ty.compatible(expected) {
                    self.diagnose(TypeDiagnostic::invalid_return_type(
                        expected.clone(),
                        ty,
                        v.span,
                    ));
                }
            }
            StmtKind::Assert(e) => self.check_predicate(e),
            StmtKind::Block(stmts) => self.check_block(stmts, expected),
            StmtKind::Declaration(decl) => {
                // A declaration directly in statement position: install and
                // check in one step.
                if let Declaration::Function(d) = decl.as_ref() {
                    self.install_function(d);
                }
                self.pass2(decl);
            }
        }
    }

    fn check_predicate(&mut self, e: &Expression) {
        let ty = self.check_expression(e);
        if !ty.compatible(&Ty::Bool) {
            self.diagnose(TypeDiagnostic::invalid_type(Ty::Bool, ty, e.span));
        }
    }

    /// Branches and loop bodies get their own scope, like the evaluator
    /// gives them their own block scope
    fn check_branch(&mut self, stmt: &Statement, expected: &Ty) {
        self.push_scopes();
        self.check_statement(stmt, expected);
        self.pop_scopes();
    }

    fn check_block(&mut self, stmts: &[Statement], expected: &Ty) {
        self.push_scopes();

        // Pass 1 over the block's own declaration list makes siblings
        // visible to each other regardless of order.
        for stmt in stmts {
            if let StmtKind::Declaration(decl) = &stmt.kind {
                if let Declaration::Function(d) = decl.as_ref() {
                    self.install_function(d);
                }
            }
        }

        for stmt in stmts {
            if let StmtKind::Declaration(decl) = &stmt.kind {
                self.pass2(decl);
            } else {
                self.check_statement(stmt, expected);
            }
        }

        self.pop_scopes();
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Syntactic "always returns" analysis: a `return` always returns, an
/// `if-else` returns iff both branches do, a block returns iff any element
/// does. Nothing else returns.
fn always_returns(stmt: &Statement) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::IfElse {
            then_branch,
            else_branch,
            ..
        } => always_returns(then_branch) && always_returns(else_branch),
        StmtKind::Block(stmts) => stmts.iter().any(always_returns),
        _ => false,
    }
}
