//! Expression type synthesis
//!
//! A bottom-up walk: each expression gets a type from its children and the
//! operator tables. Any `Error` child taints the parent silently, so a
//! single diagnostic covers a whole broken subtree.

use crate::ast::{AssignOp, BinaryOp, ExprKind, Expression, Ident, UnaryOp};
use crate::span::Span;
use crate::typeck::error::TypeDiagnostic;
use crate::typeck::{Ty, TypeChecker};

impl TypeChecker {
    /// Check an expression, record its type in the span table, and return it
    pub(super) fn check_expression(&mut self, expr: &Expression) -> Ty {
        let ty = self.expression_type(expr);
        self.record(expr.span, ty.clone());
        ty
    }

    fn expression_type(&mut self, expr: &Expression) -> Ty {
        match &expr.kind {
            ExprKind::Integer(_) => Ty::Int,
            ExprKind::Rational(_) => Ty::Float,
            ExprKind::Boolean(_) => Ty::Bool,
            ExprKind::Variable(id) => self.check_variable(id),
            ExprKind::Array(elems) => self.check_array(elems),
            ExprKind::Call { callee, args } => self.check_call(callee, args),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expr.span),
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right, expr.span),
            ExprKind::Assign { op, target, value } => {
                self.check_assign(*op, target, value, expr.span)
            }
            ExprKind::Access { array, index } => self.check_access(array, index),
            ExprKind::Parenthesized(inner) => self.check_expression(inner),
        }
    }

    fn check_variable(&mut self, id: &Ident) -> Ty {
        if let Some(ty) = self.lookup_variable(&id.name) {
            return ty.clone();
        }
        self.diagnose(TypeDiagnostic::unknown_variable(id.name.clone(), id.span));
        // Bind the name to Error so the miss is reported once.
        self.vars_mut().insert(id.name.clone(), Ty::Error);
        Ty::Error
    }

    fn check_array(&mut self, elems: &[Expression]) -> Ty {
        let mut unified = Ty::placeholder();
        for elem in elems {
            let ty = self.check_expression(elem);
            if !unified.compatible(&ty) {
                self.diagnose(TypeDiagnostic::invalid_type(unified.clone(), ty, elem.span));
            } else if matches!(unified, Ty::Unknown(_)) && !matches!(ty, Ty::Unknown(_)) {
                // Prefer the first concrete element type as representative.
                unified = ty;
            }
        }
        Ty::array(unified)
    }

    fn check_call(&mut self, callee: &Ident, args: &[Expression]) -> Ty {
        let arg_tys: Vec<Ty> = args.iter().map(|a| self.check_expression(a)).collect();

        // An erroneous argument already carries a diagnostic.
        if arg_tys.iter().any(Ty::is_error) {
            return Ty::Error;
        }

        if let Some(overload) = self.lookup_overload(&callee.name, &arg_tys) {
            return overload.ret.clone();
        }

        self.diagnose(TypeDiagnostic::unknown_function(
            callee.name.clone(),
            arg_tys.clone(),
            callee.span,
        ));
        // A placeholder overload silences subsequent identical calls.
        self.install_placeholder(&callee.name, arg_tys);
        Ty::Error
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expression, span: Span) -> Ty {
        let ty = self.check_expression(operand);
        if ty.is_error() {
            return Ty::Error;
        }

        match op {
            UnaryOp::Plus | UnaryOp::Minus => {
                if ty.compatible(&Ty::Int) {
                    Ty::Int
                } else if ty.compatible(&Ty::Float) {
                    Ty::Float
                } else {
                    self.diagnose(TypeDiagnostic::invalid_unary(op, ty, span));
                    Ty::Error
                }
            }
            UnaryOp::Not => {
                if ty.compatible(&Ty::Bool) {
                    Ty::Bool
                } else {
                    self.diagnose(TypeDiagnostic::invalid_unary(op, ty, span));
                    Ty::Error
                }
            }
            UnaryOp::Len => {
                if ty.compatible(&Ty::array(Ty::placeholder())) {
                    Ty::Int
                } else {
                    self.diagnose(TypeDiagnostic::invalid_unary(op, ty, span));
                    Ty::Error
                }
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expression, right: &Expression, span: Span) -> Ty {
        let lt = self.check_expression(left);
        let rt = self.check_expression(right);
        if lt.is_error() || rt.is_error() {
            return Ty::Error;
        }

        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if lt.compatible(&Ty::Int) && rt.compatible(&Ty::Int) {
                    Ty::Int
                } else if lt.compatible(&Ty::Float) && rt.compatible(&Ty::Float) {
                    Ty::Float
                } else if op == BinaryOp::Mul && matches!(lt, Ty::Array(_)) && rt.compatible(&Ty::Int)
                {
                    // Repetition: [T] * Int
                    lt
                } else if op == BinaryOp::Mul && lt.compatible(&Ty::Int) && matches!(rt, Ty::Array(_))
                {
                    rt
                } else {
                    self.diagnose(TypeDiagnostic::invalid_binary(op, lt, rt, span));
                    Ty::Error
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if lt.compatible(&rt) {
                    Ty::Bool
                } else {
                    self.diagnose(TypeDiagnostic::invalid_binary(op, lt, rt, span));
                    Ty::Error
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordered = (lt.compatible(&Ty::Int) && rt.compatible(&Ty::Int))
                    || (lt.compatible(&Ty::Float) && rt.compatible(&Ty::Float));
                if ordered {
                    Ty::Bool
                } else {
                    self.diagnose(TypeDiagnostic::invalid_binary(op, lt, rt, span));
                    Ty::Error
                }
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                if lt.compatible(&Ty::Bool) && rt.compatible(&Ty::Bool) {
                    Ty::Bool
                } else {
                    self.diagnose(TypeDiagnostic::invalid_binary(op, lt, rt, span));
                    Ty::Error
                }
            }
        }
    }

    fn check_assign(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> Ty {
        let target_ty = self.check_expression(target);
        let value_ty = self.check_expression(value);

        if !is_lvalue(target) {
            self.diagnose(TypeDiagnostic::invalid_assign(op, target_ty, value_ty, span));
            return Ty::Error;
        }
        if target_ty.is_error() || value_ty.is_error() {
            return Ty::Error;
        }

        let valid = target_ty.compatible(&value_ty)
            && (op == AssignOp::Assign
                || (target_ty.is_arithmetic() && value_ty.is_arithmetic()));
        if !valid {
            self.diagnose(TypeDiagnostic::invalid_assign(op, target_ty, value_ty.clone(), span));
            return Ty::Error;
        }

        // The assignment yields the stored value.
        value_ty
    }

    fn check_access(&mut self, array: &Expression, index: &Expression) -> Ty {
        let array_ty = self.check_expression(array);
        let index_ty = self.check_expression(index);

        if !index_ty.compatible(&Ty::Int) {
            self.diagnose(TypeDiagnostic::invalid_type(Ty::Int, index_ty, index.span));
        }

        match array_ty {
            Ty::Array(elem) => *elem,
            Ty::Error => Ty::Error,
            Ty::Unknown(_) => Ty::placeholder(),
            other => {
                self.diagnose(TypeDiagnostic::invalid_type(
                    Ty::array(Ty::placeholder()),
                    other,
                    array.span,
                ));
                Ty::Error
            }
        }
    }
}

/// An l-value is a bare variable or an index chain into one
fn is_lvalue(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::Variable(_) | ExprKind::Access { .. })
}

/// A pure expression cannot have an effect: no call and no assignment
/// anywhere inside it
pub(super) fn is_pure(expr: &Expression) -> bool {
    match &expr.kind {
        ExprKind::Integer(_)
        | ExprKind::Rational(_)
        | ExprKind::Boolean(_)
        | ExprKind::Variable(_) => true,
        ExprKind::Array(elems) => elems.iter().all(is_pure),
        ExprKind::Call { .. } | ExprKind::Assign { .. } => false,
        ExprKind::Unary { operand, .. } => is_pure(operand),
        ExprKind::Binary { left, right, .. } => is_pure(left) && is_pure(right),
        ExprKind::Access { array, index } => is_pure(array) && is_pure(index),
        ExprKind::Parenthesized(inner) => is_pure(inner),
    }
}
