//! Expression lowering from AST to SysLang IR.

use std::rc::Rc;

use super::IrGen;
use crate::ir::ir::*;
use crate::lexer::TokenKind;
use crate::parser as ast;
use crate::parser::{ExprKind, Type};
use crate::symtab::SymbolKind;

/// A resolved storage location: a stack slot, optionally indexed by a
/// byte offset.
pub(super) struct Place {
    pub(super) slot: IrVar,
    pub(super) offset: Option<IrValue>,
    pub(super) ty: Rc<Type>,
}

impl IrGen {
    /// Lower an expression in r-value context. Always produces a value;
    /// errors substitute a typed zero. The resolved type is written back
    /// into the node.
    pub(super) fn lower_expr(&mut self, expr: &ast::Expr) -> (IrValue, Rc<Type>) {
        let (value, ty) = self.lower_expr_inner(expr);
        *expr.ty.borrow_mut() = Some(ty.clone());
        (value, ty)
    }

    fn lower_expr_inner(&mut self, expr: &ast::Expr) -> (IrValue, Rc<Type>) {
        match &expr.kind {
            ExprKind::IntLit(value) => {
                if i32::try_from(*value).is_ok() {
                    (IrValue::Int(*value, IrType::I32), Rc::new(Type::I32))
                } else {
                    (IrValue::Int(*value, IrType::I64), Rc::new(Type::I64))
                }
            }
            ExprKind::FloatLit(value) => {
                (IrValue::Float(*value, IrType::F64), Rc::new(Type::F64))
            }
            ExprKind::BoolLit(value) => (IrValue::Bool(*value), Rc::new(Type::Bool)),
            ExprKind::CharLit(value) => (
                IrValue::Int(*value as i64, IrType::I8),
                Rc::new(Type::Char),
            ),
            ExprKind::StrLit(text) => {
                let index = self
                    .strings
                    .iter()
                    .position(|s| s == text)
                    .unwrap_or_else(|| {
                        self.strings.push(text.clone());
                        self.strings.len() - 1
                    });
                (
                    IrValue::Global(IrVar::new(format!(".str{}", index), IrType::Pointer)),
                    Rc::new(Type::Str),
                )
            }
            ExprKind::NullLit => (
                IrValue::Int(0, IrType::Pointer),
                Rc::new(Type::Pointer(Rc::new(Type::Void))),
            ),
            ExprKind::Ident(name) => self.lower_ident(expr, name),
            ExprKind::Binary { op, left, right } => {
                if op.is_assignment() {
                    self.lower_assignment(expr, *op, left, right)
                } else if matches!(op, TokenKind::AndAnd | TokenKind::OrOr) {
                    self.lower_short_circuit(*op, left, right)
                } else {
                    self.lower_binary(expr, *op, left, right)
                }
            }
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::Cast { target, operand } => {
                let (value, from) = self.lower_expr(operand);
                let value = self.coerce(value, &from, target);
                (value, target.clone())
            }
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                match self.resolve_place(expr) {
                    Some(place) => self.load_place(&place),
                    None => (IrValue::Int(0, IrType::I32), Rc::new(Type::I32)),
                }
            }
            ExprKind::InlineAsm {
                text,
                volatile,
                clobbers,
            } => {
                self.emit(IrInst::inline_asm(InlineAsm {
                    text: text.clone(),
                    volatile: *volatile,
                    clobbers: clobbers.clone(),
                }));
                (IrValue::Int(0, IrType::I64), Rc::new(Type::Void))
            }
        }
    }

    fn lower_ident(&mut self, expr: &ast::Expr, name: &str) -> (IrValue, Rc<Type>) {
        let Some(info) = self.symbols.lookup(name).cloned() else {
            self.error_at(&expr.token, format!("Undefined variable '{}'", name));
            return (IrValue::Int(0, IrType::I32), Rc::new(Type::I32));
        };

        match info.kind {
            SymbolKind::Variable => {
                let slot = info.slot.clone().unwrap_or_else(|| name.to_string());
                let result = IrVar::new(self.fresh_temp(), self.ir_type(&info.ty));
                self.emit(IrInst::load(
                    result.clone(),
                    vec![IrValue::Var(IrVar::new(slot, IrType::Pointer))],
                ));
                (IrValue::Var(result), info.ty)
            }
            SymbolKind::Constant => {
                let value = info.value.unwrap_or(0);
                (IrValue::Int(value, IrType::I32), Rc::new(Type::I32))
            }
            SymbolKind::Function => (
                IrValue::Global(IrVar::new(name, IrType::Pointer)),
                Rc::new(Type::Function),
            ),
            SymbolKind::Type => {
                self.error_at(&expr.token, format!("'{}' is a type, not a value", name));
                (IrValue::Int(0, IrType::I32), Rc::new(Type::I32))
            }
        }
    }

    fn lower_binary(
        &mut self,
        expr: &ast::Expr,
        op: TokenKind,
        left: &ast::Expr,
        right: &ast::Expr,
    ) -> (IrValue, Rc<Type>) {
        let (lv, lt) = self.lower_expr(left);
        let (rv, rt) = self.lower_expr(right);
        let (lv, rv, ty) = self.unify(expr, lv, lt, rv, rt);

        let opcode = match op {
            TokenKind::Plus => Opcode::Add,
            TokenKind::Minus => Opcode::Sub,
            TokenKind::Star => Opcode::Mul,
            TokenKind::Slash => Opcode::Div,
            TokenKind::Percent => Opcode::Mod,
            TokenKind::Amp => Opcode::And,
            TokenKind::Pipe => Opcode::Or,
            TokenKind::Caret => Opcode::Xor,
            TokenKind::Shl => Opcode::Shl,
            TokenKind::Shr => Opcode::Shr,
            TokenKind::EqEq => Opcode::Eq,
            TokenKind::NotEq => Opcode::Ne,
            TokenKind::Lt => Opcode::Lt,
            TokenKind::Gt => Opcode::Gt,
            TokenKind::LtEq => Opcode::Le,
            TokenKind::GtEq => Opcode::Ge,
            other => {
                self.error_at(&expr.token, format!("Unsupported operator '{}'", other));
                return (lv, ty);
            }
        };

        if opcode.is_comparison() {
            let result = IrVar::new(self.fresh_temp(), IrType::Bool);
            self.emit(IrInst::binary(opcode, result.clone(), lv, rv));
            (IrValue::Var(result), Rc::new(Type::Bool))
        } else {
            let result = IrVar::new(self.fresh_temp(), self.ir_type(&ty));
            self.emit(IrInst::binary(opcode, result.clone(), lv, rv));
            (IrValue::Var(result), ty)
        }
    }

    /// `&&` and `||` lower to a diamond around a merge slot: the RHS is
    /// evaluated only when the LHS does not already decide the result.
    fn lower_short_circuit(
        &mut self,
        op: TokenKind,
        left: &ast::Expr,
        right: &ast::Expr,
    ) -> (IrValue, Rc<Type>) {
        let (prefix_rhs, prefix_end) = if op == TokenKind::AndAnd {
            ("and.rhs", "and.end")
        } else {
            ("or.rhs", "or.end")
        };
        let rhs_label = self.fresh_label(prefix_rhs);
        let end_label = self.fresh_label(prefix_end);

        let slot = IrVar::new(self.new_slot("sc"), IrType::Pointer);
        self.emit(IrInst::alloca(slot.clone(), IrType::Bool.size()));
        self.stack_size += IrType::Bool.size();

        let (lv, _) = self.lower_expr(left);
        self.emit(IrInst::store(vec![lv.clone(), IrValue::Var(slot.clone())]));

        if op == TokenKind::AndAnd {
            self.close_with(IrInst::condbr(lv, rhs_label.clone(), end_label.clone()));
        } else {
            self.close_with(IrInst::condbr(lv, end_label.clone(), rhs_label.clone()));
        }

        self.start_block(rhs_label);
        let (rv, _) = self.lower_expr(right);
        self.emit(IrInst::store(vec![rv, IrValue::Var(slot.clone())]));
        self.close_with(IrInst::br(end_label.clone()));

        self.start_block(end_label);
        let result = IrVar::new(self.fresh_temp(), IrType::Bool);
        self.emit(IrInst::load(result.clone(), vec![IrValue::Var(slot)]));
        (IrValue::Var(result), Rc::new(Type::Bool))
    }

    fn lower_unary(
        &mut self,
        expr: &ast::Expr,
        op: TokenKind,
        operand: &ast::Expr,
    ) -> (IrValue, Rc<Type>) {
        let (value, ty) = self.lower_expr(operand);

        let (opcode, result_ty) = match op {
            TokenKind::Minus => (Opcode::Neg, ty.clone()),
            TokenKind::Not => (Opcode::Not, Rc::new(Type::Bool)),
            TokenKind::Tilde => (Opcode::BitNot, ty.clone()),
            other => {
                self.error_at(&expr.token, format!("Unsupported operator '{}'", other));
                return (value, ty);
            }
        };

        let result = IrVar::new(self.fresh_temp(), self.ir_type(&result_ty));
        self.emit(IrInst::unary(opcode, result.clone(), value));
        (IrValue::Var(result), result_ty)
    }

    fn lower_assignment(
        &mut self,
        expr: &ast::Expr,
        op: TokenKind,
        left: &ast::Expr,
        right: &ast::Expr,
    ) -> (IrValue, Rc<Type>) {
        let Some(place) = self.resolve_place(left) else {
            self.error_at(&expr.token, "Expression is not assignable");
            return self.lower_expr(right);
        };

        let (rv, rt) = self.lower_expr(right);

        let value = if op == TokenKind::Eq {
            self.coerce(rv, &rt, &place.ty.clone())
        } else {
            // Compound assignment: load, operate, store.
            let opcode = match op {
                TokenKind::PlusEq => Opcode::Add,
                TokenKind::MinusEq => Opcode::Sub,
                TokenKind::StarEq => Opcode::Mul,
                TokenKind::SlashEq => Opcode::Div,
                TokenKind::PercentEq => Opcode::Mod,
                _ => unreachable!("not a compound assignment"),
            };
            let (current, ct) = self.load_place(&place);
            let rv = self.coerce(rv, &rt, &ct);
            let result = IrVar::new(self.fresh_temp(), self.ir_type(&ct));
            self.emit(IrInst::binary(opcode, result.clone(), current, rv));
            IrValue::Var(result)
        };

        self.store_place(&place, value.clone());
        (value, place.ty)
    }

    fn lower_call(
        &mut self,
        expr: &ast::Expr,
        callee: &ast::Expr,
        args: &[ast::Expr],
    ) -> (IrValue, Rc<Type>) {
        let ExprKind::Ident(name) = &callee.kind else {
            self.error_at(&expr.token, "Called expression is not a function");
            return (IrValue::Int(0, IrType::I32), Rc::new(Type::I32));
        };

        let sig = self.functions.get(name).cloned();
        if sig.is_none() {
            self.error_at(&expr.token, format!("Undefined function '{}'", name));
        }

        if let Some(sig) = &sig {
            if args.len() != sig.params.len() && !sig.is_variadic {
                self.error_at(
                    &expr.token,
                    format!(
                        "Function '{}' expects {} arguments, got {}",
                        name,
                        sig.params.len(),
                        args.len()
                    ),
                );
            }
        }

        // Arguments evaluate left to right.
        let mut operands = vec![IrValue::Global(IrVar::new(name.clone(), IrType::Pointer))];
        for (i, arg) in args.iter().enumerate() {
            let (value, ty) = self.lower_expr(arg);
            let value = match sig.as_ref().and_then(|s| s.params.get(i)) {
                Some(param_ty) => self.coerce(value, &ty, &param_ty.clone()),
                None => value,
            };
            operands.push(value);
        }

        let ret = sig.map(|s| s.ret).unwrap_or_else(|| Rc::new(Type::I32));
        let mut inst = IrInst::new(Opcode::Call);
        inst.operands = operands;

        if matches!(&*ret, Type::Void) {
            self.emit(inst);
            (IrValue::Int(0, IrType::I32), ret)
        } else {
            let result = IrVar::new(self.fresh_temp(), self.ir_type(&ret));
            inst.result = Some(result.clone());
            self.emit(inst);
            (IrValue::Var(result), ret)
        }
    }

    // Places (l-values)

    /// Resolve an expression in l-value context: the slot pointer plus
    /// an optional byte offset.
    pub(super) fn resolve_place(&mut self, expr: &ast::Expr) -> Option<Place> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let Some(info) = self.symbols.lookup(name).cloned() else {
                    self.error_at(&expr.token, format!("Undefined variable '{}'", name));
                    return None;
                };
                if info.kind != SymbolKind::Variable {
                    self.error_at(&expr.token, format!("'{}' is not assignable", name));
                    return None;
                }
                let slot = info.slot.clone().unwrap_or_else(|| name.to_string());
                Some(Place {
                    slot: IrVar::new(slot, IrType::Pointer),
                    offset: None,
                    ty: info.ty,
                })
            }
            ExprKind::Index { base, index } => {
                let place = self.resolve_place(base)?;
                let elem_ty = match &*place.ty {
                    Type::Array(inner, _) => inner.clone(),
                    Type::Pointer(inner) => inner.clone(),
                    other => {
                        self.error_at(
                            &expr.token,
                            format!("Type '{}' cannot be indexed", other),
                        );
                        return None;
                    }
                };
                let elem_size = self.type_size(&elem_ty);

                let (idx, idx_ty) = self.lower_expr(index);
                let scaled = self.scale_index(idx, &idx_ty, elem_size);
                let offset = self.combine_offsets(place.offset, scaled);

                Some(Place {
                    slot: place.slot,
                    offset: Some(offset),
                    ty: elem_ty,
                })
            }
            ExprKind::Member { base, field } => {
                let place = self.resolve_place(base)?;
                let Type::Named(struct_name) = &*place.ty else {
                    self.error_at(
                        &expr.token,
                        format!("Type '{}' has no members", place.ty),
                    );
                    return None;
                };
                let Some((field_ty, field_offset)) = self
                    .structs
                    .get(struct_name)
                    .and_then(|layout| {
                        layout
                            .fields
                            .iter()
                            .find(|(name, _, _)| name == field)
                            .map(|(_, ty, offset)| (ty.clone(), *offset))
                    })
                else {
                    self.error_at(
                        &expr.token,
                        format!("Struct '{}' has no field '{}'", struct_name, field),
                    );
                    return None;
                };

                let offset = self.combine_offsets(
                    place.offset,
                    IrValue::Int(field_offset as i64, IrType::I64),
                );
                Some(Place {
                    slot: place.slot,
                    offset: Some(offset),
                    ty: field_ty,
                })
            }
            _ => {
                self.error_at(&expr.token, "Expression is not addressable");
                None
            }
        }
    }

    /// Multiply an index value by the element size, folding constants.
    fn scale_index(&mut self, idx: IrValue, idx_ty: &Rc<Type>, elem_size: usize) -> IrValue {
        match idx {
            IrValue::Int(value, _) => IrValue::Int(value * elem_size as i64, IrType::I64),
            IrValue::Uint(value, _) => IrValue::Int(value as i64 * elem_size as i64, IrType::I64),
            other => {
                let wide = self.coerce(other, idx_ty, &Rc::new(Type::I64));
                let result = IrVar::new(self.fresh_temp(), IrType::I64);
                self.emit(IrInst::binary(
                    Opcode::Mul,
                    result.clone(),
                    wide,
                    IrValue::Int(elem_size as i64, IrType::I64),
                ));
                IrValue::Var(result)
            }
        }
    }

    fn combine_offsets(&mut self, base: Option<IrValue>, add: IrValue) -> IrValue {
        match base {
            None => add,
            Some(IrValue::Int(a, _)) => match add {
                IrValue::Int(b, _) => IrValue::Int(a + b, IrType::I64),
                other => {
                    let result = IrVar::new(self.fresh_temp(), IrType::I64);
                    self.emit(IrInst::binary(
                        Opcode::Add,
                        result.clone(),
                        IrValue::Int(a, IrType::I64),
                        other,
                    ));
                    IrValue::Var(result)
                }
            },
            Some(base) => {
                let result = IrVar::new(self.fresh_temp(), IrType::I64);
                self.emit(IrInst::binary(Opcode::Add, result.clone(), base, add));
                IrValue::Var(result)
            }
        }
    }

    pub(super) fn load_place(&mut self, place: &Place) -> (IrValue, Rc<Type>) {
        let result = IrVar::new(self.fresh_temp(), self.ir_type(&place.ty));
        let mut operands = vec![IrValue::Var(place.slot.clone())];
        if let Some(offset) = &place.offset {
            operands.push(offset.clone());
        }
        self.emit(IrInst::load(result.clone(), operands));
        (IrValue::Var(result), place.ty.clone())
    }

    pub(super) fn store_place(&mut self, place: &Place, value: IrValue) {
        let mut operands = vec![value, IrValue::Var(place.slot.clone())];
        if let Some(offset) = &place.offset {
            operands.push(offset.clone());
        }
        self.emit(IrInst::store(operands));
    }

    // Type coercion

    /// Bring both operands of a binary operator to a common type,
    /// following integer promotion: narrower widens to wider, integers
    /// convert towards floats.
    pub(super) fn unify(
        &mut self,
        expr: &ast::Expr,
        lv: IrValue,
        lt: Rc<Type>,
        rv: IrValue,
        rt: Rc<Type>,
    ) -> (IrValue, IrValue, Rc<Type>) {
        if lt == rt {
            return (lv, rv, lt);
        }

        let numeric = |ty: &Type| ty.is_integer() || ty.is_float() || matches!(ty, Type::Bool);
        let target = if lt.is_float() && rt.is_float() {
            if lt.size_in_bytes() >= rt.size_in_bytes() {
                lt.clone()
            } else {
                rt.clone()
            }
        } else if lt.is_float() && numeric(&rt) {
            lt.clone()
        } else if rt.is_float() && numeric(&lt) {
            rt.clone()
        } else if lt.is_integer() && rt.is_integer() {
            match lt.size_in_bytes().cmp(&rt.size_in_bytes()) {
                std::cmp::Ordering::Greater => lt.clone(),
                std::cmp::Ordering::Less => rt.clone(),
                // Same width, mixed signedness: the unsigned side wins.
                std::cmp::Ordering::Equal => {
                    if lt.is_signed() {
                        rt.clone()
                    } else {
                        lt.clone()
                    }
                }
            }
        } else if matches!(&*lt, Type::Bool) && rt.is_integer() {
            rt.clone()
        } else if matches!(&*rt, Type::Bool) && lt.is_integer() {
            lt.clone()
        } else if matches!(&*lt, Type::Pointer(_) | Type::Str)
            && matches!(&*rt, Type::Pointer(_) | Type::Str)
        {
            lt.clone()
        } else {
            self.error_at(
                &expr.token,
                format!("Incompatible operand types '{}' and '{}'", lt, rt),
            );
            lt.clone()
        };

        let lv = self.coerce(lv, &lt, &target);
        let rv = self.coerce(rv, &rt, &target);
        (lv, rv, target)
    }

    /// Convert `value` from one type to another, choosing the conversion
    /// opcode from the type pair. Constants convert at compile time.
    pub(super) fn coerce(&mut self, value: IrValue, from: &Rc<Type>, to: &Rc<Type>) -> IrValue {
        if from == to {
            return value;
        }
        let from_ir = self.ir_type(from);
        let to_ir = self.ir_type(to);
        if from_ir == to_ir {
            return value;
        }

        if value.is_const() {
            if let Some(converted) = value.convert_to(to_ir) {
                return converted;
            }
        }

        let opcode = conversion_opcode(from_ir, to_ir);
        let result = IrVar::new(self.fresh_temp(), to_ir);
        self.emit(IrInst::unary(opcode, result.clone(), value));
        IrValue::Var(result)
    }
}

/// Choose the conversion opcode for a type pair.
fn conversion_opcode(from: IrType, to: IrType) -> Opcode {
    if from.is_float() && to.is_float() {
        return Opcode::Bitcast;
    }
    if from.is_float() {
        return if to.is_signed() {
            Opcode::FpToSi
        } else {
            Opcode::FpToUi
        };
    }
    if to.is_float() {
        return if from.is_signed() {
            Opcode::SiToFp
        } else {
            Opcode::UiToFp
        };
    }
    match from.size().cmp(&to.size()) {
        std::cmp::Ordering::Less => {
            if from.is_signed() {
                Opcode::SExt
            } else {
                Opcode::ZExt
            }
        }
        std::cmp::Ordering::Greater => Opcode::Trunc,
        std::cmp::Ordering::Equal => Opcode::Bitcast,
    }
}
