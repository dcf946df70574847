//! Statement and control-flow lowering from AST to SysLang IR.

use std::rc::Rc;

use super::IrGen;
use crate::ir::ir::*;
use crate::parser as ast;
use crate::parser::Type;
use crate::symtab::SymbolInfo;

impl IrGen {
    pub(super) fn lower_stmt(&mut self, stmt: &ast::Stmt) {
        // Statements after a return in the same block are not lowered.
        if self.terminated {
            return;
        }

        match stmt {
            ast::Stmt::Block(stmts) => {
                self.symbols.enter_scope("");
                for stmt in stmts {
                    if self.terminated {
                        break;
                    }
                    self.lower_stmt(stmt);
                }
                self.symbols.exit_scope();
            }
            ast::Stmt::Let {
                name, ty, init, token, ..
            } => self.lower_let(name, ty.as_ref(), init.as_ref(), token),
            ast::Stmt::Expr(expr) => {
                self.lower_expr(expr);
            }
            ast::Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => {
                        let (v, ty) = self.lower_expr(expr);
                        let ret_ty = self.ret_type.clone();
                        match &*ret_ty {
                            Type::Void => None,
                            _ => Some(self.coerce(v, &ty, &ret_ty)),
                        }
                    }
                    None => None,
                };
                self.emit(IrInst::ret(value));
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            ast::Stmt::While { cond, body } => self.lower_while(cond, body),
            ast::Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.lower_for(init.as_deref(), cond.as_ref(), update.as_ref(), body),
        }
    }

    fn lower_let(
        &mut self,
        name: &str,
        ty: Option<&Rc<Type>>,
        init: Option<&ast::Expr>,
        token: &crate::lexer::Token,
    ) {
        // With an annotation the slot is allocated up front; otherwise
        // the initialiser is lowered first so its type can be inferred.
        match (ty, init) {
            (Some(ty), init) => {
                let declared = ty.clone();
                let slot = self.declare_local(name, &declared);
                if let Some(init) = init {
                    let (value, from) = self.lower_expr(init);
                    let value = self.coerce(value, &from, &declared);
                    self.emit(IrInst::store(vec![value, IrValue::Var(slot)]));
                }
            }
            (None, Some(init)) => {
                let (value, inferred) = self.lower_expr(init);
                let slot = self.declare_local(name, &inferred);
                self.emit(IrInst::store(vec![value, IrValue::Var(slot)]));
            }
            (None, None) => {
                self.error_at(
                    token,
                    format!("Variable '{}' needs a type annotation or an initialiser", name),
                );
                self.declare_local(name, &Rc::new(Type::I32));
            }
        }
    }

    /// Allocate a stack slot for a local and bind the name to it.
    fn declare_local(&mut self, name: &str, ty: &Rc<Type>) -> IrVar {
        let size = self.type_size(ty);
        let slot = IrVar::new(self.new_slot(name), IrType::Pointer);
        self.emit(IrInst::alloca(slot.clone(), size));
        self.stack_size += size;
        self.symbols.define(
            name.to_string(),
            SymbolInfo::variable(ty.clone(), slot.name.clone()),
        );
        slot
    }

    /// `if` lowers to a then block, an optional else block, and a merge
    /// block. Arms that do not return branch to the merge block.
    fn lower_if(
        &mut self,
        cond: &ast::Expr,
        then_branch: &ast::Stmt,
        else_branch: Option<&ast::Stmt>,
    ) {
        let (cond_value, _) = self.lower_expr(cond);

        let then_label = self.fresh_label("then");
        let else_label = else_branch.map(|_| self.fresh_label("else"));
        let merge_label = self.fresh_label("merge");

        let false_target = else_label.clone().unwrap_or_else(|| merge_label.clone());
        self.close_with(IrInst::condbr(cond_value, then_label.clone(), false_target));

        self.start_block(then_label);
        self.lower_stmt(then_branch);
        self.close_with(IrInst::br(merge_label.clone()));

        if let (Some(else_label), Some(else_branch)) = (else_label, else_branch) {
            self.start_block(else_label);
            self.lower_stmt(else_branch);
            self.close_with(IrInst::br(merge_label.clone()));
        }

        self.start_block(merge_label);
    }

    /// `while` lowers to a header block holding the condition, a body
    /// block with a back-edge to the header, and an exit block.
    fn lower_while(&mut self, cond: &ast::Expr, body: &ast::Stmt) {
        let cond_label = self.fresh_label("while.cond");
        let body_label = self.fresh_label("while.body");
        let exit_label = self.fresh_label("while.exit");

        self.close_with(IrInst::br(cond_label.clone()));

        self.start_block(cond_label.clone());
        let (cond_value, _) = self.lower_expr(cond);
        self.close_with(IrInst::condbr(
            cond_value,
            body_label.clone(),
            exit_label.clone(),
        ));

        self.start_block(body_label);
        self.lower_stmt(body);
        self.close_with(IrInst::br(cond_label));

        self.start_block(exit_label);
    }

    /// `for` adds an update block between the body and the back-edge.
    fn lower_for(
        &mut self,
        init: Option<&ast::Stmt>,
        cond: Option<&ast::Expr>,
        update: Option<&ast::Expr>,
        body: &ast::Stmt,
    ) {
        self.symbols.enter_scope("");

        if let Some(init) = init {
            self.lower_stmt(init);
        }

        let cond_label = self.fresh_label("for.cond");
        let body_label = self.fresh_label("for.body");
        let update_label = self.fresh_label("for.update");
        let exit_label = self.fresh_label("for.exit");

        self.close_with(IrInst::br(cond_label.clone()));

        self.start_block(cond_label.clone());
        let cond_value = match cond {
            Some(cond) => self.lower_expr(cond).0,
            None => IrValue::Bool(true),
        };
        self.close_with(IrInst::condbr(
            cond_value,
            body_label.clone(),
            exit_label.clone(),
        ));

        self.start_block(body_label);
        self.lower_stmt(body);
        self.close_with(IrInst::br(update_label.clone()));

        self.start_block(update_label);
        if let Some(update) = update {
            self.lower_expr(update);
        }
        self.close_with(IrInst::br(cond_label));

        self.start_block(exit_label);
        self.symbols.exit_scope();
    }
}
