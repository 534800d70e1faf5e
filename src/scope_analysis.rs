//! Scope analysis: binds every name occurrence to its declaring node.
//!
//! A single pre-order walk over the tree. Declarations allocate an entry in
//! the program's [`DeclArena`] and register themselves in the symbol table;
//! name occurrences are resolved innermost-out and receive the `DeclId`
//! back-reference. Unknown names and duplicate top-level declarations are
//! diagnosed here; the walk continues after either so the checker still sees
//! a fully bound tree.

use crate::ast::{Block, Decl, DeclArena, DeclId, DeclKind, Exp, ExpKind, Program, Stat, TopLevel, Var};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::location::Loc;
use crate::symtab::{SymTab, FUNCTION_SENTINEL};
use crate::types::Type;

pub fn analyze(prog: &mut Program) -> Vec<Diagnostic> {
    let mut symtab = SymTab::new();
    let mut analyzer = Analyzer {
        decls: &mut prog.decls,
        diags: Vec::new(),
        filename: prog.filename.clone(),
    };
    analyzer.toplevels(&mut symtab, &mut prog.toplevels);
    analyzer.diags
}

struct Analyzer<'p> {
    decls: &'p mut DeclArena,
    diags: Vec<Diagnostic>,
    filename: String,
}

type St = SymTab<DeclId>;

impl Analyzer<'_> {
    fn error(&mut self, loc: Loc, message: String) {
        self.diags
            .push(Diagnostic::new(DiagnosticKind::Name, &self.filename, loc, message));
    }

    fn declare(&mut self, st: &mut St, decl: &mut Decl, kind: DeclKind) {
        let id = self.decls.add(&decl.name, decl.loc, kind);
        decl.id = Some(id);
        st.add_symbol(&decl.name, id);
    }

    fn toplevels(&mut self, st: &mut St, toplevels: &mut [TopLevel]) {
        for i in 0..toplevels.len() {
            let name = toplevels[i].name().to_string();
            let loc = toplevels[i].loc();
            if st.find_dup(&name).is_some() {
                toplevels[i].set_ignore();
                self.error(
                    loc,
                    format!("duplicate function or variable declaration for {name}"),
                );
                continue;
            }
            match &mut toplevels[i] {
                TopLevel::Func(f) => {
                    let id = self.decls.add(&f.name, f.loc, DeclKind::Function { toplevel: i });
                    f.id = Some(id);
                    st.add_symbol(&f.name, id);
                    st.with_block((&mut *self, f), |st, (this, f)| {
                        if let Some(id) = f.id {
                            st.add_symbol(FUNCTION_SENTINEL, id);
                        }
                        for p in &mut f.params {
                            if st.find_dup(&p.name).is_some() {
                                this.error(p.loc, format!("duplicate parameter {}", p.name));
                            }
                            this.declare(st, p, DeclKind::Local);
                        }
                        this.stats(st, &mut f.block);
                    });
                }
                TopLevel::Var(v) => {
                    // The initializer is resolved in the scope *before* the
                    // variable itself becomes visible.
                    self.exp(st, &mut v.value);
                    let id = self.decls.add(&v.decl.name, v.decl.loc, DeclKind::Global);
                    v.decl.id = Some(id);
                    st.add_symbol(&v.decl.name, id);
                }
                TopLevel::Record(r) => {
                    let id = self.decls.add(&r.name, r.loc, DeclKind::Global);
                    st.add_symbol(&r.name, id);
                }
                TopLevel::Import(im) => {
                    let id = self.decls.add(&im.local_name, im.loc, DeclKind::Global);
                    st.add_symbol(&im.local_name, id);
                }
            }
        }
    }

    fn block(&mut self, st: &mut St, block: &mut Block) {
        st.with_block(self, |st, this| this.stats(st, block));
    }

    fn stats(&mut self, st: &mut St, block: &mut Block) {
        for stat in &mut block.stats {
            self.stat(st, stat);
        }
    }

    fn stat(&mut self, st: &mut St, stat: &mut Stat) {
        match stat {
            Stat::Block { body, .. } => self.block(st, body),
            Stat::While { cond, body, .. } => {
                self.exp(st, cond);
                self.block(st, body);
            }
            Stat::Repeat { body, cond, .. } => {
                // The `until` condition is resolved inside the body's scope.
                st.with_block(self, |st, this| {
                    this.stats(st, body);
                    this.exp(st, cond);
                });
            }
            Stat::If { thens, els, .. } => {
                for (cond, body) in thens {
                    self.exp(st, cond);
                    self.block(st, body);
                }
                if let Some(els) = els {
                    self.block(st, els);
                }
            }
            Stat::For {
                decl,
                start,
                finish,
                step,
                body,
                ..
            } => {
                self.exp(st, start);
                self.exp(st, finish);
                if let Some(step) = step {
                    self.exp(st, step);
                }
                st.with_block(self, |st, this| {
                    this.declare(st, decl, DeclKind::Local);
                    this.stats(st, body);
                });
            }
            Stat::Assign { var, exp, .. } => {
                self.exp(st, exp);
                self.var(st, var);
            }
            Stat::Decl { decl, exp, .. } => {
                // `local x = x` refers to the outer x.
                self.exp(st, exp);
                self.declare(st, decl, DeclKind::Local);
            }
            Stat::Call { call, .. } => self.exp(st, call),
            Stat::Return { exp, .. } => {
                if let Some(exp) = exp {
                    self.exp(st, exp);
                }
            }
        }
    }

    fn exp(&mut self, st: &mut St, exp: &mut Exp) {
        match &mut exp.kind {
            ExpKind::Nil
            | ExpKind::Bool(_)
            | ExpKind::Integer(_)
            | ExpKind::Float(_)
            | ExpKind::Str(_) => {}
            ExpKind::Var(var) => self.var(st, var),
            ExpKind::Unop { exp, .. } => self.exp(st, exp),
            ExpKind::Binop { lhs, rhs, .. } => {
                self.exp(st, lhs);
                self.exp(st, rhs);
            }
            ExpKind::Call { func, args } => {
                self.exp(st, func);
                for a in args {
                    self.exp(st, a);
                }
            }
            ExpKind::Initlist { exps } | ExpKind::Concat { exps } => {
                for e in exps {
                    self.exp(st, e);
                }
            }
            ExpKind::Cast { exp, .. } => self.exp(st, exp),
        }
    }

    fn var(&mut self, st: &mut St, var: &mut Var) {
        match var {
            Var::Name { loc, name, decl } => match st.find_symbol(name) {
                Some(id) => *decl = Some(id),
                None => {
                    self.error(*loc, format!("variable {name} not declared"));
                    // Attach a recovery declaration so the checker still
                    // sees a bound, typed node.
                    let id = self.decls.add(name, *loc, DeclKind::Local);
                    self.decls.get_mut(id).ty = Some(Type::Invalid);
                    *decl = Some(id);
                }
            },
            Var::Bracket { exp, index, .. } => {
                self.exp(st, exp);
                self.exp(st, index);
            }
            Var::Dot { exp, .. } => self.exp(st, exp),
        }
    }
}
