//! Type checking and elaboration.
//!
//! Two passes over the top levels. Pass 1 collects the declared type of
//! every top-level function and variable (and registers record types) without
//! looking at any expression. Pass 2 walks bodies and initializers, computing
//! and annotating the type of every expression, inserting explicit `Cast`
//! nodes where an integer operand meets a float context, and verifying that
//! every function whose return type is not `nil` returns on all paths.
//!
//! The checker never stops at the first error. A failed check produces a
//! diagnostic and a recovery type (`Type::Invalid`) which matches anything,
//! so one mistake does not spawn a cascade of secondary reports.

use crate::ast::{
    Binop, Block, DeclArena, DeclId, DeclKind, Exp, ExpKind, Program, Stat, TopLevel, TypeExpr,
    Unop, Var,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::location::Loc;
use crate::symtab::{SymTab, FUNCTION_SENTINEL};
use crate::types::Type;
use rustc_hash::FxHashMap;
use std::collections::HashSet;

pub fn check(prog: &mut Program) -> Vec<Diagnostic> {
    let mut symtab = SymTab::new();
    let mut checker = Checker {
        decls: &mut prog.decls,
        records: FxHashMap::default(),
        diags: Vec::new(),
        filename: prog.filename.clone(),
    };
    checker.collect(&mut prog.toplevels);
    checker.check_toplevels(&mut symtab, &mut prog.toplevels);
    checker.diags
}

struct Checker<'p> {
    decls: &'p mut DeclArena,
    records: FxHashMap<String, Type>,
    diags: Vec<Diagnostic>,
    filename: String,
}

type St = SymTab<DeclId>;

impl Checker<'_> {
    fn type_error(&mut self, loc: Loc, message: String) {
        self.diags
            .push(Diagnostic::new(DiagnosticKind::Type, &self.filename, loc, message));
    }

    fn not_implemented(&mut self, loc: Loc, what: &str) {
        self.diags.push(Diagnostic::new(
            DiagnosticKind::NotImplemented,
            &self.filename,
            loc,
            format!("{what} are not implemented"),
        ));
    }

    // ----- pass 1: collect declared types --------------------------------

    fn collect(&mut self, toplevels: &mut [TopLevel]) {
        // Records first, so any signature may mention any record.
        for tl in toplevels.iter_mut() {
            if tl.ignore() {
                continue;
            }
            if let TopLevel::Record(r) = tl {
                let mut fields = Vec::new();
                let mut seen = HashSet::new();
                for (fname, fte) in &r.fields {
                    if !seen.insert(fname.clone()) {
                        let loc = fte.loc();
                        self.type_error(
                            loc,
                            format!("duplicate field {fname} in record {}", r.name),
                        );
                        continue;
                    }
                    let ft = self.type_from_expr(fte);
                    fields.push((fname.clone(), ft));
                }
                self.records.insert(
                    r.name.clone(),
                    Type::Record {
                        name: r.name.clone(),
                        fields,
                    },
                );
            }
        }

        let mut seen = HashSet::new();
        for tl in toplevels.iter_mut() {
            if !tl.ignore() && !seen.insert(tl.name().to_string()) {
                let loc = tl.loc();
                let name = tl.name().to_string();
                tl.set_ignore();
                self.type_error(
                    loc,
                    format!("duplicate function or variable declaration for {name}"),
                );
                continue;
            }
            if tl.ignore() {
                continue;
            }
            match tl {
                TopLevel::Func(f) => {
                    if f.return_types.len() > 1 {
                        self.not_implemented(f.loc, "functions with multiple return values");
                    }
                    let mut params = Vec::new();
                    for p in &f.params {
                        let pt = match &p.type_expr {
                            Some(te) => self.type_from_expr(te),
                            None => Type::Invalid,
                        };
                        if let Some(id) = p.id {
                            self.decls.get_mut(id).ty = Some(pt.clone());
                        }
                        params.push(pt);
                    }
                    let rets: Vec<Type> = f
                        .return_types
                        .iter()
                        .map(|te| self.type_from_expr(te))
                        .collect();
                    if let Some(id) = f.id {
                        self.decls.get_mut(id).ty = Some(Type::Function { params, rets });
                    }
                }
                TopLevel::Var(v) => {
                    if let Some(te) = &v.decl.type_expr {
                        let t = self.type_from_expr(te);
                        if let Some(id) = v.decl.id {
                            self.decls.get_mut(id).ty = Some(t);
                        }
                    }
                }
                TopLevel::Record(_) => {}
                TopLevel::Import(im) => {
                    self.not_implemented(im.loc, "modules and imports");
                }
            }
        }
    }

    fn type_from_expr(&mut self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Name { loc, name } => match name.as_str() {
                "nil" => Type::Nil,
                "boolean" => Type::Boolean,
                "integer" => Type::Integer,
                "float" => Type::Float,
                "string" => Type::String,
                _ => match self.records.get(name) {
                    Some(t) => t.clone(),
                    None => {
                        self.type_error(*loc, format!("type '{name}' not found"));
                        Type::Invalid
                    }
                },
            },
            TypeExpr::Array { elem, .. } => Type::Array(Box::new(self.type_from_expr(elem))),
            TypeExpr::Function { params, rets, .. } => Type::Function {
                params: params.iter().map(|t| self.type_from_expr(t)).collect(),
                rets: rets.iter().map(|t| self.type_from_expr(t)).collect(),
            },
        }
    }

    // ----- pass 2: check bodies and initializers -------------------------

    fn check_toplevels(&mut self, st: &mut St, toplevels: &mut [TopLevel]) {
        for tl in toplevels.iter_mut() {
            if tl.ignore() {
                continue;
            }
            match tl {
                TopLevel::Func(f) => {
                    st.with_block((&mut *self, f), |st, (this, f)| {
                        if let Some(id) = f.id {
                            st.add_symbol(FUNCTION_SENTINEL, id);
                        }
                        let returns = this.check_block(st, &mut f.block);
                        let ret = this.return_type(st);
                        if !returns && ret != Type::Nil && !ret.is_invalid() {
                            this.type_error(
                                f.loc,
                                "function can return nil but return type is not nil".to_string(),
                            );
                        }
                    });
                }
                TopLevel::Var(v) => {
                    let declared = v.decl.id.and_then(|id| self.decls.get(id).ty.clone());
                    match declared {
                        Some(t) => {
                            self.check_exp_expecting(st, &mut v.value, &t, "declaration");
                        }
                        None => {
                            let t = self.check_exp(st, &mut v.value, None);
                            if let Some(id) = v.decl.id {
                                self.decls.get_mut(id).ty = Some(t);
                            }
                        }
                    }
                }
                TopLevel::Record(_) | TopLevel::Import(_) => {}
            }
        }
    }

    /// Expected return type of the enclosing function, recovered through the
    /// `$function` sentinel binding.
    fn return_type(&mut self, st: &St) -> Type {
        let Some(id) = st.find_symbol(FUNCTION_SENTINEL) else {
            return Type::Nil;
        };
        match self.decls.get(id).ty.clone() {
            Some(Type::Function { rets, .. }) => rets.first().cloned().unwrap_or(Type::Nil),
            _ => Type::Invalid,
        }
    }

    /// Checks a sequence of statements; true when some statement definitely
    /// returns.
    fn check_block(&mut self, st: &mut St, block: &mut Block) -> bool {
        let mut returns = false;
        for stat in &mut block.stats {
            returns = self.check_stat(st, stat) || returns;
        }
        returns
    }

    fn check_stat(&mut self, st: &mut St, stat: &mut Stat) -> bool {
        match stat {
            Stat::Block { body, .. } => self.check_block(st, body),
            Stat::While { cond, body, .. } => {
                // Any type is a valid condition; only nil and false are falsy.
                self.check_exp(st, cond, None);
                self.check_block(st, body);
                false
            }
            Stat::Repeat { body, cond, .. } => {
                self.check_block(st, body);
                self.check_exp(st, cond, None);
                false
            }
            Stat::If { thens, els, .. } => {
                let mut all_return = true;
                for (cond, body) in thens.iter_mut() {
                    self.check_exp(st, cond, None);
                    all_return = self.check_block(st, body) && all_return;
                }
                match els {
                    Some(els) => self.check_block(st, els) && all_return,
                    None => false,
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
                let loop_ty = match &decl.type_expr {
                    Some(te) => {
                        let t = self.type_from_expr(te);
                        if !t.is_numeric() {
                            self.type_error(
                                decl.loc,
                                format!("'for' control variable must be a number, found {t}"),
                            );
                        }
                        self.check_exp_expecting(st, start, &t, "numeric for loop");
                        t
                    }
                    None => {
                        let t = self.check_exp(st, start, None);
                        if !t.is_numeric() {
                            self.type_error(
                                start.loc,
                                format!("'for' initial value must be a number, found {t}"),
                            );
                            Type::Invalid
                        } else {
                            t
                        }
                    }
                };
                self.check_exp_expecting(st, finish, &loop_ty, "numeric for loop");
                if let Some(step) = step {
                    self.check_exp_expecting(st, step, &loop_ty, "numeric for loop");
                }
                if let Some(id) = decl.id {
                    self.decls.get_mut(id).ty = Some(loop_ty);
                }
                self.check_block(st, body);
                false
            }
            Stat::Assign { var, exp, .. } => {
                if let Var::Name { loc, name, decl } = var {
                    if let Some(id) = decl {
                        if matches!(self.decls.get(*id).kind, DeclKind::Function { .. }) {
                            let loc = *loc;
                            let msg = format!("cannot assign to function '{name}'");
                            self.type_error(loc, msg);
                            self.check_exp(st, exp, None);
                            return false;
                        }
                    }
                }
                let t = self.check_var(st, var);
                self.check_exp_expecting(st, exp, &t, "assignment");
                false
            }
            Stat::Decl { decl, exp, .. } => {
                let declared = match &decl.type_expr {
                    Some(te) => Some(self.type_from_expr(te)),
                    None => None,
                };
                let t = match declared {
                    Some(t) => {
                        self.check_exp_expecting(st, exp, &t, "declaration");
                        t
                    }
                    None => self.check_exp(st, exp, None),
                };
                if let Some(id) = decl.id {
                    self.decls.get_mut(id).ty = Some(t);
                }
                false
            }
            Stat::Call { call, .. } => {
                self.check_exp(st, call, None);
                false
            }
            Stat::Return { loc, exp } => {
                let expected = self.return_type(st);
                match exp {
                    Some(exp) => {
                        let found = self.check_exp(st, exp, Some(&expected));
                        if !found.matches(&expected) {
                            self.type_error(
                                exp.loc,
                                format!(
                                    "types in return statement do not match, expected {expected} but found {found}"
                                ),
                            );
                        }
                    }
                    None => {
                        if expected != Type::Nil && !expected.is_invalid() {
                            self.type_error(
                                *loc,
                                format!(
                                    "types in return statement do not match, expected {expected} but found nil"
                                ),
                            );
                        }
                    }
                }
                true
            }
        }
    }

    fn check_exp_expecting(&mut self, st: &mut St, exp: &mut Exp, expected: &Type, what: &str) {
        let found = self.check_exp(st, exp, Some(expected));
        if !found.matches(expected) {
            self.type_error(
                exp.loc,
                format!("expected {expected} but found {found} in {what}"),
            );
        }
    }

    /// Computes and annotates the type of `exp`. `context` is the type the
    /// surrounding construct wants; literals may coalesce to it (an empty
    /// array initializer takes the context's element type).
    fn check_exp(&mut self, st: &mut St, exp: &mut Exp, context: Option<&Type>) -> Type {
        let loc = exp.loc;
        let t = match &mut exp.kind {
            ExpKind::Nil => Type::Nil,
            ExpKind::Bool(_) => Type::Boolean,
            ExpKind::Integer(_) => Type::Integer,
            ExpKind::Float(_) => Type::Float,
            ExpKind::Str(_) => Type::String,
            ExpKind::Var(var) => {
                if let Var::Name { decl: Some(id), .. } = var {
                    if matches!(self.decls.get(*id).kind, DeclKind::Function { .. }) {
                        self.not_implemented(loc, "first-class functions");
                        exp.ty = Some(Type::Invalid);
                        return Type::Invalid;
                    }
                }
                self.check_var(st, var)
            }
            ExpKind::Unop { op, exp: operand } => {
                let t = self.check_exp(st, operand, None);
                match op {
                    Unop::Neg => {
                        if t.is_numeric() {
                            t
                        } else {
                            self.type_error(loc, format!("cannot negate a {t}"));
                            Type::Invalid
                        }
                    }
                    Unop::BNot => {
                        if !t.is_integer() {
                            self.type_error(
                                loc,
                                format!("operand of '~' must be an integer, found {t}"),
                            );
                        }
                        Type::Integer
                    }
                    Unop::Not => Type::Boolean,
                    Unop::Len => {
                        if !t.is_array() {
                            self.type_error(
                                loc,
                                format!("trying to take the length of a {t} instead of an array"),
                            );
                        }
                        Type::Integer
                    }
                }
            }
            ExpKind::Binop { op, lhs, rhs } => {
                let op = *op;
                let lt = self.check_exp(st, lhs, None);
                let rt = self.check_exp(st, rhs, None);
                self.check_binop(loc, op, lhs, lt, rhs, rt)
            }
            ExpKind::Call { func, args } => {
                let callee = match &mut func.kind {
                    ExpKind::Var(Var::Name { name, decl, .. }) => {
                        decl.map(|id| (name.clone(), id))
                    }
                    _ => None,
                };
                match callee {
                    Some((name, id)) => {
                        let info = self.decls.get(id);
                        let fn_ty = info.ty.clone();
                        let is_fn = matches!(info.kind, DeclKind::Function { .. });
                        match (is_fn, fn_ty) {
                            (true, Some(Type::Function { params, rets })) => {
                                func.ty = Some(Type::Function {
                                    params: params.clone(),
                                    rets: rets.clone(),
                                });
                                if args.len() != params.len() {
                                    self.type_error(
                                        loc,
                                        format!(
                                            "function {name} called with {} arguments but expects {}",
                                            args.len(),
                                            params.len()
                                        ),
                                    );
                                }
                                for (i, a) in args.iter_mut().enumerate() {
                                    match params.get(i) {
                                        Some(pt) => {
                                            let pt = pt.clone();
                                            self.check_exp_expecting(st, a, &pt, "argument");
                                        }
                                        None => {
                                            self.check_exp(st, a, None);
                                        }
                                    }
                                }
                                rets.first().cloned().unwrap_or(Type::Nil)
                            }
                            _ => {
                                let t = self
                                    .decls
                                    .get(id)
                                    .ty
                                    .clone()
                                    .unwrap_or(Type::Invalid);
                                func.ty = Some(t.clone());
                                if !t.is_invalid() {
                                    self.type_error(loc, format!("'{name}' is not a function"));
                                }
                                for a in args.iter_mut() {
                                    self.check_exp(st, a, None);
                                }
                                Type::Invalid
                            }
                        }
                    }
                    None => {
                        self.not_implemented(loc, "calls of first-class function values");
                        self.check_exp(st, func, None);
                        for a in args.iter_mut() {
                            self.check_exp(st, a, None);
                        }
                        Type::Invalid
                    }
                }
            }
            ExpKind::Initlist { exps } => match context {
                Some(Type::Array(elem)) => {
                    let elem = (**elem).clone();
                    for e in exps.iter_mut() {
                        self.check_exp_expecting(st, e, &elem, "array initializer");
                    }
                    Type::Array(Box::new(elem))
                }
                Some(Type::Record { .. }) => {
                    self.not_implemented(loc, "record initializers");
                    Type::Invalid
                }
                Some(t) if t.is_invalid() => {
                    for e in exps.iter_mut() {
                        self.check_exp(st, e, None);
                    }
                    Type::Invalid
                }
                Some(t) => {
                    let t = t.clone();
                    for e in exps.iter_mut() {
                        self.check_exp(st, e, None);
                    }
                    self.type_error(loc, format!("initializer list used where {t} was expected"));
                    Type::Invalid
                }
                None => {
                    if exps.is_empty() {
                        self.type_error(
                            loc,
                            "cannot infer the type of an empty array initializer".to_string(),
                        );
                        Type::Invalid
                    } else {
                        let first = self.check_exp(st, &mut exps[0], None);
                        for e in exps.iter_mut().skip(1) {
                            self.check_exp_expecting(st, e, &first, "array initializer");
                        }
                        Type::Array(Box::new(first))
                    }
                }
            },
            ExpKind::Concat { exps } => {
                let mut has_string = false;
                let mut all_valid = true;
                for e in exps.iter_mut() {
                    let t = self.check_exp(st, e, None);
                    if t.is_invalid() {
                        all_valid = false;
                    }
                    match t {
                        Type::String => has_string = true,
                        Type::Integer | Type::Float | Type::Invalid => {}
                        other => {
                            let eloc = e.loc;
                            self.type_error(
                                eloc,
                                format!("cannot concatenate a {other}"),
                            );
                            all_valid = false;
                        }
                    }
                }
                if !has_string && all_valid {
                    self.type_error(loc, "concatenation requires at least one string operand".to_string());
                }
                Type::String
            }
            ExpKind::Cast { exp: inner, target } => {
                let from = self.check_exp(st, inner, None);
                let to = match target {
                    Some(te) => {
                        let te = te.clone();
                        self.type_from_expr(&te)
                    }
                    // A checker-synthesized coercion; today always to float.
                    None => exp.ty.clone().unwrap_or(Type::Float),
                };
                if from == to || from.is_invalid() || to.is_invalid() {
                    // no-op cast
                } else if from == Type::Integer && to == Type::Float {
                    // accepted conversion
                } else if from == Type::Float && to == Type::Integer {
                    self.not_implemented(loc, "conversions from float to integer");
                } else {
                    self.type_error(loc, format!("cannot cast {from} to {to}"));
                }
                to
            }
        };
        exp.ty = Some(t.clone());
        t
    }

    fn check_binop(
        &mut self,
        loc: Loc,
        op: Binop,
        lhs: &mut Box<Exp>,
        lt: Type,
        rhs: &mut Box<Exp>,
        rt: Type,
    ) -> Type {
        use Binop::*;
        match op {
            Add | Sub | Mul => {
                let ok = self.require_numeric(op, lhs, &lt) & self.require_numeric(op, rhs, &rt);
                if !ok {
                    Type::Invalid
                } else if lt.is_invalid() || rt.is_invalid() {
                    Type::Invalid
                } else if lt == Type::Float || rt == Type::Float {
                    to_float(lhs);
                    to_float(rhs);
                    Type::Float
                } else {
                    Type::Integer
                }
            }
            Div | Pow => {
                let ok = self.require_numeric(op, lhs, &lt) & self.require_numeric(op, rhs, &rt);
                if ok {
                    to_float(lhs);
                    to_float(rhs);
                }
                Type::Float
            }
            Mod | IntDiv | BAnd | BOr | BXor | Shl | Shr => {
                self.require_integer(op, lhs, &lt);
                self.require_integer(op, rhs, &rt);
                Type::Integer
            }
            Lt | Gt | Le | Ge => {
                if lt.is_invalid() || rt.is_invalid() {
                    // recovery; stay quiet
                } else if lt.is_numeric() && rt.is_numeric() {
                    if lt != rt {
                        to_float(lhs);
                        to_float(rhs);
                    }
                } else if !(lt == Type::String && rt == Type::String) {
                    self.type_error(
                        loc,
                        format!("cannot compare {lt} and {rt} with '{}'", op.display()),
                    );
                }
                Type::Boolean
            }
            Eq | Ne => {
                if !lt.matches(&rt) {
                    self.type_error(
                        loc,
                        format!("trying to compare values of different types: {lt} and {rt}"),
                    );
                }
                Type::Boolean
            }
            And | Or => Type::Boolean,
        }
    }

    fn require_numeric(&mut self, op: Binop, operand: &Exp, t: &Type) -> bool {
        if t.is_numeric() {
            true
        } else {
            self.type_error(
                operand.loc,
                format!("operand of '{}' is a {t} instead of a number", op.display()),
            );
            false
        }
    }

    fn require_integer(&mut self, op: Binop, operand: &Exp, t: &Type) {
        if !t.is_integer() {
            self.type_error(
                operand.loc,
                format!("operand of '{}' is a {t} instead of an integer", op.display()),
            );
        }
    }

    fn check_var(&mut self, st: &mut St, var: &mut Var) -> Type {
        match var {
            Var::Name { decl, .. } => match decl {
                Some(id) => self.decls.get(*id).ty.clone().unwrap_or(Type::Invalid),
                None => Type::Invalid,
            },
            Var::Bracket { loc, exp, index } => {
                let t = self.check_exp(st, exp, None);
                let it = self.check_exp(st, index, Some(&Type::Integer));
                if !it.is_integer() {
                    let iloc = index.loc;
                    self.type_error(iloc, format!("array index must be an integer, found {it}"));
                }
                match t {
                    Type::Array(elem) => *elem,
                    t if t.is_invalid() => Type::Invalid,
                    t => {
                        let loc = *loc;
                        self.type_error(loc, format!("trying to index a {t}, not an array"));
                        Type::Invalid
                    }
                }
            }
            Var::Dot { loc, exp, field } => {
                let t = self.check_exp(st, exp, None);
                match t {
                    Type::Record { name, fields } => {
                        match fields.iter().find(|(f, _)| f == field) {
                            Some((_, ft)) => ft.clone(),
                            None => {
                                let loc = *loc;
                                let field = field.clone();
                                self.type_error(
                                    loc,
                                    format!("record {name} has no field {field}"),
                                );
                                Type::Invalid
                            }
                        }
                    }
                    t if t.is_invalid() => Type::Invalid,
                    t => {
                        let loc = *loc;
                        self.type_error(loc, format!("trying to access a field of a {t}"));
                        Type::Invalid
                    }
                }
            }
        }
    }
}

/// Wraps an integer-typed expression in a cast to float. Anything else,
/// casts included, is left alone, which keeps re-checking idempotent.
fn to_float(exp: &mut Box<Exp>) {
    if matches!(exp.ty, Some(Type::Integer)) {
        let loc = exp.loc;
        let inner = std::mem::replace(exp, Box::new(Exp::new(loc, ExpKind::Nil)));
        **exp = Exp {
            loc,
            ty: Some(Type::Float),
            kind: ExpKind::Cast {
                exp: inner,
                target: None,
            },
        };
    }
}
