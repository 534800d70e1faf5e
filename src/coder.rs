//! C code generation.
//!
//! Lowers a checked tree into a single C translation unit targeting the Lua
//! 5.3 internals. Every source function becomes two C functions: a static
//! entry point with native parameter types (`function_NAME_titan`) and a
//! wrapper with the VM's stack calling convention (`function_NAME_lua`).
//! Top-level values live in the array part of a per-module globals table; a
//! `luaopen_<mod>` entry point allocates it, runs the initializers inside a
//! closure holding it as sole upvalue, and builds the module table.
//!
//! Expression emission returns a `(prelude, rvalue)` pair: the prelude is a
//! block of C statements carrying all side effects, the rvalue is a
//! side-effect-free C expression the caller may repeat freely. Statement
//! emission inlines its preludes. Writes to globals-table slots go through
//! the VM's tagged-assignment macros, never plain C assignment.

use crate::ast::{
    Binop, Block, DeclId, DeclKind, Exp, ExpKind, FuncDecl, Program, Stat, TopLevel, Unop, Var,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::location::Loc;
use crate::template;
use crate::types::Type;
use itertools::Itertools;
use rustc_hash::FxHashMap;

const MODULE_TEMPLATE: &str = r#"/* Generated by the Titan compiler; do not edit by hand. */
#include <lua.h>
#include <lauxlib.h>
#include <lualib.h>

#include <math.h>

#include "lapi.h"
#include "lfunc.h"
#include "lgc.h"
#include "lobject.h"
#include "lstate.h"
#include "ltable.h"
#include "lvm.h"

#ifdef __clang__
#pragma clang diagnostic ignored "-Wparentheses-equality"
#endif

/* wrap-around integer arithmetic, the way the VM core does it */
#define intop(op, v1, v2) (l_castU2S(l_castS2U(v1) op l_castS2U(v2)))

${DEFINE_FUNCTIONS}
static int init_${MODNAME}(lua_State *L) {
CClosure *_init = clCvalue(L->ci->func);
Table *_mod = hvalue(&_init->upvalue[0]);
(void) _mod;
${INITIALIZE_TOPLEVEL}
return 0;
}

int luaopen_${MODNAME}(lua_State *L) {
Table *_mod = luaH_new(L);
luaH_resize(L, _mod, ${NGLOBALS}, 0);
sethvalue(L, L->top, _mod);
api_incr_top(L);
sethvalue(L, L->top, _mod);
api_incr_top(L);
lua_pushcclosure(L, init_${MODNAME}, 1);
lua_call(L, 0, 0);
lua_createtable(L, 0, ${NFUNCTIONS});
${CREATE_MODULE_TABLE}
lua_remove(L, -2);
return 1;
}
"#;

/// Generates the C translation unit for `prog`. Runs only on a tree the
/// checker accepted; the diagnostics it can still produce are the reserved
/// features (strings, records, first-class functions).
pub fn generate(prog: &mut Program, modname: &str) -> Result<String, Vec<Diagnostic>> {
    assign_indices(prog);
    let nglobals = count_globals(prog);
    let nfunctions = prog
        .toplevels
        .iter()
        .filter(|tl| matches!(tl, TopLevel::Func(f) if !f.ignore && !f.is_local))
        .count();

    let mut coder = Coder {
        prog: &*prog,
        tmp: 0,
        diags: Vec::new(),
    };

    let mut define_functions = String::new();
    for tl in &coder.prog.toplevels {
        if let TopLevel::Func(f) = tl {
            if f.ignore {
                continue;
            }
            define_functions.push_str(&coder.prototypes(f));
        }
    }
    define_functions.push('\n');
    for tl in &coder.prog.toplevels {
        if let TopLevel::Func(f) = tl {
            if f.ignore {
                continue;
            }
            define_functions.push_str(&coder.titan_function(f));
            define_functions.push('\n');
            define_functions.push_str(&coder.lua_function(f));
            define_functions.push('\n');
        }
    }

    let mut initialize = String::new();
    for tl in &coder.prog.toplevels {
        match tl {
            TopLevel::Func(f) if !f.ignore => {
                initialize.push_str(&coder.init_function_slot(f));
                initialize.push('\n');
            }
            TopLevel::Var(v) if !v.ignore => {
                initialize.push_str(&coder.init_var_slot(v));
                initialize.push('\n');
            }
            _ => {}
        }
    }

    let mut module_table = String::new();
    for tl in &coder.prog.toplevels {
        if let TopLevel::Func(f) = tl {
            if f.ignore || f.is_local {
                continue;
            }
            let index = coder.global_index_of(f.id) + 1;
            module_table.push_str(&format!(
                "lua_pushstring(L, \"{}\");\nsetobj2s(L, L->top, luaH_getint(_mod, {index}));\napi_incr_top(L);\nlua_settable(L, -3);\n",
                f.name
            ));
        }
    }

    let diags = std::mem::take(&mut coder.diags);
    if !diags.is_empty() {
        return Err(diags);
    }

    let mut subs: FxHashMap<&str, String> = FxHashMap::default();
    subs.insert("MODNAME", modname.to_string());
    subs.insert("NGLOBALS", nglobals.to_string());
    subs.insert("NFUNCTIONS", nfunctions.to_string());
    subs.insert("DEFINE_FUNCTIONS", define_functions);
    subs.insert("INITIALIZE_TOPLEVEL", initialize);
    subs.insert("CREATE_MODULE_TABLE", module_table);
    template::render(MODULE_TEMPLATE, &subs).map_err(|e| {
        vec![Diagnostic::new(
            DiagnosticKind::NotImplemented,
            &prog.filename,
            Loc::new(1, 1),
            format!("internal template error: {e}"),
        )]
    })
}

/// Assigns `global_index` over top-level value declarations in source order
/// and stamps both entry-point names on every function.
fn assign_indices(prog: &mut Program) {
    let mut next = 0u32;
    for tl in prog.toplevels.iter_mut() {
        match tl {
            TopLevel::Func(f) if !f.ignore => {
                f.titan_entry = Some(format!("function_{}_titan", f.name));
                f.lua_entry = Some(format!("function_{}_lua", f.name));
                if let Some(id) = f.id {
                    prog_index(&mut prog.decls, id, next);
                }
                next += 1;
            }
            TopLevel::Var(v) if !v.ignore => {
                if let Some(id) = v.decl.id {
                    prog_index(&mut prog.decls, id, next);
                }
                next += 1;
            }
            _ => {}
        }
    }
}

fn prog_index(decls: &mut crate::ast::DeclArena, id: DeclId, index: u32) {
    decls.get_mut(id).global_index = Some(index);
}

fn count_globals(prog: &Program) -> u32 {
    prog.toplevels
        .iter()
        .filter(|tl| {
            matches!(tl, TopLevel::Func(f) if !f.ignore)
                || matches!(tl, TopLevel::Var(v) if !v.ignore)
        })
        .count() as u32
}

/// An assignable location in generated C. Plain variables take C assignment;
/// slots take the VM's tagged stores.
enum CLvalue {
    Var(String),
    GlobalSlot { index: u32, ty: Type },
    ArraySlot { table: String, index: String, ty: Type },
}

struct Coder<'p> {
    prog: &'p Program,
    tmp: u32,
    diags: Vec<Diagnostic>,
}

impl Coder<'_> {
    fn not_implemented(&mut self, loc: Loc, what: &str) {
        self.diags.push(Diagnostic::new(
            DiagnosticKind::NotImplemented,
            &self.prog.filename,
            loc,
            format!("{what} are not implemented"),
        ));
    }

    /// Fresh temporary; the counter is per-compilation and never reused.
    fn tmp_name(&mut self) -> String {
        self.tmp += 1;
        format!("tmp_{}", self.tmp)
    }

    fn decl_ty(&self, id: Option<DeclId>) -> Type {
        id.and_then(|id| self.prog.decls.get(id).ty.clone())
            .unwrap_or(Type::Invalid)
    }

    fn global_index_of(&self, id: Option<DeclId>) -> u32 {
        id.and_then(|id| self.prog.decls.get(id).global_index)
            .unwrap_or(0)
    }

    fn ctype(&self, t: &Type) -> &'static str {
        match t {
            Type::Nil | Type::Boolean => "int",
            Type::Integer => "lua_Integer",
            Type::Float => "lua_Number",
            Type::String => "TString *",
            Type::Array(_) => "Table *",
            Type::Function { .. } | Type::Record { .. } | Type::Invalid => "int",
        }
    }

    /// Name of the Lua-side type, used in runtime error messages.
    fn lua_type_name(&self, t: &Type) -> &'static str {
        match t {
            Type::Nil => "nil",
            Type::Boolean => "boolean",
            Type::Integer => "integer",
            Type::Float => "float",
            Type::String => "string",
            Type::Array(_) => "table",
            Type::Function { .. } => "function",
            Type::Record { .. } | Type::Invalid => "value",
        }
    }

    fn tag_check(&self, t: &Type) -> &'static str {
        match t {
            Type::Nil => "ttisnil",
            Type::Boolean => "ttisboolean",
            Type::Integer => "ttisinteger",
            Type::Float => "ttisfloat",
            Type::String => "ttisstring",
            Type::Array(_) => "ttistable",
            Type::Function { .. } | Type::Record { .. } | Type::Invalid => "ttisnil",
        }
    }

    /// Read macro extracting a native value from a slot.
    fn slot_read(&self, slot: &str, t: &Type) -> String {
        match t {
            Type::Nil => "0".to_string(),
            Type::Boolean => format!("bvalue({slot})"),
            Type::Integer => format!("ivalue({slot})"),
            Type::Float => format!("fltvalue({slot})"),
            Type::String => format!("tsvalue({slot})"),
            Type::Array(_) => format!("hvalue({slot})"),
            Type::Function { .. } | Type::Record { .. } | Type::Invalid => "0".to_string(),
        }
    }

    /// Tagged store of a native value into the TValue `dst` (an address
    /// expression like `&tmp_1`).
    fn tvalue_set(&self, dst: &str, value: &str, t: &Type) -> String {
        match t {
            Type::Nil => format!("setnilvalue({dst});"),
            Type::Boolean => format!("setbvalue({dst}, {value});"),
            Type::Integer => format!("setivalue({dst}, {value});"),
            Type::Float => format!("setfltvalue({dst}, {value});"),
            Type::String => format!("setsvalue(L, {dst}, {value});"),
            Type::Array(_) => format!("sethvalue(L, {dst}, {value});"),
            Type::Function { .. } | Type::Record { .. } | Type::Invalid => {
                format!("setnilvalue({dst});")
            }
        }
    }

    fn is_collectable(&self, t: &Type) -> bool {
        matches!(t, Type::String | Type::Array(_))
    }

    /// Truthiness of a checked rvalue: in a typed program only nil and
    /// booleans can be false.
    fn truth(&self, rv: &str, t: &Type) -> String {
        match t {
            Type::Nil => "0".to_string(),
            Type::Boolean => rv.to_string(),
            _ => "1".to_string(),
        }
    }

    // ----- functions ------------------------------------------------------

    fn func_ret(&self, f: &FuncDecl) -> Type {
        match self.decl_ty(f.id) {
            Type::Function { rets, .. } => rets.first().cloned().unwrap_or(Type::Nil),
            _ => Type::Nil,
        }
    }

    fn titan_name(&self, f: &FuncDecl) -> String {
        f.titan_entry
            .clone()
            .unwrap_or_else(|| format!("function_{}_titan", f.name))
    }

    fn lua_name(&self, f: &FuncDecl) -> String {
        f.lua_entry
            .clone()
            .unwrap_or_else(|| format!("function_{}_lua", f.name))
    }

    fn titan_signature(&self, f: &FuncDecl) -> String {
        let ret = self.func_ret(f);
        let params = f
            .params
            .iter()
            .map(|p| {
                let t = self.decl_ty(p.id);
                format!(", {} local_{}", self.ctype(&t), p.name)
            })
            .join("");
        format!(
            "static {} {}(lua_State *L, Table *_mod{})",
            self.ctype(&ret),
            self.titan_name(f),
            params
        )
    }

    fn prototypes(&self, f: &FuncDecl) -> String {
        format!(
            "{};\nstatic int {}(lua_State *L);\n",
            self.titan_signature(f),
            self.lua_name(f)
        )
    }

    fn titan_function(&mut self, f: &FuncDecl) -> String {
        let body = self.codestats(&f.block.stats, None);
        let ret = self.func_ret(f);
        let tail = if ret == Type::Nil { "return 0;\n" } else { "" };
        format!(
            "{} {{\n(void) _mod;\n{body}\n{tail}}}\n",
            self.titan_signature(f)
        )
    }

    fn lua_function(&mut self, f: &FuncDecl) -> String {
        let nparams = f.params.len();
        let mut out = format!(
            "static int {}(lua_State *L) {{\n\
             TValue *func = L->ci->func;\n\
             if ((L->top - func - 1) != {nparams}) {{\n\
             luaL_error(L, \"calling Titan function %s with %d arguments, but expected %d\", \"{}\", (int)(L->top - func - 1), {nparams});\n\
             }}\n\
             CClosure *_self = clCvalue(func);\n\
             Table *_mod = hvalue(&_self->upvalue[0]);\n\
             (void) _mod;\n",
            self.lua_name(f),
            f.name
        );
        for (i, p) in f.params.iter().enumerate() {
            let t = self.decl_ty(p.id);
            let slot = format!("_arg_{}", p.name);
            out.push_str(&format!(
                "TValue *{slot} = func + {};\n\
                 if (!{}({slot})) {{\n\
                 luaL_error(L, \"wrong type for argument %s at line %d, expected %s\", \"{}\", {}, \"{}\");\n\
                 }}\n\
                 {} local_{} = {};\n",
                i + 1,
                self.tag_check(&t),
                p.name,
                p.loc.line,
                self.lua_type_name(&t),
                self.ctype(&t),
                p.name,
                self.slot_read(&slot, &t),
            ));
        }
        let args = f
            .params
            .iter()
            .map(|p| format!(", local_{}", p.name))
            .join("");
        let call = format!("{}(L, _mod{args})", self.titan_name(f));
        let ret = self.func_ret(f);
        match ret {
            Type::Nil => {
                out.push_str(&format!("{call};\nlua_pushnil(L);\n"));
            }
            Type::Boolean => {
                out.push_str(&format!("int _ret = {call};\nlua_pushboolean(L, _ret);\n"));
            }
            Type::Integer => {
                out.push_str(&format!(
                    "lua_Integer _ret = {call};\nlua_pushinteger(L, _ret);\n"
                ));
            }
            Type::Float => {
                out.push_str(&format!(
                    "lua_Number _ret = {call};\nlua_pushnumber(L, _ret);\n"
                ));
            }
            Type::String => {
                out.push_str(&format!(
                    "TString *_ret = {call};\nsetsvalue2s(L, L->top, _ret);\napi_incr_top(L);\n"
                ));
            }
            Type::Array(_) => {
                out.push_str(&format!(
                    "Table *_ret = {call};\nsethvalue(L, L->top, _ret);\napi_incr_top(L);\n"
                ));
            }
            Type::Function { .. } | Type::Record { .. } | Type::Invalid => {
                out.push_str(&format!("{call};\nlua_pushnil(L);\n"));
            }
        }
        out.push_str("return 1;\n}\n");
        out
    }

    // ----- top-level initialization --------------------------------------

    fn init_function_slot(&mut self, f: &FuncDecl) -> String {
        let index = self.global_index_of(f.id) + 1;
        let closure = self.tmp_name();
        let cell = self.tmp_name();
        format!(
            "{{\n\
             CClosure *{closure} = luaF_newCclosure(L, 1);\n\
             {closure}->f = {};\n\
             sethvalue(L, &{closure}->upvalue[0], _mod);\n\
             TValue {cell};\n\
             setclCvalue(L, &{cell}, {closure});\n\
             luaH_setint(L, _mod, {index}, &{cell});\n\
             luaC_barrierback(L, _mod, &{cell});\n\
             }}",
            self.lua_name(f)
        )
    }

    fn init_var_slot(&mut self, v: &crate::ast::VarDecl) -> String {
        let ty = self.decl_ty(v.decl.id);
        let (prelude, rv) = self.codeexp(&v.value);
        let lv = CLvalue::GlobalSlot {
            index: self.global_index_of(v.decl.id),
            ty,
        };
        let store = self.store(&lv, &rv);
        format!("{{\n{prelude}\n{store}\n}}")
    }

    // ----- statements -----------------------------------------------------

    /// Emits a statement sequence. Each `local` opens a fresh C block holding
    /// the rest of the sequence, so shadowed names map to shadowed C
    /// variables. `tail` is appended innermost (the `until` test of a repeat
    /// loop needs the body's scope).
    fn codestats(&mut self, stats: &[Stat], tail: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut open = 0;
        for stat in stats {
            if let Stat::Decl { decl, exp, .. } = stat {
                let ty = self.decl_ty(decl.id);
                let (prelude, rv) = self.codeexp(exp);
                parts.push(format!(
                    "{prelude}\n{{\n{} local_{} = {rv};",
                    self.ctype(&ty),
                    decl.name
                ));
                open += 1;
            } else {
                parts.push(self.codestat(stat));
            }
        }
        if let Some(t) = tail {
            parts.push(t.to_string());
        }
        for _ in 0..open {
            parts.push("}".to_string());
        }
        parts.join("\n")
    }

    fn codestat(&mut self, stat: &Stat) -> String {
        match stat {
            Stat::Block { body, .. } => {
                format!("{{\n{}\n}}", self.codestats(&body.stats, None))
            }
            Stat::While { cond, body, .. } => {
                // The condition's prelude must re-run every iteration.
                let (prelude, rv) = self.codeexp(cond);
                let truth = self.truth(&rv, &cond.typ());
                let body = self.codestats(&body.stats, None);
                format!(
                    "for (;;) {{\n{prelude}\nif (!({truth})) {{\nbreak;\n}}\n{body}\n}}"
                )
            }
            Stat::Repeat { body, cond, .. } => {
                let (prelude, rv) = self.codeexp(cond);
                let truth = self.truth(&rv, &cond.typ());
                let tail = format!("{prelude}\nif ({truth}) {{\nbreak;\n}}");
                let body = self.codestats(&body.stats, Some(&tail));
                format!("for (;;) {{\n{body}\n}}")
            }
            Stat::If { thens, els, .. } => {
                let mut code = match els {
                    Some(els) => format!("{{\n{}\n}}", self.codestats(&els.stats, None)),
                    None => String::new(),
                };
                for (cond, body) in thens.iter().rev() {
                    let (prelude, rv) = self.codeexp(cond);
                    let truth = self.truth(&rv, &cond.typ());
                    let then_blk = format!("{{\n{}\n}}", self.codestats(&body.stats, None));
                    let else_part = if code.is_empty() {
                        String::new()
                    } else {
                        format!(" else {code}")
                    };
                    code = format!("{{\n{prelude}\nif ({truth}) {then_blk}{else_part}\n}}");
                }
                code
            }
            Stat::For {
                decl,
                start,
                finish,
                step,
                body,
                ..
            } => self.code_for(decl, start, finish, step.as_ref(), body),
            Stat::Assign { var, exp, .. } => {
                let (ep, rv) = self.codeexp(exp);
                let (vp, lv) = self.codevar(var);
                let store = self.store(&lv, &rv);
                format!("{ep}\n{vp}\n{store}")
            }
            Stat::Decl { .. } => {
                // handled by codestats
                String::new()
            }
            Stat::Call { call, .. } => match &call.kind {
                ExpKind::Call { .. } => {
                    let (prelude, call_c, _) = self.codecall(call);
                    format!("{prelude}\n{call_c};")
                }
                _ => String::new(),
            },
            Stat::Return { exp, .. } => match exp {
                Some(e) => {
                    let (prelude, rv) = self.codeexp(e);
                    format!("{prelude}\nreturn {rv};")
                }
                None => "return 0;".to_string(),
            },
        }
    }

    fn code_for(
        &mut self,
        decl: &crate::ast::Decl,
        start: &Exp,
        finish: &Exp,
        step: Option<&Exp>,
        body: &Block,
    ) -> String {
        let ty = self.decl_ty(decl.id);
        let cty = self.ctype(&ty);
        let var = format!("local_{}", decl.name);
        let (ps, s_rv) = self.codeexp(start);
        let (pf, f_rv) = self.codeexp(finish);
        let (pstep, step_rv) = match step {
            Some(e) => self.codeexp(e),
            None => (
                String::new(),
                if ty == Type::Float { "1.0" } else { "1" }.to_string(),
            ),
        };
        let t_start = self.tmp_name();
        let t_finish = self.tmp_name();
        let t_step = self.tmp_name();
        // The step's sign picks the continuation test; a non-constant step
        // falls back to a runtime test.
        let sign = match step {
            None => Some(true),
            Some(e) => step_sign(e),
        };
        let cond = match sign {
            Some(true) => format!("{var} <= {t_finish}"),
            Some(false) => format!("{var} >= {t_finish}"),
            None => format!("({t_step} >= 0 ? {var} <= {t_finish} : {var} >= {t_finish})"),
        };
        // Integer loops advance with the wrap-around macro, matching the
        // VM's two's-complement semantics.
        let incr = if ty == Type::Float {
            format!("{var} = {var} + {t_step}")
        } else {
            format!("{var} = intop(+, {var}, {t_step})")
        };
        let body = self.codestats(&body.stats, None);
        format!(
            "{{\n{ps}\n{pf}\n{pstep}\n\
             {cty} {t_start} = {s_rv};\n\
             {cty} {t_finish} = {f_rv};\n\
             {cty} {t_step} = {step_rv};\n\
             for ({cty} {var} = {t_start}; {cond}; {incr}) {{\n{body}\n}}\n}}"
        )
    }

    fn store(&mut self, lv: &CLvalue, rv: &str) -> String {
        match lv {
            CLvalue::Var(name) => format!("{name} = {rv};"),
            CLvalue::GlobalSlot { index, ty } => {
                let slot = format!("luaH_getint(_mod, {})", index + 1);
                if self.is_collectable(ty) {
                    let cell = self.tmp_name();
                    format!(
                        "TValue {cell};\n{}\nluaH_setint(L, _mod, {}, &{cell});\nluaC_barrierback(L, _mod, &{cell});",
                        self.tvalue_set(&format!("&{cell}"), rv, ty),
                        index + 1
                    )
                } else {
                    self.tvalue_set(&format!("cast(TValue *, {slot})"), rv, ty)
                }
            }
            CLvalue::ArraySlot { table, index, ty } => {
                let cell = self.tmp_name();
                let barrier = if self.is_collectable(ty) {
                    format!("\nluaC_barrierback(L, {table}, &{cell});")
                } else {
                    String::new()
                };
                format!(
                    "TValue {cell};\n{}\nluaH_setint(L, {table}, {index}, &{cell});{barrier}",
                    self.tvalue_set(&format!("&{cell}"), rv, ty)
                )
            }
        }
    }

    // ----- expressions ----------------------------------------------------

    fn codevar(&mut self, var: &Var) -> (String, CLvalue) {
        match var {
            Var::Name { loc, name, decl } => {
                let Some(id) = decl else {
                    self.not_implemented(*loc, &format!("uses of the unresolved name '{name}'"));
                    return (String::new(), CLvalue::Var("0".to_string()));
                };
                let info = self.prog.decls.get(*id);
                match info.kind {
                    DeclKind::Local => {
                        (String::new(), CLvalue::Var(format!("local_{}", info.name)))
                    }
                    DeclKind::Global => {
                        let ty = info.ty.clone().unwrap_or(Type::Invalid);
                        let index = info.global_index.unwrap_or(0);
                        (String::new(), CLvalue::GlobalSlot { index, ty })
                    }
                    DeclKind::Function { .. } => {
                        self.not_implemented(*loc, "first-class functions");
                        (String::new(), CLvalue::Var("0".to_string()))
                    }
                }
            }
            Var::Bracket { exp, index, .. } => {
                let elem = match exp.typ() {
                    Type::Array(e) => *e,
                    _ => Type::Invalid,
                };
                let (pt, t_rv) = self.codeexp(exp);
                let (pi, i_rv) = self.codeexp(index);
                (
                    format!("{pt}\n{pi}"),
                    CLvalue::ArraySlot {
                        table: t_rv,
                        index: i_rv,
                        ty: elem,
                    },
                )
            }
            Var::Dot { loc, .. } => {
                self.not_implemented(*loc, "records");
                (String::new(), CLvalue::Var("0".to_string()))
            }
        }
    }

    /// Emits a direct call; returns (prelude, call expression, return type).
    fn codecall(&mut self, exp: &Exp) -> (String, String, Type) {
        let ExpKind::Call { func, args } = &exp.kind else {
            return (String::new(), "0".to_string(), Type::Invalid);
        };
        let target = match &func.kind {
            ExpKind::Var(Var::Name { decl: Some(id), .. }) => {
                match self.prog.decls.get(*id).kind {
                    DeclKind::Function { toplevel } => match &self.prog.toplevels[toplevel] {
                        TopLevel::Func(f) => Some(self.titan_name(f)),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        };
        let Some(target) = target else {
            self.not_implemented(exp.loc, "calls of first-class function values");
            return (String::new(), "0".to_string(), Type::Invalid);
        };
        let mut prelude = String::new();
        let mut arg_rvs = Vec::new();
        for a in args {
            let (p, rv) = self.codeexp(a);
            if !p.is_empty() {
                prelude.push_str(&p);
                prelude.push('\n');
            }
            arg_rvs.push(rv);
        }
        let args_c = arg_rvs.iter().map(|a| format!(", {a}")).join("");
        (
            prelude,
            format!("{target}(L, _mod{args_c})"),
            exp.typ(),
        )
    }

    fn codeexp(&mut self, exp: &Exp) -> (String, String) {
        match &exp.kind {
            ExpKind::Nil => (String::new(), "0".to_string()),
            ExpKind::Bool(b) => (String::new(), if *b { "1" } else { "0" }.to_string()),
            ExpKind::Integer(v) => {
                let rv = if *v == i64::MIN {
                    "(-9223372036854775807-1)".to_string()
                } else {
                    v.to_string()
                };
                (String::new(), rv)
            }
            ExpKind::Float(v) => (String::new(), format!("{v:?}")),
            ExpKind::Str(_) => {
                self.not_implemented(exp.loc, "string literals");
                (String::new(), "NULL".to_string())
            }
            ExpKind::Var(var) => {
                let (prelude, lv) = self.codevar(var);
                let rv = match &lv {
                    CLvalue::Var(name) => name.clone(),
                    CLvalue::GlobalSlot { index, ty } => {
                        self.slot_read(&format!("luaH_getint(_mod, {})", index + 1), ty)
                    }
                    CLvalue::ArraySlot { table, index, ty } => {
                        self.slot_read(&format!("luaH_getint({table}, {index})"), ty)
                    }
                };
                (prelude, rv)
            }
            ExpKind::Unop { op, exp: operand } => {
                let (p, rv) = self.codeexp(operand);
                let t = operand.typ();
                let out = match op {
                    Unop::Neg => {
                        if t == Type::Float {
                            format!("(-({rv}))")
                        } else {
                            format!("intop(-, 0, {rv})")
                        }
                    }
                    Unop::BNot => format!("intop(^, ~(lua_Integer)0, {rv})"),
                    Unop::Not => format!("(!({}))", self.truth(&rv, &t)),
                    Unop::Len => format!("((lua_Integer)luaH_getn({rv}))"),
                };
                (p, out)
            }
            ExpKind::Binop { op, lhs, rhs } => self.codebinop(exp, *op, lhs, rhs),
            ExpKind::Call { .. } => {
                let (mut prelude, call_c, ret) = self.codecall(exp);
                if call_c == "0" {
                    return (prelude, call_c);
                }
                let tmp = self.tmp_name();
                prelude.push_str(&format!("{} {tmp} = {call_c};", self.ctype(&ret)));
                (prelude, tmp)
            }
            ExpKind::Initlist { exps } => {
                let elem = match exp.typ() {
                    Type::Array(e) => *e,
                    _ => {
                        self.not_implemented(exp.loc, "non-array initializers");
                        return (String::new(), "NULL".to_string());
                    }
                };
                let mut prelude = String::new();
                let mut rvs = Vec::new();
                for e in exps {
                    let (p, rv) = self.codeexp(e);
                    if !p.is_empty() {
                        prelude.push_str(&p);
                        prelude.push('\n');
                    }
                    rvs.push(rv);
                }
                let table = self.tmp_name();
                prelude.push_str(&format!(
                    "Table *{table} = luaH_new(L);\n\
                     sethvalue(L, L->top, {table});\n\
                     api_incr_top(L);\n\
                     luaH_resize(L, {table}, {}, 0);\n",
                    exps.len()
                ));
                for (i, rv) in rvs.iter().enumerate() {
                    let cell = self.tmp_name();
                    let barrier = if self.is_collectable(&elem) {
                        format!("\nluaC_barrierback(L, {table}, &{cell});")
                    } else {
                        String::new()
                    };
                    prelude.push_str(&format!(
                        "TValue {cell};\n{}\nluaH_setint(L, {table}, {}, &{cell});{barrier}\n",
                        self.tvalue_set(&format!("&{cell}"), rv, &elem),
                        i + 1
                    ));
                }
                prelude.push_str("L->top--;");
                (prelude, table)
            }
            ExpKind::Concat { .. } => {
                self.not_implemented(exp.loc, "string concatenations");
                (String::new(), "NULL".to_string())
            }
            ExpKind::Cast { exp: inner, .. } => {
                let (p, rv) = self.codeexp(inner);
                let from = inner.typ();
                let to = exp.typ();
                if from == to {
                    (p, rv)
                } else if from == Type::Integer && to == Type::Float {
                    (p, format!("((lua_Number)({rv}))"))
                } else {
                    self.not_implemented(exp.loc, "conversions from float to integer");
                    (p, "0".to_string())
                }
            }
        }
    }

    fn codebinop(&mut self, exp: &Exp, op: Binop, lhs: &Exp, rhs: &Exp) -> (String, String) {
        use Binop::*;
        match op {
            And | Or => return self.code_shortcircuit(op, lhs, rhs),
            _ => {}
        }
        let (pl, l) = self.codeexp(lhs);
        let (pr, r) = self.codeexp(rhs);
        let prelude = join_preludes(&pl, &pr);
        let lt = lhs.typ();
        let rv = match op {
            Add | Sub | Mul => {
                if exp.typ() == Type::Float {
                    format!("(({l}) {} ({r}))", c_arith(op))
                } else {
                    format!("intop({}, {l}, {r})", c_arith(op))
                }
            }
            Div => format!("luai_numdiv(L, {l}, {r})"),
            Pow => format!("luai_numpow(L, {l}, {r})"),
            Mod => format!("luaV_mod(L, {l}, {r})"),
            IntDiv => format!("luaV_div(L, {l}, {r})"),
            BAnd => format!("intop(&, {l}, {r})"),
            BOr => format!("intop(|, {l}, {r})"),
            BXor => format!("intop(^, {l}, {r})"),
            Shl => format!("intop(<<, {l}, {r})"),
            Shr => format!("intop(>>, {l}, {r})"),
            Lt | Gt | Le | Ge | Eq | Ne => {
                if lt == Type::String {
                    self.not_implemented(exp.loc, "string comparisons");
                    "0".to_string()
                } else {
                    format!("(({l}) {} ({r}))", c_compare(op))
                }
            }
            And | Or => unreachable!("handled above"),
        };
        (prelude, rv)
    }

    /// `and`/`or` always run the left side; the right side's prelude runs
    /// only when the result is still undecided.
    fn code_shortcircuit(&mut self, op: Binop, lhs: &Exp, rhs: &Exp) -> (String, String) {
        let (pl, l) = self.codeexp(lhs);
        let (pr, r) = self.codeexp(rhs);
        let lt = self.truth(&l, &lhs.typ());
        let rt = self.truth(&r, &rhs.typ());
        let tmp = self.tmp_name();
        let prelude = if op == Binop::And {
            format!(
                "int {tmp};\n{pl}\nif ({lt}) {{\n{pr}\n{tmp} = {rt};\n}} else {{\n{tmp} = 0;\n}}"
            )
        } else {
            format!(
                "int {tmp};\n{pl}\nif ({lt}) {{\n{tmp} = 1;\n}} else {{\n{pr}\n{tmp} = {rt};\n}}"
            )
        };
        (prelude, tmp)
    }
}

fn join_preludes(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => String::new(),
        (false, true) => a.to_string(),
        (true, false) => b.to_string(),
        (false, false) => format!("{a}\n{b}"),
    }
}

fn c_arith(op: Binop) -> &'static str {
    match op {
        Binop::Add => "+",
        Binop::Sub => "-",
        Binop::Mul => "*",
        _ => unreachable!("not a plain arithmetic operator"),
    }
}

fn c_compare(op: Binop) -> &'static str {
    match op {
        Binop::Eq => "==",
        Binop::Ne => "!=",
        Binop::Lt => "<",
        Binop::Gt => ">",
        Binop::Le => "<=",
        Binop::Ge => ">=",
        _ => unreachable!("not a comparison operator"),
    }
}

/// Compile-time sign of a step expression, when it is a literal.
fn step_sign(exp: &Exp) -> Option<bool> {
    match &exp.kind {
        ExpKind::Integer(v) => Some(*v >= 0),
        ExpKind::Float(v) => Some(*v >= 0.0),
        ExpKind::Unop {
            op: Unop::Neg,
            exp,
        } => step_sign(exp).map(|s| !s),
        ExpKind::Cast { exp, .. } => step_sign(exp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker;
    use crate::parser;
    use crate::scope_analysis;

    fn gen(src: &str) -> (Program, String) {
        let tls = parser::parse("m.pln", src).expect("parse");
        let mut prog = Program::new("m.pln", tls);
        assert!(scope_analysis::analyze(&mut prog).is_empty());
        let diags = checker::check(&mut prog);
        assert!(diags.is_empty(), "checker: {diags:?}");
        let code = generate(&mut prog, "m").unwrap_or_else(|e| panic!("coder: {e:?}"));
        (prog, code)
    }

    fn gen_err(src: &str) -> Vec<Diagnostic> {
        let tls = parser::parse("m.pln", src).expect("parse");
        let mut prog = Program::new("m.pln", tls);
        assert!(scope_analysis::analyze(&mut prog).is_empty());
        assert!(checker::check(&mut prog).is_empty());
        generate(&mut prog, "m").expect_err("expected codegen diagnostics")
    }

    const ADD: &str = "local function add(x: integer, y: integer): integer return x + y end";

    #[test]
    fn empty_module_has_open_entry_and_zero_globals() {
        let (_, code) = gen("");
        assert!(code.contains("int luaopen_m(lua_State *L)"));
        assert!(code.contains("static int init_m(lua_State *L)"));
        assert!(code.contains("luaH_resize(L, _mod, 0, 0);"));
        assert!(!code.contains("${"), "unsubstituted template hole");
    }

    #[test]
    fn add_module_emits_both_entry_points() {
        let (prog, code) = gen(ADD);
        assert!(code.contains(
            "static lua_Integer function_add_titan(lua_State *L, Table *_mod, lua_Integer local_x, lua_Integer local_y)"
        ));
        assert!(code.contains("static int function_add_lua(lua_State *L)"));
        assert!(code.contains("return intop(+, local_x, local_y);"));
        let TopLevel::Func(f) = &prog.toplevels[0] else { panic!() };
        assert_eq!(f.titan_entry.as_deref(), Some("function_add_titan"));
        assert_eq!(f.lua_entry.as_deref(), Some("function_add_lua"));
    }

    #[test]
    fn lua_entry_tag_checks_arguments_with_position() {
        let (_, code) = gen(ADD);
        assert!(code.contains("if (!ttisinteger(_arg_x))"));
        assert!(code.contains(
            "\"wrong type for argument %s at line %d, expected %s\", \"x\", 1, \"integer\""
        ));
        assert!(code.contains("lua_Integer local_x = ivalue(_arg_x);"));
        assert!(code.contains("lua_pushinteger(L, _ret);"));
    }

    #[test]
    fn arity_check_mentions_function_name() {
        let (_, code) = gen(ADD);
        assert!(code.contains(
            "\"calling Titan function %s with %d arguments, but expected %d\", \"add\""
        ));
    }

    #[test]
    fn mangled_names_do_not_collide() {
        let (_, code) = gen(
            "local function f(): integer return 1 end\n\
             local function g(): integer return 2 end",
        );
        assert!(code.contains("function_f_titan"));
        assert!(code.contains("function_g_titan"));
        assert!(code.contains("function_f_lua"));
        assert!(code.contains("function_g_lua"));
    }

    #[test]
    fn global_indices_are_contiguous_from_zero() {
        let (prog, _) = gen(
            "local function f(): integer return 1 end\n\
             local x: integer = 2\n\
             local function g(): integer return x end",
        );
        let mut indices = Vec::new();
        for tl in &prog.toplevels {
            let id = match tl {
                TopLevel::Func(f) => f.id,
                TopLevel::Var(v) => v.decl.id,
                _ => None,
            };
            indices.push(prog.decls.get(id.unwrap()).global_index.unwrap());
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn globals_table_is_sized_and_slots_use_tagged_stores() {
        let (_, code) = gen("local x: integer = 5\nlocal function get(): integer return x end\nlocal function set(v: integer) x = v end");
        assert!(code.contains("luaH_resize(L, _mod, 3, 0);"));
        // initializer writes through a tagged store
        assert!(code.contains("setivalue(cast(TValue *, luaH_getint(_mod, 1)), 5);"));
        // reads extract from the slot
        assert!(code.contains("ivalue(luaH_getint(_mod, 1))"));
    }

    #[test]
    fn module_table_contains_only_exported_functions() {
        let (_, code) = gen(
            "local function helper(): integer return 1 end\n\
             function public(): integer return helper() end",
        );
        assert!(code.contains("lua_pushstring(L, \"public\");"));
        assert!(!code.contains("lua_pushstring(L, \"helper\");"));
        assert!(code.contains("lua_createtable(L, 0, 1);"));
    }

    #[test]
    fn while_loop_reruns_condition_prelude() {
        let (_, code) = gen(
            "local function f(t: {integer}): integer\n\
             local i: integer = 1\n\
             while t[i] > 0 do i = i + 1 end\n\
             return i\n\
             end",
        );
        assert!(code.contains("for (;;) {"));
        assert!(code.contains("if (!("));
        assert!(code.contains("break;"));
    }

    #[test]
    fn integer_for_loop_wraps_with_intop() {
        let (_, code) = gen(
            "local function f(n: integer): integer\n\
             local acc: integer = 0\n\
             for i = 1, n do acc = acc + i end\n\
             return acc\n\
             end",
        );
        assert!(code.contains("= intop(+, local_i, "));
        assert!(code.contains("local_i <= "));
    }

    #[test]
    fn negative_literal_step_flips_the_test() {
        let (_, code) = gen(
            "local function f(): integer\n\
             local acc: integer = 0\n\
             for i = 10, 1, -1 do acc = acc + i end\n\
             return acc\n\
             end",
        );
        assert!(code.contains("local_i >= "));
    }

    #[test]
    fn modulo_and_floor_division_use_vm_helpers() {
        let (_, code) = gen(
            "local function f(a: integer, b: integer): integer return a % b + a // b end",
        );
        assert!(code.contains("luaV_mod(L, local_a, local_b)"));
        assert!(code.contains("luaV_div(L, local_a, local_b)"));
    }

    #[test]
    fn float_arithmetic_casts_the_integer_side() {
        let (_, code) = gen("local function f(): float return 1 + 2.0 end");
        assert!(code.contains("((lua_Number)(1)) + (2.0)"));
    }

    #[test]
    fn short_circuit_allocates_a_temporary() {
        let (_, code) = gen(
            "local function f(a: boolean, b: boolean): boolean return a and b end",
        );
        assert!(code.contains("int tmp_1;"));
        assert!(code.contains("if (local_a) {"));
        assert!(code.contains("tmp_1 = 0;"));
    }

    #[test]
    fn array_reads_and_writes_go_through_the_table() {
        let (_, code) = gen(
            "local function f(t: {integer}): integer\n\
             t[1] = 7\n\
             return t[2]\n\
             end",
        );
        assert!(code.contains("luaH_setint(L, local_t, 1, &"));
        assert!(code.contains("ivalue(luaH_getint(local_t, 2))"));
    }

    #[test]
    fn array_initializer_builds_and_anchors_a_table() {
        let (_, code) = gen("local t: {integer} = {1, 2, 3}");
        assert!(code.contains("luaH_new(L)"));
        assert!(code.contains("luaH_resize(L, tmp_1, 3, 0);"));
        assert!(code.contains("L->top--;"));
    }

    #[test]
    fn length_uses_table_getn() {
        let (_, code) = gen("local function f(t: {integer}): integer return #t end");
        assert!(code.contains("luaH_getn(local_t)"));
    }

    #[test]
    fn nil_function_returns_zero_and_pushes_nil() {
        let (_, code) = gen("function tick() end");
        assert!(code.contains("return 0;"));
        assert!(code.contains("lua_pushnil(L);"));
    }

    #[test]
    fn calls_forward_the_module_table() {
        let (_, code) = gen(
            "local function one(): integer return 1 end\n\
             local function two(): integer return one() + one() end",
        );
        assert!(code.contains("= function_one_titan(L, _mod);"));
    }

    #[test]
    fn string_literals_are_reserved() {
        let diags = gen_err("local function f(): string return \"hi\" end");
        assert!(diags
            .iter()
            .all(|d| d.kind == DiagnosticKind::NotImplemented));
        assert!(diags[0].message.contains("string literals"));
    }

    #[test]
    fn concat_is_reserved() {
        let diags = gen_err(
            "local function f(s: string): string return s .. s end",
        );
        assert!(diags
            .iter()
            .any(|d| d.message.contains("string concatenations")));
    }

    #[test]
    fn temporaries_are_never_reused() {
        let (_, code) = gen(
            "local function f(a: boolean, b: boolean, c: boolean): boolean\n\
             return a and (b or c)\n\
             end",
        );
        assert!(code.contains("tmp_1"));
        assert!(code.contains("tmp_2"));
    }
}
