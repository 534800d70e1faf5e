//! Translation to plain Lua.
//!
//! `--emit-lua` writes the module back out with every static-typing construct
//! erased: type annotations and casts disappear, record declarations vanish
//! (they only exist for the checker), and `import` becomes `require`. The
//! result runs under the stock interpreter, with a trailing module table
//! mirroring what `luaopen` would export.

use crate::ast::{Binop, Block, Exp, ExpKind, Program, Stat, TopLevel, Unop, Var};
use itertools::Itertools;

pub fn emit_lua(prog: &Program) -> String {
    let mut e = Emitter {
        out: String::new(),
        indent: 0,
    };
    let mut exported = Vec::new();
    for tl in &prog.toplevels {
        if tl.ignore() {
            continue;
        }
        match tl {
            TopLevel::Func(f) => {
                let params = f.params.iter().map(|p| p.name.as_str()).join(", ");
                e.line(&format!("local function {}({})", f.name, params));
                e.indent += 1;
                e.block(&f.block);
                e.indent -= 1;
                e.line("end");
                if !f.is_local {
                    exported.push(f.name.clone());
                }
            }
            TopLevel::Var(v) => {
                e.line(&format!("local {} = {}", v.decl.name, exp_str(&v.value)));
            }
            TopLevel::Record(_) => {}
            TopLevel::Import(im) => {
                e.line(&format!(
                    "local {} = require \"{}\"",
                    im.local_name, im.module_name
                ));
            }
        }
    }
    let entries = exported.iter().map(|n| format!("{n} = {n}")).join(", ");
    e.line(&format!("return {{ {entries} }}"));
    e.out
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn block(&mut self, block: &Block) {
        for stat in &block.stats {
            self.stat(stat);
        }
    }

    fn stat(&mut self, stat: &Stat) {
        match stat {
            Stat::Block { body, .. } => {
                self.line("do");
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line("end");
            }
            Stat::While { cond, body, .. } => {
                self.line(&format!("while {} do", exp_str(cond)));
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line("end");
            }
            Stat::Repeat { body, cond, .. } => {
                self.line("repeat");
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line(&format!("until {}", exp_str(cond)));
            }
            Stat::If { thens, els, .. } => {
                for (i, (cond, body)) in thens.iter().enumerate() {
                    let kw = if i == 0 { "if" } else { "elseif" };
                    self.line(&format!("{kw} {} then", exp_str(cond)));
                    self.indent += 1;
                    self.block(body);
                    self.indent -= 1;
                }
                if let Some(els) = els {
                    self.line("else");
                    self.indent += 1;
                    self.block(els);
                    self.indent -= 1;
                }
                self.line("end");
            }
            Stat::For {
                decl,
                start,
                finish,
                step,
                body,
                ..
            } => {
                let head = match step {
                    Some(s) => format!(
                        "for {} = {}, {}, {} do",
                        decl.name,
                        exp_str(start),
                        exp_str(finish),
                        exp_str(s)
                    ),
                    None => format!(
                        "for {} = {}, {} do",
                        decl.name,
                        exp_str(start),
                        exp_str(finish)
                    ),
                };
                self.line(&head);
                self.indent += 1;
                self.block(body);
                self.indent -= 1;
                self.line("end");
            }
            Stat::Assign { var, exp, .. } => {
                self.line(&format!("{} = {}", var_str(var), exp_str(exp)));
            }
            Stat::Decl { decl, exp, .. } => {
                self.line(&format!("local {} = {}", decl.name, exp_str(exp)));
            }
            Stat::Call { call, .. } => {
                self.line(&exp_str(call));
            }
            Stat::Return { exp, .. } => match exp {
                Some(e) => self.line(&format!("return {}", exp_str(e))),
                None => self.line("return"),
            },
        }
    }
}

fn exp_str(exp: &Exp) -> String {
    match &exp.kind {
        ExpKind::Nil => "nil".to_string(),
        ExpKind::Bool(true) => "true".to_string(),
        ExpKind::Bool(false) => "false".to_string(),
        ExpKind::Integer(v) => v.to_string(),
        ExpKind::Float(v) => format!("{v:?}"),
        ExpKind::Str(s) => lua_quote(s),
        ExpKind::Var(v) => var_str(v),
        ExpKind::Unop { op, exp } => {
            let op = match op {
                Unop::Neg => "-",
                Unop::Not => "not ",
                Unop::Len => "#",
                Unop::BNot => "~",
            };
            format!("({op}{})", exp_str(exp))
        }
        ExpKind::Binop { op, lhs, rhs } => {
            let op = match op {
                Binop::And => "and",
                Binop::Or => "or",
                other => other.display(),
            };
            format!("({} {op} {})", exp_str(lhs), exp_str(rhs))
        }
        ExpKind::Call { func, args } => {
            let args = args.iter().map(exp_str).join(", ");
            format!("{}({args})", exp_str(func))
        }
        ExpKind::Initlist { exps } => {
            format!("{{{}}}", exps.iter().map(exp_str).join(", "))
        }
        ExpKind::Concat { exps } => {
            format!("({})", exps.iter().map(exp_str).join(" .. "))
        }
        // Casts exist only for the type system.
        ExpKind::Cast { exp, .. } => exp_str(exp),
    }
}

fn var_str(var: &Var) -> String {
    match var {
        Var::Name { name, .. } => name.clone(),
        Var::Bracket { exp, index, .. } => format!("{}[{}]", exp_str(exp), exp_str(index)),
        Var::Dot { exp, field, .. } => format!("{}.{}", exp_str(exp), field),
    }
}

fn lua_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
