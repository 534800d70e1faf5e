//! Syntax tree for Titan modules.
//!
//! The parser produces the raw tree; scope analysis, the checker and the
//! coder enrich it in place. Name occurrences point back at their declaring
//! node through a plain index into the [`DeclArena`], keeping the tree itself
//! acyclic.

use crate::location::Loc;
use crate::types::Type;

/// Index of a declaration in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

/// How a declaration is stored at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// A top-level variable: a slot in the module's globals table.
    Global,
    /// A top-level function; `toplevel` indexes `Program::toplevels`.
    Function { toplevel: usize },
    /// A local, parameter, or loop variable: a plain C variable.
    Local,
}

#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub name: String,
    pub loc: Loc,
    pub kind: DeclKind,
    /// The declaration's elaborated type, set by the checker (immediately for
    /// recovery declarations made by scope analysis).
    pub ty: Option<Type>,
    /// Slot index in the globals table, assigned by the coder over top-level
    /// value declarations in source order.
    pub global_index: Option<u32>,
}

/// Arena of every declaration in the program. Back-references from name
/// occurrences are `DeclId` indices into this arena.
#[derive(Debug, Default)]
pub struct DeclArena {
    infos: Vec<DeclInfo>,
}

impl DeclArena {
    pub fn add(&mut self, name: &str, loc: Loc, kind: DeclKind) -> DeclId {
        self.infos.push(DeclInfo {
            name: name.to_string(),
            loc,
            kind,
            ty: None,
            global_index: None,
        });
        DeclId((self.infos.len() - 1) as u32)
    }

    pub fn get(&self, id: DeclId) -> &DeclInfo {
        &self.infos[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: DeclId) -> &mut DeclInfo {
        &mut self.infos[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// A whole compiled module.
#[derive(Debug)]
pub struct Program {
    pub filename: String,
    pub toplevels: Vec<TopLevel>,
    pub decls: DeclArena,
}

impl Program {
    pub fn new(filename: impl Into<String>, toplevels: Vec<TopLevel>) -> Program {
        Program {
            filename: filename.into(),
            toplevels,
            decls: DeclArena::default(),
        }
    }
}

#[derive(Debug)]
pub enum TopLevel {
    Func(FuncDecl),
    Var(VarDecl),
    Record(RecordDecl),
    Import(ImportDecl),
}

impl TopLevel {
    pub fn name(&self) -> &str {
        match self {
            TopLevel::Func(f) => &f.name,
            TopLevel::Var(v) => &v.decl.name,
            TopLevel::Record(r) => &r.name,
            TopLevel::Import(i) => &i.local_name,
        }
    }

    pub fn loc(&self) -> Loc {
        match self {
            TopLevel::Func(f) => f.loc,
            TopLevel::Var(v) => v.loc,
            TopLevel::Record(r) => r.loc,
            TopLevel::Import(i) => i.loc,
        }
    }

    pub fn ignore(&self) -> bool {
        match self {
            TopLevel::Func(f) => f.ignore,
            TopLevel::Var(v) => v.ignore,
            TopLevel::Record(r) => r.ignore,
            TopLevel::Import(i) => i.ignore,
        }
    }

    pub fn set_ignore(&mut self) {
        match self {
            TopLevel::Func(f) => f.ignore = true,
            TopLevel::Var(v) => v.ignore = true,
            TopLevel::Record(r) => r.ignore = true,
            TopLevel::Import(i) => i.ignore = true,
        }
    }
}

#[derive(Debug)]
pub struct FuncDecl {
    pub loc: Loc,
    pub name: String,
    /// Module-private (`local function`) functions do not appear in the
    /// module table.
    pub is_local: bool,
    pub params: Vec<Decl>,
    pub return_types: Vec<TypeExpr>,
    pub block: Block,
    pub ignore: bool,
    pub id: Option<DeclId>,
    /// C name of the statically-typed entry point, assigned by the coder.
    pub titan_entry: Option<String>,
    /// C name of the stack-calling-convention wrapper, assigned by the coder.
    pub lua_entry: Option<String>,
}

#[derive(Debug)]
pub struct VarDecl {
    pub loc: Loc,
    pub decl: Decl,
    pub value: Exp,
    pub ignore: bool,
}

#[derive(Debug)]
pub struct RecordDecl {
    pub loc: Loc,
    pub name: String,
    pub fields: Vec<(String, TypeExpr)>,
    pub ignore: bool,
}

#[derive(Debug)]
pub struct ImportDecl {
    pub loc: Loc,
    pub local_name: String,
    pub module_name: String,
    pub ignore: bool,
}

/// A name being declared, with its optional source-level type annotation.
#[derive(Debug)]
pub struct Decl {
    pub loc: Loc,
    pub name: String,
    pub type_expr: Option<TypeExpr>,
    pub id: Option<DeclId>,
}

/// Source-level type syntax, resolved to a `Type` by the checker.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Name { loc: Loc, name: String },
    Array { loc: Loc, elem: Box<TypeExpr> },
    Function {
        loc: Loc,
        params: Vec<TypeExpr>,
        rets: Vec<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn loc(&self) -> Loc {
        match self {
            TypeExpr::Name { loc, .. }
            | TypeExpr::Array { loc, .. }
            | TypeExpr::Function { loc, .. } => *loc,
        }
    }
}

#[derive(Debug)]
pub struct Block {
    pub stats: Vec<Stat>,
}

#[derive(Debug)]
pub enum Stat {
    Block {
        loc: Loc,
        body: Block,
    },
    While {
        loc: Loc,
        cond: Exp,
        body: Block,
    },
    Repeat {
        loc: Loc,
        body: Block,
        cond: Exp,
    },
    If {
        loc: Loc,
        thens: Vec<(Exp, Block)>,
        els: Option<Block>,
    },
    For {
        loc: Loc,
        decl: Decl,
        start: Exp,
        finish: Exp,
        step: Option<Exp>,
        body: Block,
    },
    Assign {
        loc: Loc,
        var: Var,
        exp: Exp,
    },
    Decl {
        loc: Loc,
        decl: Decl,
        exp: Exp,
    },
    Call {
        loc: Loc,
        call: Exp,
    },
    Return {
        loc: Loc,
        exp: Option<Exp>,
    },
}

impl Stat {
    pub fn loc(&self) -> Loc {
        match self {
            Stat::Block { loc, .. }
            | Stat::While { loc, .. }
            | Stat::Repeat { loc, .. }
            | Stat::If { loc, .. }
            | Stat::For { loc, .. }
            | Stat::Assign { loc, .. }
            | Stat::Decl { loc, .. }
            | Stat::Call { loc, .. }
            | Stat::Return { loc, .. } => *loc,
        }
    }
}

/// An expression together with its elaborated type (`ty` is set by the
/// checker; it is `None` on a freshly parsed tree).
#[derive(Debug)]
pub struct Exp {
    pub loc: Loc,
    pub ty: Option<Type>,
    pub kind: ExpKind,
}

impl Exp {
    pub fn new(loc: Loc, kind: ExpKind) -> Exp {
        Exp { loc, ty: None, kind }
    }

    /// The elaborated type. Only meaningful after the checker has run.
    pub fn typ(&self) -> Type {
        self.ty.clone().unwrap_or(Type::Invalid)
    }
}

#[derive(Debug)]
pub enum ExpKind {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Var(Var),
    Unop {
        op: Unop,
        exp: Box<Exp>,
    },
    Binop {
        op: Binop,
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    Call {
        func: Box<Exp>,
        args: Vec<Exp>,
    },
    Initlist {
        exps: Vec<Exp>,
    },
    Concat {
        exps: Vec<Exp>,
    },
    /// A conversion. `target` is the source-level annotation for `e as T`;
    /// casts synthesized by the checker have no source annotation and carry
    /// the target type in `Exp::ty` alone.
    Cast {
        exp: Box<Exp>,
        target: Option<TypeExpr>,
    },
}

#[derive(Debug)]
pub enum Var {
    Name {
        loc: Loc,
        name: String,
        /// Back-reference to the declaration, set by scope analysis.
        decl: Option<DeclId>,
    },
    Bracket {
        loc: Loc,
        exp: Box<Exp>,
        index: Box<Exp>,
    },
    Dot {
        loc: Loc,
        exp: Box<Exp>,
        field: String,
    },
}

impl Var {
    pub fn loc(&self) -> Loc {
        match self {
            Var::Name { loc, .. } | Var::Bracket { loc, .. } | Var::Dot { loc, .. } => *loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unop {
    Neg,
    Not,
    Len,
    BNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl Binop {
    /// The operator as written in Titan source (used in diagnostics and by
    /// the Lua emitter).
    pub fn display(&self) -> &'static str {
        match self {
            Binop::Add => "+",
            Binop::Sub => "-",
            Binop::Mul => "*",
            Binop::Div => "/",
            Binop::IntDiv => "//",
            Binop::Mod => "%",
            Binop::Pow => "^",
            Binop::Eq => "==",
            Binop::Ne => "~=",
            Binop::Lt => "<",
            Binop::Gt => ">",
            Binop::Le => "<=",
            Binop::Ge => ">=",
            Binop::And => "and",
            Binop::Or => "or",
            Binop::BAnd => "&",
            Binop::BOr => "|",
            Binop::BXor => "~",
            Binop::Shl => "<<",
            Binop::Shr => ">>",
        }
    }
}
