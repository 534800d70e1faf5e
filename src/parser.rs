//! Parser for Titan source, producing the raw syntax tree.
//!
//! The grammar follows Lua's statement and expression forms, extended with
//! type annotations (`x: integer`), record declarations, and `e as T` casts.
//! Every node is stamped with a line/column location derived from the byte
//! span chumsky reports.

use crate::ast::{
    Binop, Block, Decl, Exp, ExpKind, FuncDecl, ImportDecl, RecordDecl, Stat, TopLevel, TypeExpr,
    Unop, Var, VarDecl,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::location::LineMap;
use chumsky::prelude::*;
use std::ops::Range;
use std::rc::Rc;

const KEYWORDS: &[&str] = &[
    "and", "as", "break", "do", "else", "elseif", "end", "false", "for", "function", "if",
    "import", "in", "local", "nil", "not", "or", "record", "repeat", "return", "then", "true",
    "until", "while",
];

/// Whitespace and `--` line comments.
fn ws() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    let comment = just("--")
        .then(filter(|c: &char| *c != '\n').repeated())
        .ignored();
    filter(|c: &char| c.is_whitespace())
        .ignored()
        .or(comment)
        .repeated()
        .ignored()
}

fn sym(s: &'static str) -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just(s).padded_by(ws()).ignored()
}

fn kw(s: &'static str) -> impl Parser<char, (), Error = Simple<char>> + Clone {
    text::keyword(s).padded_by(ws())
}

fn name() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    text::ident()
        .try_map(|s: String, span| {
            if KEYWORDS.contains(&s.as_str()) {
                Err(Simple::custom(span, format!("unexpected keyword '{s}'")))
            } else {
                Ok(s)
            }
        })
        .padded_by(ws())
}

fn string_lit() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('"'),
        just('\''),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
    )));
    none_of("\\\"")
        .or(escape)
        .repeated()
        .map(|cs: Vec<char>| cs.into_iter().collect::<String>())
        .delimited_by(just('"'), just('"'))
        .padded_by(ws())
}

fn type_expr(lm: Rc<LineMap>) -> impl Parser<char, TypeExpr, Error = Simple<char>> + Clone {
    recursive(move |te| {
        let tlist = te
            .clone()
            .separated_by(sym(","))
            .delimited_by(sym("("), sym(")"));
        let l1 = lm.clone();
        let func = tlist
            .clone()
            .then_ignore(sym("->"))
            .then(tlist.or(te.clone().map(|t: TypeExpr| vec![t])))
            .map_with_span(move |(params, rets), sp: Range<usize>| TypeExpr::Function {
                loc: l1.loc(sp.start),
                params,
                rets,
            });
        let l2 = lm.clone();
        let array = te
            .clone()
            .delimited_by(sym("{"), sym("}"))
            .map_with_span(move |elem, sp: Range<usize>| TypeExpr::Array {
                loc: l2.loc(sp.start),
                elem: Box::new(elem),
            });
        let l3 = lm.clone();
        let base = name().map_with_span(move |n, sp: Range<usize>| TypeExpr::Name {
            loc: l3.loc(sp.start),
            name: n,
        });
        choice((func, array, base))
    })
}

fn binop_exp(op: Binop, lhs: Exp, rhs: Exp) -> Exp {
    let loc = lhs.loc;
    Exp::new(
        loc,
        ExpKind::Binop {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )
}

enum Suffix {
    Call(Vec<Exp>),
    Index(Exp),
    Field(String),
}

fn expression(lm: Rc<LineMap>) -> impl Parser<char, Exp, Error = Simple<char>> + Clone {
    recursive(move |exp| {
        let l = lm.clone();
        let number = text::int(10)
            .then(just('.').ignore_then(text::digits(10)).or_not())
            .try_map(|(int_part, frac): (String, Option<String>), span: Range<usize>| match frac {
                None => int_part
                    .parse::<i64>()
                    .map(ExpKind::Integer)
                    .map_err(|_| Simple::custom(span, "integer constant too large")),
                Some(frac) => format!("{int_part}.{frac}")
                    .parse::<f64>()
                    .map(ExpKind::Float)
                    .map_err(|_| Simple::custom(span, "malformed number")),
            })
            .padded_by(ws());

        let literal = choice((
            kw("nil").map(|()| ExpKind::Nil),
            kw("true").map(|()| ExpKind::Bool(true)),
            kw("false").map(|()| ExpKind::Bool(false)),
            number,
            string_lit().map(ExpKind::Str),
        ));

        let initlist = exp
            .clone()
            .separated_by(sym(","))
            .allow_trailing()
            .delimited_by(sym("{"), sym("}"))
            .map(|exps| ExpKind::Initlist { exps });

        let l2 = lm.clone();
        let name_exp = name().map_with_span(move |n, sp: Range<usize>| {
            ExpKind::Var(Var::Name {
                loc: l2.loc(sp.start),
                name: n,
                decl: None,
            })
        });

        let primary = {
            let l = l.clone();
            choice((literal, initlist, name_exp))
                .map_with_span(move |k, sp: Range<usize>| Exp::new(l.loc(sp.start), k))
                .or(exp.clone().delimited_by(sym("("), sym(")")))
        };

        let suffix = choice((
            exp.clone()
                .separated_by(sym(","))
                .delimited_by(sym("("), sym(")"))
                .map(Suffix::Call),
            exp.clone()
                .delimited_by(sym("["), sym("]"))
                .map(Suffix::Index),
            sym(".").ignore_then(name()).map(Suffix::Field),
        ));

        let suffixed = primary.then(suffix.repeated()).foldl(|e, s| {
            let loc = e.loc;
            match s {
                Suffix::Call(args) => Exp::new(
                    loc,
                    ExpKind::Call {
                        func: Box::new(e),
                        args,
                    },
                ),
                Suffix::Index(index) => Exp::new(
                    loc,
                    ExpKind::Var(Var::Bracket {
                        loc,
                        exp: Box::new(e),
                        index: Box::new(index),
                    }),
                ),
                Suffix::Field(field) => Exp::new(
                    loc,
                    ExpKind::Var(Var::Dot {
                        loc,
                        exp: Box::new(e),
                        field,
                    }),
                ),
            }
        });

        // `e as T` binds tighter than any binary operator.
        let cast = suffixed
            .then(kw("as").ignore_then(type_expr(lm.clone())).repeated())
            .foldl(|e, target| {
                let loc = e.loc;
                Exp::new(
                    loc,
                    ExpKind::Cast {
                        exp: Box::new(e),
                        target: Some(target),
                    },
                )
            });

        let l3 = lm.clone();
        let unary = recursive(move |unary| {
            let pow = cast
                .clone()
                .then(sym("^").ignore_then(unary.clone()).or_not())
                .map(|(base, e)| match e {
                    Some(e) => binop_exp(Binop::Pow, base, e),
                    None => base,
                });
            let l3 = l3.clone();
            let unop = choice((
                kw("not").to(Unop::Not),
                sym("#").to(Unop::Len),
                sym("-").to(Unop::Neg),
                sym("~").to(Unop::BNot),
            ));
            unop.map_with_span(move |op, sp: Range<usize>| (op, l3.loc(sp.start)))
                .then(unary)
                .map(|((op, loc), e)| {
                    Exp::new(
                        loc,
                        ExpKind::Unop {
                            op,
                            exp: Box::new(e),
                        },
                    )
                })
                .or(pow)
        });

        let muldiv_op = choice((
            just("//").to(Binop::IntDiv),
            just("*").to(Binop::Mul),
            just("/").to(Binop::Div),
            just("%").to(Binop::Mod),
        ))
        .padded_by(ws());
        let muldiv = unary
            .clone()
            .then(muldiv_op.then(unary).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let addsub_op = choice((just("+").to(Binop::Add), just("-").to(Binop::Sub))).padded_by(ws());
        let addsub = muldiv
            .clone()
            .then(addsub_op.then(muldiv).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let concat = addsub
            .clone()
            .then(sym("..").ignore_then(addsub).repeated())
            .map(|(first, rest)| {
                if rest.is_empty() {
                    first
                } else {
                    let loc = first.loc;
                    let mut exps = vec![first];
                    exps.extend(rest);
                    Exp::new(loc, ExpKind::Concat { exps })
                }
            });

        let shift_op = choice((just("<<").to(Binop::Shl), just(">>").to(Binop::Shr))).padded_by(ws());
        let shift = concat
            .clone()
            .then(shift_op.then(concat).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let band = shift
            .clone()
            .then(just("&").padded_by(ws()).to(Binop::BAnd).then(shift).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let bxor = band
            .clone()
            .then(just("~").padded_by(ws()).to(Binop::BXor).then(band).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let bor = bxor
            .clone()
            .then(just("|").padded_by(ws()).to(Binop::BOr).then(bxor).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let cmp_op = choice((
            just("<=").to(Binop::Le),
            just(">=").to(Binop::Ge),
            just("~=").to(Binop::Ne),
            just("==").to(Binop::Eq),
            just("<").to(Binop::Lt),
            just(">").to(Binop::Gt),
        ))
        .padded_by(ws());
        let cmp = bor
            .clone()
            .then(cmp_op.then(bor).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        let and = cmp
            .clone()
            .then(kw("and").to(Binop::And).then(cmp).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r));

        and.clone()
            .then(kw("or").to(Binop::Or).then(and).repeated())
            .foldl(|l, (op, r)| binop_exp(op, l, r))
    })
}

fn decl(lm: Rc<LineMap>) -> impl Parser<char, Decl, Error = Simple<char>> + Clone {
    name()
        .then(sym(":").ignore_then(type_expr(lm.clone())).or_not())
        .map_with_span(move |(n, te), sp: Range<usize>| Decl {
            loc: lm.loc(sp.start),
            name: n,
            type_expr: te,
            id: None,
        })
}

fn block(lm: Rc<LineMap>) -> impl Parser<char, Block, Error = Simple<char>> + Clone {
    let exp = expression(lm.clone());
    recursive(move |blk| {
        let l = lm.clone();
        let while_stat = kw("while")
            .ignore_then(exp.clone())
            .then_ignore(kw("do"))
            .then(blk.clone())
            .then_ignore(kw("end"))
            .map_with_span({
                let l = l.clone();
                move |(cond, body), sp: Range<usize>| Stat::While {
                    loc: l.loc(sp.start),
                    cond,
                    body,
                }
            });

        let repeat_stat = kw("repeat")
            .ignore_then(blk.clone())
            .then_ignore(kw("until"))
            .then(exp.clone())
            .map_with_span({
                let l = l.clone();
                move |(body, cond), sp: Range<usize>| Stat::Repeat {
                    loc: l.loc(sp.start),
                    body,
                    cond,
                }
            });

        let if_stat = kw("if")
            .ignore_then(exp.clone())
            .then_ignore(kw("then"))
            .then(blk.clone())
            .then(
                kw("elseif")
                    .ignore_then(exp.clone())
                    .then_ignore(kw("then"))
                    .then(blk.clone())
                    .repeated(),
            )
            .then(kw("else").ignore_then(blk.clone()).or_not())
            .then_ignore(kw("end"))
            .map_with_span({
                let l = l.clone();
                move |((first, rest), els), sp: Range<usize>| {
                    let mut thens = vec![first];
                    thens.extend(rest);
                    Stat::If {
                        loc: l.loc(sp.start),
                        thens,
                        els,
                    }
                }
            });

        let for_stat = kw("for")
            .ignore_then(decl(lm.clone()))
            .then_ignore(sym("="))
            .then(exp.clone())
            .then_ignore(sym(","))
            .then(exp.clone())
            .then(sym(",").ignore_then(exp.clone()).or_not())
            .then_ignore(kw("do"))
            .then(blk.clone())
            .then_ignore(kw("end"))
            .map_with_span({
                let l = l.clone();
                move |((((d, start), finish), step), body), sp: Range<usize>| Stat::For {
                    loc: l.loc(sp.start),
                    decl: d,
                    start,
                    finish,
                    step,
                    body,
                }
            });

        let do_stat = kw("do")
            .ignore_then(blk.clone())
            .then_ignore(kw("end"))
            .map_with_span({
                let l = l.clone();
                move |body, sp: Range<usize>| Stat::Block {
                    loc: l.loc(sp.start),
                    body,
                }
            });

        let local_stat = kw("local")
            .ignore_then(decl(lm.clone()))
            .then_ignore(sym("="))
            .then(exp.clone())
            .map_with_span({
                let l = l.clone();
                move |(d, e), sp: Range<usize>| Stat::Decl {
                    loc: l.loc(sp.start),
                    decl: d,
                    exp: e,
                }
            });

        let assign_stat = exp
            .clone()
            .try_map(|e: Exp, span: Range<usize>| match e.kind {
                ExpKind::Var(v) => Ok(v),
                _ => Err(Simple::custom(span, "this expression cannot be assigned to")),
            })
            .then_ignore(sym("="))
            .then(exp.clone())
            .map_with_span({
                let l = l.clone();
                move |(var, e), sp: Range<usize>| Stat::Assign {
                    loc: l.loc(sp.start),
                    var,
                    exp: e,
                }
            });

        let call_stat = exp
            .clone()
            .try_map({
                let l = l.clone();
                move |e: Exp, span: Range<usize>| match e.kind {
                    ExpKind::Call { .. } => Ok(Stat::Call {
                        loc: l.loc(span.start),
                        call: e,
                    }),
                    _ => Err(Simple::custom(span, "expected a statement")),
                }
            });

        let stat = choice((
            while_stat,
            repeat_stat,
            if_stat,
            for_stat,
            do_stat,
            local_stat,
            assign_stat,
            call_stat,
        ))
        .then_ignore(sym(";").or_not());

        let ret_stat = kw("return")
            .map_with_span({
                let l = l.clone();
                move |(), sp: Range<usize>| l.loc(sp.start)
            })
            .then(exp.clone().or_not())
            .then_ignore(sym(";").or_not())
            .map(|(loc, e)| Stat::Return { loc, exp: e });

        stat.repeated()
            .then(ret_stat.or_not())
            .map(|(mut stats, ret)| {
                if let Some(r) = ret {
                    stats.push(r);
                }
                Block { stats }
            })
    })
}

fn toplevel(lm: Rc<LineMap>) -> impl Parser<char, Vec<TopLevel>, Error = Simple<char>> {
    let l = lm.clone();
    let param = name()
        .then_ignore(sym(":"))
        .then(type_expr(lm.clone()))
        .map_with_span({
            let l = l.clone();
            move |(n, te), sp: Range<usize>| Decl {
                loc: l.loc(sp.start),
                name: n,
                type_expr: Some(te),
                id: None,
            }
        });

    // `: t` or `: (t1, t2)`; a function type is itself a single `t`.
    let ret_types = sym(":").ignore_then(
        type_expr(lm.clone()).map(|t| vec![t]).or(type_expr(lm.clone())
            .separated_by(sym(","))
            .delimited_by(sym("("), sym(")"))),
    );

    let func = kw("local")
        .or_not()
        .map(|o| o.is_none())
        .then_ignore(kw("function"))
        .then(name())
        .then(
            param
                .separated_by(sym(","))
                .delimited_by(sym("("), sym(")")),
        )
        .then(ret_types.or_not())
        .then(block(lm.clone()))
        .then_ignore(kw("end"))
        .map_with_span({
            let l = l.clone();
            move |((((exported, n), params), rets), body), sp: Range<usize>| {
                TopLevel::Func(FuncDecl {
                    loc: l.loc(sp.start),
                    name: n,
                    is_local: !exported,
                    params,
                    return_types: rets.unwrap_or_default(),
                    block: body,
                    ignore: false,
                    id: None,
                    titan_entry: None,
                    lua_entry: None,
                })
            }
        });

    let import = kw("local")
        .ignore_then(name())
        .then_ignore(sym("="))
        .then_ignore(kw("import"))
        .then(string_lit())
        .map_with_span({
            let l = l.clone();
            move |(n, module), sp: Range<usize>| {
                TopLevel::Import(ImportDecl {
                    loc: l.loc(sp.start),
                    local_name: n,
                    module_name: module,
                    ignore: false,
                })
            }
        });

    let var = kw("local")
        .ignore_then(decl(lm.clone()))
        .then_ignore(sym("="))
        .then(expression(lm.clone()))
        .map_with_span({
            let l = l.clone();
            move |(d, e), sp: Range<usize>| {
                TopLevel::Var(VarDecl {
                    loc: l.loc(sp.start),
                    decl: d,
                    value: e,
                    ignore: false,
                })
            }
        });

    let field = name()
        .then_ignore(sym(":"))
        .then(type_expr(lm.clone()))
        .then_ignore(sym(";").or_not());
    let record = kw("record")
        .ignore_then(name())
        .then(field.repeated())
        .then_ignore(kw("end"))
        .map_with_span({
            let l = l.clone();
            move |(n, fields), sp: Range<usize>| {
                TopLevel::Record(RecordDecl {
                    loc: l.loc(sp.start),
                    name: n,
                    fields,
                    ignore: false,
                })
            }
        });

    ws().ignore_then(
        choice((func, import, var, record))
            .repeated()
            .then_ignore(ws())
            .then_ignore(end()),
    )
}

/// Parse a whole module. On failure, returns one positioned syntax
/// diagnostic per parse error, in source order.
pub fn parse(filename: &str, src: &str) -> Result<Vec<TopLevel>, Vec<Diagnostic>> {
    let lm = Rc::new(LineMap::new(src));
    toplevel(lm.clone()).parse(src).map_err(|errs| {
        let mut diags: Vec<Diagnostic> = errs
            .into_iter()
            .map(|e| {
                Diagnostic::new(
                    DiagnosticKind::Syntax,
                    filename,
                    lm.loc(e.span().start),
                    format!("syntax error: {e}"),
                )
            })
            .collect();
        diags.sort_by_key(|d| d.loc);
        diags
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Binop, ExpKind, Stat, TopLevel, Unop};

    fn parse_ok(src: &str) -> Vec<TopLevel> {
        parse("test.pln", src).unwrap_or_else(|e| panic!("parse failed: {e:?}"))
    }

    #[test]
    fn empty_module_parses() {
        assert!(parse_ok("").is_empty());
        assert!(parse_ok("   -- just a comment\n").is_empty());
    }

    #[test]
    fn function_declaration() {
        let tls = parse_ok("local function add(x: integer, y: integer): integer return x + y end");
        assert_eq!(tls.len(), 1);
        let TopLevel::Func(f) = &tls[0] else {
            panic!("expected a function")
        };
        assert_eq!(f.name, "add");
        assert!(f.is_local);
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.return_types.len(), 1);
        assert_eq!(f.block.stats.len(), 1);
        assert!(matches!(f.block.stats[0], Stat::Return { exp: Some(_), .. }));
    }

    #[test]
    fn exported_function_is_not_local() {
        let tls = parse_ok("function f() end");
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        assert!(!f.is_local);
        assert!(f.return_types.is_empty());
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let tls = parse_ok("local x: integer = 1 + 2 * 3");
        let TopLevel::Var(v) = &tls[0] else { panic!() };
        let ExpKind::Binop { op, rhs, .. } = &v.value.kind else {
            panic!("expected binop")
        };
        assert_eq!(*op, Binop::Add);
        assert!(matches!(
            rhs.kind,
            ExpKind::Binop { op: Binop::Mul, .. }
        ));
    }

    #[test]
    fn unary_and_length_operators() {
        let tls = parse_ok("local function f(t: {integer}): integer return #t + -1 end");
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        let Stat::Return { exp: Some(e), .. } = &f.block.stats[0] else {
            panic!()
        };
        let ExpKind::Binop { lhs, rhs, .. } = &e.kind else { panic!() };
        assert!(matches!(lhs.kind, ExpKind::Unop { op: Unop::Len, .. }));
        assert!(matches!(rhs.kind, ExpKind::Unop { op: Unop::Neg, .. }));
    }

    #[test]
    fn concat_is_n_ary() {
        let tls = parse_ok(r#"local s: string = "a" .. "b" .. "c""#);
        let TopLevel::Var(v) = &tls[0] else { panic!() };
        let ExpKind::Concat { exps } = &v.value.kind else {
            panic!("expected concat")
        };
        assert_eq!(exps.len(), 3);
    }

    #[test]
    fn cast_expression() {
        let tls = parse_ok("local x: float = 1 as float");
        let TopLevel::Var(v) = &tls[0] else { panic!() };
        assert!(matches!(v.value.kind, ExpKind::Cast { .. }));
    }

    #[test]
    fn statements_and_locations() {
        let src = "local function f(n: integer): integer\n    local acc: integer = 0\n    for i = 1, n do\n        acc = acc + i\n    end\n    return acc\nend";
        let tls = parse_ok(src);
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        assert_eq!(f.loc.line, 1);
        assert_eq!(f.block.stats.len(), 3);
        let Stat::Decl { loc, .. } = &f.block.stats[0] else { panic!() };
        assert_eq!(loc.line, 2);
        let Stat::For { loc, step, .. } = &f.block.stats[1] else {
            panic!()
        };
        assert_eq!(loc.line, 3);
        assert!(step.is_none());
    }

    #[test]
    fn while_if_and_calls() {
        let src = "local function f(x: integer): integer\n\
                   while x > 0 do\n\
                   if x % 2 == 0 then x = x // 2 elseif x > 10 then x = x - 1 else x = x + 1 end\n\
                   end\n\
                   return x\n\
                   end\n\
                   function g(): integer return f(7) end";
        let tls = parse_ok(src);
        assert_eq!(tls.len(), 2);
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        let Stat::While { body, .. } = &f.block.stats[0] else { panic!() };
        let Stat::If { thens, els, .. } = &body.stats[0] else { panic!() };
        assert_eq!(thens.len(), 2);
        assert!(els.is_some());
    }

    #[test]
    fn record_and_import_declarations() {
        let src = "record Point\n    x: float\n    y: float\nend\nlocal m = import \"foo\"";
        let tls = parse_ok(src);
        assert_eq!(tls.len(), 2);
        let TopLevel::Record(r) = &tls[0] else { panic!() };
        assert_eq!(r.fields.len(), 2);
        let TopLevel::Import(i) = &tls[1] else { panic!() };
        assert_eq!(i.module_name, "foo");
    }

    #[test]
    fn array_type_and_indexing() {
        let tls = parse_ok("local function f(t: {integer}): integer return t[1] end");
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        let Stat::Return { exp: Some(e), .. } = &f.block.stats[0] else {
            panic!()
        };
        assert!(matches!(
            e.kind,
            ExpKind::Var(crate::ast::Var::Bracket { .. })
        ));
    }

    #[test]
    fn function_type_syntax() {
        let tls = parse_ok("local function f(g: (integer) -> (integer)): integer return 0 end");
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        assert!(matches!(
            f.params[0].type_expr,
            Some(TypeExpr::Function { .. })
        ));
    }

    #[test]
    fn syntax_error_has_location() {
        let errs = parse("m.pln", "local function f(\n").unwrap_err();
        assert!(!errs.is_empty());
        assert!(errs[0].loc.line >= 1);
        assert!(errs[0].message.starts_with("syntax error"));
    }

    #[test]
    fn repeat_until_sees_condition() {
        let tls = parse_ok(
            "local function f(): integer\nlocal x: integer = 0\nrepeat x = x + 1 until x > 3\nreturn x\nend",
        );
        let TopLevel::Func(f) = &tls[0] else { panic!() };
        assert!(matches!(f.block.stats[1], Stat::Repeat { .. }));
    }
}
