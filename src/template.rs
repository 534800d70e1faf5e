//! Checked substitution of named holes in C templates.
//!
//! Holes are written `${NAME}`. Rendering fails when a hole has no
//! substitution or a substitution names no hole, so a misspelled key is an
//! error instead of silently leaking `${...}` into generated code.

use rustc_hash::FxHashMap;
use std::collections::HashSet;

pub fn render(template: &str, subs: &FxHashMap<&str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut used: HashSet<&str> = HashSet::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err("unterminated ${ hole in template".to_string());
        };
        let key = &after[..end];
        match subs.get_key_value(key) {
            Some((k, value)) => {
                used.insert(*k);
                out.push_str(value);
            }
            None => return Err(format!("no substitution for template hole ${{{key}}}")),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    for key in subs.keys() {
        if !used.contains(*key) {
            return Err(format!("unused substitution {key}"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(pairs: &[(&'static str, &str)]) -> FxHashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn substitutes_all_holes() {
        let s = render(
            "int luaopen_${MOD}(lua_State *L) { return ${N}; }",
            &subs(&[("MOD", "foo"), ("N", "1")]),
        )
        .unwrap();
        assert_eq!(s, "int luaopen_foo(lua_State *L) { return 1; }");
    }

    #[test]
    fn repeated_hole_is_fine() {
        let s = render("${A} ${A}", &subs(&[("A", "x")])).unwrap();
        assert_eq!(s, "x x");
    }

    #[test]
    fn missing_substitution_is_an_error() {
        let err = render("${MISSING}", &subs(&[])).unwrap_err();
        assert!(err.contains("MISSING"));
    }

    #[test]
    fn unused_substitution_is_an_error() {
        let err = render("no holes", &subs(&[("EXTRA", "x")])).unwrap_err();
        assert!(err.contains("EXTRA"));
    }
}
