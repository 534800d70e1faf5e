use rustc_hash::FxHashMap;

/// The reserved name under which the enclosing function is registered while
/// its body is being processed, so `return` statements can recover the
/// expected return type. `$` cannot appear in a source identifier.
pub const FUNCTION_SENTINEL: &str = "$function";

/// A stack of lexical scopes mapping names to bindings.
#[derive(Debug)]
pub struct SymTab<T> {
    scopes: Vec<FxHashMap<String, T>>,
}

impl<T: Clone> SymTab<T> {
    pub fn new() -> SymTab<T> {
        SymTab {
            scopes: vec![FxHashMap::default()],
        }
    }

    /// Insert into the innermost scope. Returns the previous binding when the
    /// name was already present in that scope; the caller decides whether a
    /// duplicate is an error.
    pub fn add_symbol(&mut self, name: &str, binding: T) -> Option<T> {
        let top = self
            .scopes
            .last_mut()
            .unwrap_or_else(|| unreachable!("symbol table with no scopes"));
        top.insert(name.to_string(), binding)
    }

    /// Look a name up across all scopes, innermost first.
    pub fn find_symbol(&self, name: &str) -> Option<T> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    /// Look a name up in the innermost scope only.
    pub fn find_dup(&self, name: &str) -> Option<T> {
        self.scopes.last().and_then(|scope| scope.get(name).cloned())
    }

    /// Run `f` inside a fresh scope, threading `ctx` through. The scope is
    /// popped on every exit path, early `?` returns included.
    pub fn with_block<C, R>(&mut self, ctx: C, f: impl FnOnce(&mut Self, C) -> R) -> R {
        self.scopes.push(FxHashMap::default());
        let result = f(self, ctx);
        self.scopes.pop();
        result
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl<T: Clone> Default for SymTab<T> {
    fn default() -> Self {
        SymTab::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_outer() {
        let mut st: SymTab<u32> = SymTab::new();
        st.add_symbol("x", 1);
        st.with_block((), |st, ()| {
            assert_eq!(st.find_symbol("x"), Some(1));
            st.add_symbol("x", 2);
            assert_eq!(st.find_symbol("x"), Some(2));
        });
        assert_eq!(st.find_symbol("x"), Some(1));
    }

    #[test]
    fn find_dup_peeks_top_scope_only() {
        let mut st: SymTab<u32> = SymTab::new();
        st.add_symbol("x", 1);
        st.with_block((), |st, ()| {
            assert_eq!(st.find_dup("x"), None);
            st.add_symbol("x", 2);
            assert_eq!(st.find_dup("x"), Some(2));
        });
    }

    #[test]
    fn add_symbol_reports_duplicates() {
        let mut st: SymTab<u32> = SymTab::new();
        assert_eq!(st.add_symbol("f", 1), None);
        assert_eq!(st.add_symbol("f", 2), Some(1));
    }

    #[test]
    fn with_block_pops_on_early_return() {
        let mut st: SymTab<u32> = SymTab::new();
        let r: Result<(), ()> = st.with_block((), |st, ()| {
            st.add_symbol("tmp", 9);
            Err(())
        });
        assert!(r.is_err());
        assert_eq!(st.depth(), 1);
        assert_eq!(st.find_symbol("tmp"), None);
    }
}
