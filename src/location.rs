use std::fmt;

/// A position in the source file, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Loc {
        Loc { line, col }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Maps byte offsets into a source string to line/column pairs.
///
/// Built once per compilation and shared with the parser, which stamps a
/// `Loc` onto every node it produces.
#[derive(Debug)]
pub struct LineMap {
    /// Byte offset of the first character of each line.
    line_starts: Vec<usize>,
}

impl LineMap {
    pub fn new(src: &str) -> LineMap {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineMap { line_starts }
    }

    pub fn loc(&self, offset: usize) -> Loc {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Loc {
            line: (line + 1) as u32,
            col: (offset - self.line_starts[line] + 1) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line() {
        let m = LineMap::new("local x = 1\n");
        assert_eq!(m.loc(0), Loc::new(1, 1));
        assert_eq!(m.loc(6), Loc::new(1, 7));
    }

    #[test]
    fn later_lines() {
        let m = LineMap::new("a\nbb\nccc\n");
        assert_eq!(m.loc(2), Loc::new(2, 1));
        assert_eq!(m.loc(3), Loc::new(2, 2));
        assert_eq!(m.loc(5), Loc::new(3, 1));
        assert_eq!(m.loc(7), Loc::new(3, 3));
    }

    #[test]
    fn offset_past_last_newline() {
        let m = LineMap::new("x\ny");
        assert_eq!(m.loc(2), Loc::new(2, 1));
    }
}
