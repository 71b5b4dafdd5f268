use std::fmt;

/// The position of a single character within the input file.
///
/// Rows and columns are zero indexed; the first character of a file is at
/// column 0 in row 0. `Display` renders the conventional one-based
/// `line:column` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub row: u32,
    pub col: u32,
}

impl Position {
    pub fn new(row: u32, col: u32) -> Self {
        Position { row, col }
    }

    pub fn at_file_start() -> Self {
        Position { row: 0, col: 0 }
    }

    /// Position of the character following this one on the same line.
    pub fn next_column(self) -> Self {
        Position {
            row: self.row,
            col: self.col + 1,
        }
    }

    /// Position of the first character of the next line.
    pub fn next_line(self) -> Self {
        Position {
            row: self.row + 1,
            col: 0,
        }
    }

    pub fn line_number(self) -> u32 {
        self.row + 1
    }

    pub fn column_number(self) -> u32 {
        self.col + 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line_number(), self.column_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_one_based() {
        assert_eq!(Position::at_file_start().to_string(), "1:1");
        assert_eq!(Position::new(2, 6).to_string(), "3:7");
    }

    #[test]
    fn ordering_is_row_major() {
        assert!(Position::new(0, 9) < Position::new(1, 0));
        assert!(Position::new(3, 1) < Position::new(3, 2));
    }
}
