use failure::Fail;
use std::{ops::Deref, str};

/// The complete input of a single compilation, guaranteed to be ASCII.
///
/// Guarding the encoding up front means every later stage can slice the
/// mapping at byte offsets without worrying about multi-byte characters.
#[derive(Debug)]
pub struct AsciiFile<'m> {
    mapping: &'m str,
}

#[derive(Debug, Fail)]
pub enum EncodingError {
    #[fail(
        display = "input contains non-ascii character at byte offset {}: {}<?>",
        position, prev
    )]
    NotAscii { position: usize, prev: String },
}

const ENCODING_ERROR_MAX_CONTEXT_LENGTH: usize = 80;

impl<'m> AsciiFile<'m> {
    pub fn new(mapping: &'m [u8]) -> Result<AsciiFile<'m>, EncodingError> {
        if let Some(position) = mapping.iter().position(|c| !c.is_ascii()) {
            let context_start = position.saturating_sub(ENCODING_ERROR_MAX_CONTEXT_LENGTH);
            let prev = String::from_utf8_lossy(&mapping[context_start..position]).to_string();
            return Err(EncodingError::NotAscii { position, prev });
        }

        let mapping = str::from_utf8(mapping).expect("ASCII file is valid UTF-8");
        Ok(AsciiFile { mapping })
    }

    pub fn as_str(&self) -> &'m str {
        self.mapping
    }

    /// The contents of the line with the given zero-based row, without its
    /// trailing newline. Used by diagnostics to render source snippets.
    pub fn line(&self, row: u32) -> Option<&'m str> {
        self.mapping.lines().nth(row as usize)
    }
}

impl Deref for AsciiFile<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ascii() {
        let file = AsciiFile::new(b"class A {}").unwrap();
        assert_eq!(file.as_str(), "class A {}");
    }

    #[test]
    fn rejects_non_ascii() {
        let err = AsciiFile::new("class \u{00e4} {}".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn non_ascii_error_names_offset() {
        match AsciiFile::new("ab\u{00e4}".as_bytes()) {
            Err(EncodingError::NotAscii { position, prev }) => {
                assert_eq!(position, 2);
                assert_eq!(prev, "ab");
            }
            Ok(_) => panic!("expected an encoding error"),
        }
    }

    #[test]
    fn line_lookup() {
        let file = AsciiFile::new(b"first\nsecond\nthird").unwrap();
        assert_eq!(file.line(0), Some("first"));
        assert_eq!(file.line(1), Some("second"));
        assert_eq!(file.line(2), Some("third"));
        assert_eq!(file.line(3), None);
    }
}
