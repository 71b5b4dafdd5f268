//! All state shared by the lexer, parser, semantic analysis and code
//! generation phases.
use asciifile::AsciiFile;
use diagnostics::Diagnostics;
use termcolor::WriteColor;

pub struct Context<'f> {
    pub file: &'f AsciiFile<'f>,
    pub diagnostics: Diagnostics,
}

impl<'f> Context<'f> {
    pub fn new(file: &'f AsciiFile<'f>, writer: Box<dyn WriteColor>) -> Self {
        Self {
            file,
            diagnostics: Diagnostics::new(writer),
        }
    }

    pub fn dummy(file: &'f AsciiFile<'f>) -> Self {
        Self::new(file, Box::new(dummy_writer()))
    }
}

// dummy_writer returns a WriteColor meant for use in tests and tools that
// want to discard diagnostic output.
pub fn dummy_writer() -> impl WriteColor {
    use termcolor::Buffer;
    Buffer::no_color()
}
