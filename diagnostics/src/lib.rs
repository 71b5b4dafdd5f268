//! The diagnostics object controls the output of errors and warnings
//! generated by the compiler during the lexing, parsing, semantic analysis
//! and code generation phases. It also tracks the number of messages
//! generated for flow control.
//!
//! This implementation is NOT thread-safe.

use asciifile::{AsciiFile, Span};
use std::{cell::RefCell, collections::HashMap, fmt::Display, io::Write};
use termcolor::{Color, ColorSpec, WriteColor};

/// Instead of writing errors and warnings generated in the different compiler
/// stages directly to stderr, they are routed through this object.
///
/// This has several advantages:
/// - the output channel can be swapped by users (and captured by tests).
/// - there is a single place responsible for formatting compiler messages.
pub struct Diagnostics {
    message_count: RefCell<HashMap<MessageLevel, usize>>,
    writer: RefCell<Box<dyn WriteColor>>,
}

impl Diagnostics {
    pub fn new(writer: Box<dyn WriteColor>) -> Self {
        Self {
            writer: RefCell::new(writer),
            message_count: RefCell::new(HashMap::new()),
        }
    }

    /// True when an error message was emitted, false if only warnings were
    /// emitted.
    pub fn errored(&self) -> bool {
        self.message_count
            .borrow()
            .get(&MessageLevel::Error)
            .is_some()
    }

    pub fn count(&self, level: MessageLevel) -> usize {
        self.message_count
            .borrow()
            .get(&level)
            .cloned()
            .unwrap_or(0)
    }

    pub fn write_statistics(&self) {
        let mut writer = self.writer.borrow_mut();
        let mut output = ColorOutput::new(&mut **writer);

        output.set_bold(true);

        if self.errored() {
            output.set_color(MessageLevel::Error.color());
            let _ = writeln!(
                output.writer(),
                "Compilation aborted due to {}",
                match self.count(MessageLevel::Error) {
                    1 => "an error".to_string(),
                    n => format!("{} errors", n),
                }
            );
        } else {
            output.set_color(Some(Color::Green));
            let _ = writeln!(
                output.writer(),
                "Compilation finished successfully {}",
                match self.count(MessageLevel::Warning) {
                    0 => "without warnings".to_string(),
                    1 => "with a warning".to_string(),
                    n => format!("with {} warnings", n),
                }
            );
        }
    }

    /// Generate an error or a warning that is printed to the writer given in
    /// the `new` constructor. Most of the time this will be stderr.
    pub fn emit(&self, level: MessageLevel, message: &dyn Display, location: Option<Span>) {
        {
            let mut writer = self.writer.borrow_mut();
            let mut output = ColorOutput::new(&mut **writer);

            output.set_color(level.color());
            output.set_bold(true);
            let _ = write!(output.writer(), "{}: ", level.name());

            output.set_color(None);
            output.set_bold(false);
            match location {
                Some(span) => {
                    let _ = writeln!(output.writer(), "{} at {}", message, span);
                }
                None => {
                    let _ = writeln!(output.writer(), "{}", message);
                }
            }
        }
        self.increment_level_count(level);
    }

    pub fn error(&self, message: &dyn Display, location: Option<Span>) {
        self.emit(MessageLevel::Error, message, location)
    }

    pub fn warning(&self, message: &dyn Display, location: Option<Span>) {
        self.emit(MessageLevel::Warning, message, location)
    }

    /// Like [`Diagnostics::emit`], but followed by the source line the span
    /// points at, with a marker underneath the offending range.
    pub fn emit_with_source_snippet(
        &self,
        level: MessageLevel,
        message: &dyn Display,
        span: Span,
        file: &AsciiFile<'_>,
    ) {
        self.emit(level, message, Some(span));

        let line = match file.line(span.start.row) {
            Some(line) => line,
            None => return,
        };

        let mut writer = self.writer.borrow_mut();
        let mut output = ColorOutput::new(&mut **writer);

        let line_number = span.start.line_number().to_string();
        let gutter_width = line_number.len();

        output.set_color(HIGHLIGHT);
        output.set_bold(true);
        let _ = write!(output.writer(), " {} | ", line_number);
        output.set_color(None);
        output.set_bold(false);
        let _ = writeln!(output.writer(), "{}", line.replace('\t', " "));

        let marker_len = if span.is_multiline() {
            line.len().saturating_sub(span.start.col as usize).max(1)
        } else {
            (span.end.col - span.start.col + 1) as usize
        };

        output.set_color(level.color());
        output.set_bold(true);
        let _ = writeln!(
            output.writer(),
            " {} | {}{}",
            " ".repeat(gutter_width),
            " ".repeat(span.start.col as usize),
            "^".repeat(marker_len)
        );
    }

    fn increment_level_count(&self, level: MessageLevel) {
        let mut message_count = self.message_count.borrow_mut();
        let counter = message_count.entry(level).or_insert(0);
        *counter += 1;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageLevel {
    Error,
    Warning,
}

impl MessageLevel {
    fn color(self) -> Option<Color> {
        // Don't be confused by the return type. `None` means default color!
        match self {
            MessageLevel::Error => Some(Color::Red),
            MessageLevel::Warning => Some(Color::Yellow),
        }
    }

    fn name(self) -> &'static str {
        match self {
            MessageLevel::Error => "error",
            MessageLevel::Warning => "warning",
        }
    }
}

const HIGHLIGHT: Option<Color> = Some(Color::Cyan);

/// Scoped wrapper around a [`WriteColor`]. Callers should pass the raw
/// writer; each function creates its own `ColorOutput` that is dropped on
/// return, which guarantees correct coloring in nested calls.
struct ColorOutput<'a> {
    writer: &'a mut dyn WriteColor,
    spec: ColorSpec,
}

impl<'a> ColorOutput<'a> {
    fn new(writer: &'a mut dyn WriteColor) -> Self {
        writer.reset().ok();

        Self {
            writer,
            spec: ColorSpec::new(),
        }
    }

    fn set_color(&mut self, color: Option<Color>) {
        // ignore coloring failures using ok()
        self.spec.set_fg(color);
        self.writer.set_color(&self.spec).ok();
    }

    fn set_bold(&mut self, yes: bool) {
        self.spec.set_bold(yes);
        self.writer.set_color(&self.spec).ok();
    }

    fn writer(&mut self) -> &mut dyn WriteColor {
        self.writer
    }
}

/// Reset to no color on drop. Otherwise code that is not color aware would
/// print everything in the color last used.
impl Drop for ColorOutput<'_> {
    fn drop(&mut self) {
        self.writer.reset().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asciifile::Position;
    use termcolor::Buffer;

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(Box::new(Buffer::no_color()))
    }

    #[test]
    fn counts_messages_per_level() {
        let diagnostics = diagnostics();
        assert!(!diagnostics.errored());

        diagnostics.warning(&"something looks off", None);
        assert!(!diagnostics.errored());
        assert_eq!(diagnostics.count(MessageLevel::Warning), 1);

        diagnostics.error(&"something is broken", None);
        diagnostics.error(&"something else is broken", None);
        assert!(diagnostics.errored());
        assert_eq!(diagnostics.count(MessageLevel::Error), 2);
    }

    #[test]
    fn snippet_rendering_does_not_panic_at_file_end() {
        let file = AsciiFile::new(b"class A {}").unwrap();
        let diagnostics = diagnostics();
        let span = Span::new(Position::new(7, 0), Position::new(7, 3));
        diagnostics.emit_with_source_snippet(MessageLevel::Error, &"boom", span, &file);
        assert!(diagnostics.errored());
    }
}
