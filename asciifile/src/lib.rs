//! Represents an input file that may only contain ASCII characters. The
//! abstractions `Position` and `Span` are type-safe wrappers around a
//! character position, respectively a range of characters, within that file.

pub mod file;
pub mod maybe_spanned;
pub mod position;
pub mod span;
pub mod spanned;

pub use self::{
    file::AsciiFile, maybe_spanned::MaybeSpanned, position::Position, span::Span, spanned::Spanned,
};
