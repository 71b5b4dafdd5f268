use crate::{Span, Spanned};
use std::fmt;

/// An error (or any other payload) that may or may not carry a source
/// location. Lexical and syntactic problems usually point at a token; end of
/// file and whole-program conditions do not.
#[derive(Debug, Clone)]
pub enum MaybeSpanned<T> {
    WithoutSpan(T),
    WithSpan(Spanned<T>),
}

impl<T> MaybeSpanned<T> {
    pub fn data(&self) -> &T {
        match self {
            MaybeSpanned::WithoutSpan(data) => data,
            MaybeSpanned::WithSpan(spanned) => &spanned.data,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            MaybeSpanned::WithoutSpan(_) => None,
            MaybeSpanned::WithSpan(spanned) => Some(spanned.span),
        }
    }
}

impl<T> From<Spanned<T>> for MaybeSpanned<T> {
    fn from(spanned: Spanned<T>) -> Self {
        MaybeSpanned::WithSpan(spanned)
    }
}

impl<T> fmt::Display for MaybeSpanned<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeSpanned::WithoutSpan(data) => write!(f, "{}", data),
            MaybeSpanned::WithSpan(spanned) => write!(f, "{}", spanned),
        }
    }
}
