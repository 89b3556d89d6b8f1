//! The structured text stream.
//!
//! Printer output is an ordered sequence of `(text, semantic type)` chunks.
//! Adjacent chunks of the same semantic type are coalesced as they are
//! pushed, so consumers see the minimal chunk sequence.

use std::fmt;

use crate::types::TypeInfoKind;

/// Semantic classification of an output chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType
{
    /// Plain structure: punctuation, whitespace, comments.
    Standard,
    /// A declaration keyword (`struct`, `func`, `extension`, ...).
    Keyword,
    /// A function name at its declaration.
    FunctionDeclaration,
    /// A variable or field name at its declaration.
    Variable,
    /// A type name. `kind` is the nominal kind when known; `name` carries
    /// the canonical type name when this chunk names a specific type.
    Type
    {
        kind: Option<TypeInfoKind>,
        name: Option<String>,
    },
    /// A module name.
    Module,
    /// Anything else.
    Other,
}

/// One coalesced run of output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk
{
    pub text: String,
    pub semantic: SemanticType,
}

/// An append-only chunk stream with same-type coalescing.
#[derive(Debug, Clone, Default)]
pub struct InterfaceText
{
    chunks: Vec<Chunk>,
}

impl InterfaceText
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append text with a semantic type, merging into the previous chunk
    /// when the types are equal.
    pub fn push(&mut self, text: impl AsRef<str>, semantic: SemanticType)
    {
        let text = text.as_ref();
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.chunks.last_mut() {
            if last.semantic == semantic {
                last.text.push_str(text);
                return;
            }
        }
        self.chunks.push(Chunk {
            text: text.to_string(),
            semantic,
        });
    }

    /// Append plain structural text.
    pub fn standard(&mut self, text: impl AsRef<str>)
    {
        self.push(text, SemanticType::Standard);
    }

    /// Append a keyword followed by a space.
    pub fn keyword(&mut self, word: &str)
    {
        self.push(word, SemanticType::Keyword);
        self.standard(" ");
    }

    /// The coalesced chunks.
    pub fn chunks(&self) -> &[Chunk]
    {
        &self.chunks
    }

    /// Concatenated plain text of the whole stream.
    pub fn plain(&self) -> String
    {
        self.chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }
}

impl fmt::Display for InterfaceText
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.plain())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn adjacent_same_type_chunks_coalesce()
    {
        let mut text = InterfaceText::new();
        text.standard("a");
        text.standard("b");
        text.push("c", SemanticType::Keyword);
        text.standard("d");
        assert_eq!(text.chunks().len(), 3);
        assert_eq!(text.chunks()[0].text, "ab");
        assert_eq!(text.plain(), "abcd");
    }

    #[test]
    fn empty_pushes_are_ignored()
    {
        let mut text = InterfaceText::new();
        text.standard("");
        assert!(text.chunks().is_empty());
    }
}
