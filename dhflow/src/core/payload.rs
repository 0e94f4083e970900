//! Opaque data carried between stages.

use crate::document::Element;
use crate::errors::MergeError;
use serde::{Deserialize, Serialize};

/// The data produced or consumed by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Payload {
    /// No data.
    #[default]
    Empty,
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A string.
    Text(String),
    /// A parsed document.
    Document(Element),
}

impl Payload {
    /// Returns true if there is no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(b) => b.is_empty(),
            Self::Text(t) => t.is_empty(),
            Self::Document(_) => false,
        }
    }

    /// Returns the parsed document, if this payload is one.
    #[must_use]
    pub fn as_document(&self) -> Option<&Element> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Interprets the payload as a document, parsing text or bytes.
    pub fn to_document(&self) -> Result<Element, MergeError> {
        match self {
            Self::Document(doc) => Ok(doc.clone()),
            Self::Text(text) => Element::parse(text),
            Self::Bytes(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| MergeError::Parse(format!("payload is not UTF-8: {e}")))?;
                Element::parse(text)
            }
            Self::Empty => Err(MergeError::Parse("payload is empty".to_string())),
        }
    }

    /// Parses text or bytes into a document when possible.
    ///
    /// Anything that does not parse is returned as raw bytes.
    #[must_use]
    pub fn into_document_or_bytes(self) -> Self {
        match self {
            Self::Text(text) => match Element::parse(&text) {
                Ok(doc) => Self::Document(doc),
                Err(_) => Self::Bytes(text.into_bytes()),
            },
            Self::Bytes(bytes) => match std::str::from_utf8(&bytes).map(Element::parse) {
                Ok(Ok(doc)) => Self::Document(doc),
                _ => Self::Bytes(bytes),
            },
            other => other,
        }
    }

    /// Short label for the payload variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Document(_) => "document",
        }
    }
}

impl From<Element> for Payload {
    fn from(doc: Element) -> Self {
        Self::Document(doc)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emptiness() {
        assert!(Payload::Empty.is_empty());
        assert!(Payload::Text(String::new()).is_empty());
        assert!(!Payload::from("x").is_empty());
        assert!(!Payload::from(Element::new("r")).is_empty());
    }

    #[test]
    fn test_to_document_parses_text_and_bytes() {
        let from_text = Payload::from("<a><b/></a>").to_document().unwrap();
        let from_bytes = Payload::from(b"<a><b/></a>".to_vec()).to_document().unwrap();
        assert_eq!(from_text, from_bytes);
        assert!(Payload::Empty.to_document().is_err());
        assert!(Payload::from(vec![0xff, 0xfe]).to_document().is_err());
    }

    #[test]
    fn test_best_effort_document() {
        let parsed = Payload::from(b"<rows><row/></rows>".to_vec()).into_document_or_bytes();
        assert_eq!(parsed.kind(), "document");

        let raw = Payload::from("id;name\n1;x").into_document_or_bytes();
        assert_eq!(raw, Payload::Bytes(b"id;name\n1;x".to_vec()));
    }
}
