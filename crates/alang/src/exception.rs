//! Structured exceptions: the object shape thrown scripts see in `catch`,
//! plus the internal taxonomy used to label them before they reach script
//! level.

use std::fmt;

use strum::{Display, EnumString};

/// Internal classification of a thrown value, used to set the default
/// `type` field text and to support host-side `is_a` checks. Scripts never
/// see this enum directly — only its `Display` string, written into the
/// exception's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ExceptionKind {
    /// The base kind; every other kind is caught by a handler for `Error`.
    Error,
    NameError,
    TypeError,
    RangeError,
    ArityError,
    ImportError,
    PromiseRejection,
    /// Anything a script throws directly, already reified into the
    /// structured shape.
    UserException,
}

impl ExceptionKind {
    /// Whether a handler declared for `other` would catch `self`.
    /// `Error` is the universal base; every other kind matches only itself.
    #[must_use]
    pub fn is_a(self, other: Self) -> bool {
        self == other || other == ExceptionKind::Error
    }
}

/// A single captured call-stack frame, rendered as `"<name> at line N"`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-exceptions", derive(serde::Serialize, serde::Deserialize))]
pub struct StackFrame {
    pub name: String,
    pub line: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.name, self.line)
    }
}

/// The structured exception object observed at a `catch` boundary and at
/// the embedding API's top-level `execute` failure path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-exceptions", derive(serde::Serialize, serde::Deserialize))]
pub struct Exception {
    pub message: String,
    pub type_name: String,
    pub kind: ExceptionKind,
    pub stack: Vec<StackFrame>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub length: Option<u32>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            type_name: kind.to_string(),
            message,
            kind,
            stack: Vec::new(),
            line: None,
            column: None,
            length: None,
        }
    }

    pub fn with_span(mut self, line: u32, column: u32, length: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self.length = Some(length);
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Appends a frame to the captured stack trace. Frames are pushed as
    /// the exception unwinds, innermost first.
    pub fn push_frame(&mut self, name: impl Into<String>, line: u32) {
        self.stack.push(StackFrame { name: name.into(), line });
    }

    /// Appends the import-chain suffix described for file-import errors,
    /// e.g. `"a.alang -> b.alang -> c.alang"`.
    pub fn annotate_import_chain(&mut self, chain: &[String]) {
        if chain.is_empty() {
            return;
        }
        self.message = format!("{} ({})", self.message, chain.join(" -> "));
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)?;
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
            if let Some(column) = self.column {
                write!(f, ", column {column}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_catches_everything() {
        assert!(ExceptionKind::TypeError.is_a(ExceptionKind::Error));
        assert!(ExceptionKind::Error.is_a(ExceptionKind::Error));
        assert!(!ExceptionKind::TypeError.is_a(ExceptionKind::NameError));
    }

    #[test]
    fn default_type_name_matches_kind_display() {
        let exc = Exception::new(ExceptionKind::RangeError, "index out of range");
        assert_eq!(exc.type_name, "RangeError");
    }

    #[test]
    fn import_chain_annotation_appends_once() {
        let mut exc = Exception::new(ExceptionKind::ImportError, "symbol not found");
        exc.annotate_import_chain(&["a.alang".into(), "b.alang".into()]);
        assert!(exc.message.contains("a.alang -> b.alang"));
    }
}
