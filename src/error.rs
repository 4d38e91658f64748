//! Error taxonomy for the lexer, parser, renderer and compiler.
//!
//! Each stage gets its own small error type with a hand-written [`Display`]
//! impl, following the convention this crate uses for position-tagged
//! diagnostics rather than pulling in a derive-macro error crate.
use crate::position::Position;
use std::fmt::{self, Display, Formatter};

/// An error returned when a node-type or dialect registration is
/// self-inconsistent (e.g. a tag registered with a qualifier name that
/// collides with one of its own operators).
#[derive(Debug, Clone)]
pub struct ImplementationError {
    what: String,
    message: String,
}

impl ImplementationError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            message: message.into(),
        }
    }
}

impl Display for ImplementationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ImplementationError: {} - {}", self.what, self.message)
    }
}
impl std::error::Error for ImplementationError {}

/// The single lexer failure kind (spec.md §4.1): an unterminated construct,
/// optionally naming the tag or delimiter that was left open.
#[derive(Debug, Clone)]
pub struct LexError {
    pub position: Position,
    pub tag: Option<String>,
}

impl LexError {
    pub fn unexpected_end(position: Position, tag: Option<String>) -> Self {
        Self { position, tag }
    }
}

impl Display for LexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(
                f,
                "UNEXPECTED_END: unterminated '{}' at {}",
                tag, self.position
            ),
            None => write!(f, "UNEXPECTED_END: unexpected end of input at {}", self.position),
        }
    }
}
impl std::error::Error for LexError {}

/// The parser's error taxonomy (spec.md §4.2). Every variant carries up to
/// five short argument strings plus a source position, mirroring the
/// host-facing error format of spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedEnd,
    UnknownTag,
    UnknownOperator,
    UnknownOperatorOrQualifier,
    UnknownFilter,
    UnexpectedOperand,
    InvalidArguments,
    InvalidSymbol,
    InvalidQualifier,
    UnbalancedGroup,
    ParseDepthExceeded,
}

impl ParseErrorKind {
    fn label(&self) -> &'static str {
        match self {
            ParseErrorKind::UnexpectedEnd => "UNEXPECTED_END",
            ParseErrorKind::UnknownTag => "UNKNOWN_TAG",
            ParseErrorKind::UnknownOperator => "UNKNOWN_OPERATOR",
            ParseErrorKind::UnknownOperatorOrQualifier => "UNKNOWN_OPERATOR_OR_QUALIFIER",
            ParseErrorKind::UnknownFilter => "UNKNOWN_FILTER",
            ParseErrorKind::UnexpectedOperand => "UNEXPECTED_OPERAND",
            ParseErrorKind::InvalidArguments => "INVALID_ARGUMENTS",
            ParseErrorKind::InvalidSymbol => "INVALID_SYMBOL",
            ParseErrorKind::InvalidQualifier => "INVALID_QUALIFIER",
            ParseErrorKind::UnbalancedGroup => "UNBALANCED_GROUP",
            ParseErrorKind::ParseDepthExceeded => "PARSE_DEPTH_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
    pub file: Option<String>,
    pub arguments: Vec<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position, arguments: Vec<String>) -> Self {
        debug_assert!(arguments.len() <= 5, "parse errors carry at most 5 arguments");
        Self {
            kind,
            position,
            file: None,
            arguments,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.label())?;
        if !self.arguments.is_empty() {
            write!(f, "({})", self.arguments.join(", "))?;
        }
        if let Some(file) = &self.file {
            write!(f, " in {}", file)?;
        }
        write!(f, " at {}", self.position)
    }
}
impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(
            ParseErrorKind::UnexpectedEnd,
            err.position,
            err.tag.into_iter().collect(),
        )
    }
}

/// Renderer resource-limit and variable-resolution errors (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderErrorKind {
    ExceededMemory,
    ExceededTime,
    ExceededDepth,
    UnknownVariable,
    UnknownFilter,
}

#[derive(Debug, Clone)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            RenderErrorKind::ExceededMemory => "EXCEEDED_MEMORY",
            RenderErrorKind::ExceededTime => "EXCEEDED_TIME",
            RenderErrorKind::ExceededDepth => "EXCEEDED_DEPTH",
            RenderErrorKind::UnknownVariable => "UNKNOWN_VARIABLE",
            RenderErrorKind::UnknownFilter => "UNKNOWN_FILTER",
        };
        write!(f, "{}: {}", label, self.message)
    }
}
impl std::error::Error for RenderError {}

/// Errors raised while lowering an AST to bytecode (e.g. a `break`/`continue`
/// outside any loop, or a node type that declares no `compile` strategy).
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CompileError: {}", self.message)
    }
}
impl std::error::Error for CompileError {}

/// A warning collected during parsing or rendering that does not abort the
/// pass: an unknown filter/variable in non-strict mode, or similar
/// best-effort recovery (spec.md §7).
#[derive(Debug, Clone)]
pub struct Warning {
    pub position: Position,
    pub message: String,
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "warning at {}: {}", self.position, self.message)
    }
}
