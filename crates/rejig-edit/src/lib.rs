//! Path-addressed structural edits for Nix expression trees.
//!
//! The top-level API surface over [`rejig_tree`]: parse a file, address a
//! binding with a dotted NPath (`services.nginx.enable`, quoted segments
//! for names with dots, leading `@` for `let`/`with` scope layers), then
//! [`set`] or [`remove`] it. Everything the edit does not touch re-emits
//! byte-for-byte.
//!
//! # Example
//!
//! ```
//! let mut source = rejig_edit::parse("{ foo = 1; }").unwrap();
//! let text = rejig_edit::set(&mut source, "bar", "2").unwrap();
//! assert_eq!(text, "{ foo = 1; bar = 2; }");
//! ```

pub mod edit;
pub mod npath;
pub mod scope;

pub use edit::{get, remove, set};
pub use npath::{NPath, Segment};
pub use scope::{resolve, resolve_with_context, scope_chain, Resolved, ScopeLayer};

// The parse entry point and tree types come from the tree crate; re-export
// the surface callers need.
pub use rejig_tree::{parse, BuildError, Expr, NodeId, RenderOptions, Source, Tree};

/// Error from scope resolution or a structural edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The tree contains parser errors, or a value fragment failed to
    /// parse.
    Syntax(String),
    /// An identifier did not resolve in its scope chain.
    UnboundIdentifier(String),
    /// Identifier resolution re-entered a definition it was already
    /// resolving.
    ReferenceCycle(String),
    /// The source does not unwrap to a single attribute set.
    AmbiguousEditTarget,
    /// A path segment traversed something other than an attribute set.
    NotAnAttributeSet(String),
    /// Attrpath and plain bindings of the same name collided.
    MixedAttrpathBinding(String),
    /// No binding exists at the addressed path.
    MissingKey(String),
    /// A lambda formal had neither a matching argument field nor a
    /// default.
    MissingParameter(String),
    /// The NPath text is not well-formed.
    InvalidNPath(String),
    /// A resolution context outlived a reparenting of its tree.
    StaleContext,
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::Syntax(msg) => write!(f, "syntax error: {}", msg),
            EditError::UnboundIdentifier(name) => {
                write!(f, "unbound identifier `{}`", name)
            }
            EditError::ReferenceCycle(name) => {
                write!(f, "reference cycle while resolving `{}`", name)
            }
            EditError::AmbiguousEditTarget => {
                write!(f, "no single attribute set to edit")
            }
            EditError::NotAnAttributeSet(what) => {
                write!(f, "`{}` is not an attribute set", what)
            }
            EditError::MixedAttrpathBinding(name) => {
                write!(f, "attrpath binding collides with binding of `{}`", name)
            }
            EditError::MissingKey(path) => write!(f, "no binding at `{}`", path),
            EditError::MissingParameter(name) => {
                write!(f, "missing parameter `{}`", name)
            }
            EditError::InvalidNPath(msg) => write!(f, "invalid path: {}", msg),
            EditError::StaleContext => write!(f, "resolution context is stale"),
        }
    }
}

impl std::error::Error for EditError {}

impl From<BuildError> for EditError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Syntax(msg) => EditError::Syntax(msg),
            BuildError::MixedAttrpathBinding(name) => EditError::MixedAttrpathBinding(name),
            BuildError::UnsupportedNodeKind(kind) => {
                EditError::Syntax(format!("unsupported node kind: {}", kind))
            }
            BuildError::MalformedNode(msg) => {
                EditError::Syntax(format!("malformed node: {}", msg))
            }
        }
    }
}
