//! Lossless expression tree for Nix-style configuration source.
//!
//! This crate turns source text into an editable, typed expression tree and
//! reconstructs byte-identical source afterwards. Parsing is delegated to
//! the external [`rnix`] parser, whose lossless CST is walked into an arena
//! of ~20 expression kinds with all formatting captured as trivia and
//! verbatim payloads. Mutating a node invalidates payloads only along its
//! ancestor spine, so surgical edits never disturb sibling formatting.
//!
//! # Example
//!
//! ```
//! let source = rejig_tree::parse("{ foo = 1; # keep me\n}").unwrap();
//! assert_eq!(source.rebuild(), "{ foo = 1; # keep me\n}");
//! ```
//!
//! Parsing is a pure function of the input text: independent trees may be
//! built and edited concurrently, one tree must be serialized by its
//! caller.

pub mod builder;
pub mod escape;
pub mod node;
pub mod render;
pub mod trivia;


pub use builder::{build_fragment, parse, BuildError, Source};
pub use node::{
    Apply, Assert, AttrSet, AttrpathEntry, BinOp, Binding, Expr, HasAttr, IfElse, Inherit, Lambda,
    LetIn, List, Name, NameKind, Node, NodeId, Param, PatBind, PatEntry, Pattern,
    ResolutionContext, Select, SetItem, Tree, UnaryOp, With,
};
pub use render::{render_source, render_value, RenderOptions};
pub use trivia::Trivia;
