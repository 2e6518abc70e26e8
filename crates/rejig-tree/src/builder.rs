//! CST to expression tree builder.
//!
//! Walks the lossless CST produced by the external parser ([`rnix`]) and
//! builds the typed tree, one routine per node kind. Along the way it
//! classifies the token gaps into trivia, captures verbatim payloads and
//! member indentation for the rebuild engine, and merges dotted attrpath
//! bindings (`a.b.c = v;`) into synthetic nested sets.

use rnix::{Root, SyntaxKind, SyntaxNode};

use crate::node::{
    Apply, Assert, AttrSet, AttrpathEntry, BinOp, Binding, Expr, HasAttr, IfElse, Inherit, Lambda,
    LetIn, List, Name, NameKind, NodeId, Param, PatBind, PatEntry, Pattern, Select, SetItem, Tree,
    UnaryOp, With,
};
use crate::render::{self, RenderOptions};
use crate::trivia::{self, Trivia};
use crate::escape;

/// Error during tree building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A value fragment failed to parse.
    Syntax(String),
    /// The CST contained a node kind the tree does not recognize.
    UnsupportedNodeKind(String),
    /// A required child was absent.
    MalformedNode(String),
    /// Attrpath bindings collided with a plain binding of the same name,
    /// or the identical leaf path was defined twice.
    MixedAttrpathBinding(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Syntax(msg) => write!(f, "syntax error: {}", msg),
            BuildError::UnsupportedNodeKind(kind) => {
                write!(f, "unsupported node kind: {}", kind)
            }
            BuildError::MalformedNode(msg) => write!(f, "malformed node: {}", msg),
            BuildError::MixedAttrpathBinding(name) => {
                write!(f, "attrpath binding collides with binding of `{}`", name)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// A parsed source file: the expression tree plus everything needed to
/// reconstruct the original text.
#[derive(Debug, Clone)]
pub struct Source {
    tree: Tree,
    root: NodeId,
    text: String,
    errors: Vec<String>,
    contains_error: bool,
    edited: bool,
}

impl Source {
    /// The root expression node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Original source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the parser reported errors; edits must refuse such trees,
    /// rebuilds still reproduce the input.
    pub fn contains_error(&self) -> bool {
        self.contains_error
    }

    /// Parser diagnostics, in source order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Replace the root expression (used when unwrapping emptied `let`
    /// wrappers).
    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
        self.edited = true;
    }

    /// Record that the tree has been structurally modified.
    pub fn mark_edited(&mut self) {
        self.edited = true;
    }

    /// Reconstruct source text. An untouched tree re-emits the original
    /// bytes; an edited tree re-renders the dirty spine and re-emits every
    /// untouched node verbatim.
    pub fn rebuild(&self) -> String {
        if !self.edited {
            return self.text.clone();
        }
        render::render_source(self, &RenderOptions::default())
    }

    /// Parse `text` and verify it reconstructs exactly. Fails for input the
    /// parser rejects, even though error trees still rebuild verbatim.
    pub fn round_trip_check(text: &str) -> bool {
        match parse(text) {
            Ok(source) => !source.contains_error() && source.rebuild() == text,
            Err(_) => false,
        }
    }
}

/// Parse source text into a [`Source`].
///
/// Parser-reported error subtrees are preserved verbatim as raw nodes and
/// flagged on the source; they round-trip but refuse edits.
pub fn parse(text: &str) -> Result<Source, BuildError> {
    let parsed = Root::parse(text);
    let errors: Vec<String> = parsed.errors().iter().map(|e| e.to_string()).collect();

    let mut tree = Tree::new();
    let mut builder = Builder {
        tree: &mut tree,
        src: text,
        saw_error: false,
    };
    let root = builder.build_root(&parsed.syntax())?;
    let saw_error = builder.saw_error;
    let contains_error = !errors.is_empty() || saw_error;

    tracing::debug!(
        nodes = tree.len(),
        errors = errors.len(),
        "built expression tree"
    );

    Ok(Source {
        tree,
        root,
        text: text.to_string(),
        errors,
        contains_error,
        edited: false,
    })
}

/// Parse a value fragment into an existing tree, for insertion by the edit
/// engine. Unlike [`parse`], any syntax error is a hard failure.
pub fn build_fragment(tree: &mut Tree, text: &str) -> Result<NodeId, BuildError> {
    let parsed = Root::parse(text);
    if let Some(err) = parsed.errors().first() {
        return Err(BuildError::Syntax(err.to_string()));
    }

    let mut builder = Builder {
        tree,
        src: text,
        saw_error: false,
    };
    let id = builder.build_root(&parsed.syntax())?;
    if builder.saw_error {
        return Err(BuildError::Syntax("fragment contains an error node".into()));
    }
    // Fragments splice into host trees; their surrounding layout comes from
    // the insertion point, not from the fragment text.
    tree.clear_trivia(id);
    Ok(id)
}

/// A child node surrounded by its classified gap trivia.
struct RawChild {
    syntax: SyntaxNode,
    before: Vec<Trivia>,
    after: Vec<Trivia>,
    start: usize,
}

/// Significant (non-trivia) tokens seen while walking a node, with offsets.
struct WalkedTokens {
    kinds: Vec<(SyntaxKind, usize, String)>,
}

impl WalkedTokens {
    fn has(&self, kind: SyntaxKind) -> bool {
        self.kinds.iter().any(|(k, _, _)| *k == kind)
    }

    fn offset_of(&self, kind: SyntaxKind) -> Option<usize> {
        self.kinds
            .iter()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, off, _)| *off)
    }

    /// Text of the first operator-looking token (for unary and binary ops,
    /// the only significant token is the operator itself).
    fn first_text(&self) -> Option<&str> {
        self.kinds.first().map(|(_, _, text)| text.as_str())
    }
}

struct Builder<'a> {
    tree: &'a mut Tree,
    src: &'a str,
    saw_error: bool,
}

impl Builder<'_> {
    fn build_root(&mut self, root: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, trailing, _) = self.walk(root);

        let id = match children.len() {
            1 => self.build_child(&children[0])?,
            _ => {
                // Empty, multi-expression or unparseable input still
                // round-trips as a raw node.
                self.saw_error = true;
                let id = self.tree.alloc(Expr::Raw(self.text_of(root)));
                self.tree.set_raw(id, self.text_of(root));
                return Ok(id);
            }
        };
        // File-trailing trivia (including the final newline) lives on the
        // root node.
        self.tree.push_after(id, trailing);
        Ok(id)
    }

    /// Build one gap-walked child and attach its trivia.
    fn build_child(&mut self, child: &RawChild) -> Result<NodeId, BuildError> {
        let id = self.build_expr(&child.syntax)?;
        self.tree.push_before(id, child.before.clone());
        self.tree.push_after(id, child.after.clone());
        Ok(id)
    }

    fn build_expr(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let id = match node.kind() {
            SyntaxKind::NODE_ATTR_SET => self.build_attr_set(node)?,
            SyntaxKind::NODE_LET_IN => self.build_let_in(node)?,
            SyntaxKind::NODE_LIST => self.build_list(node)?,
            SyntaxKind::NODE_LAMBDA => self.build_lambda(node)?,
            SyntaxKind::NODE_APPLY => self.build_apply(node)?,
            SyntaxKind::NODE_IDENT => self.build_ident(node),
            SyntaxKind::NODE_SELECT => self.build_select(node)?,
            SyntaxKind::NODE_WITH => self.build_with(node)?,
            SyntaxKind::NODE_ASSERT => self.build_assert(node)?,
            SyntaxKind::NODE_IF_ELSE => self.build_if_else(node)?,
            SyntaxKind::NODE_HAS_ATTR => self.build_has_attr(node)?,
            SyntaxKind::NODE_UNARY_OP => self.build_unary_op(node)?,
            SyntaxKind::NODE_BIN_OP => self.build_bin_op(node)?,
            SyntaxKind::NODE_STRING => self.build_string(node),
            SyntaxKind::NODE_LITERAL => self.build_literal(node),
            SyntaxKind::NODE_PATH => self.tree.alloc(Expr::Path(self.text_of(node))),
            SyntaxKind::NODE_PAREN => self.build_paren(node)?,
            SyntaxKind::NODE_INHERIT => self.build_inherit(node)?,
            SyntaxKind::NODE_ERROR => {
                self.saw_error = true;
                self.tree.alloc(Expr::Raw(self.text_of(node)))
            }
            // Legacy `let { ... }` and bare dynamic attributes round-trip
            // verbatim but are not modeled.
            SyntaxKind::NODE_LEGACY_LET | SyntaxKind::NODE_DYNAMIC => {
                self.tree.alloc(Expr::Raw(self.text_of(node)))
            }
            other => {
                return Err(BuildError::UnsupportedNodeKind(format!("{:?}", other)));
            }
        };
        self.tree.set_raw(id, self.text_of(node));
        Ok(id)
    }

    // ---- leaves ----------------------------------------------------------

    fn build_ident(&mut self, node: &SyntaxNode) -> NodeId {
        let text = self.text_of(node);
        let expr = match text.as_str() {
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "null" => Expr::Null,
            _ => Expr::Ident(text),
        };
        self.tree.alloc(expr)
    }

    fn build_string(&mut self, node: &SyntaxNode) -> NodeId {
        let text = self.text_of(node);
        if text.starts_with("''") {
            self.tree.alloc(Expr::IndentedStr(text))
        } else {
            self.tree.alloc(Expr::Str(text))
        }
    }

    fn build_literal(&mut self, node: &SyntaxNode) -> NodeId {
        let text = self.text_of(node);
        let token_kind = node
            .children_with_tokens()
            .filter_map(|el| el.into_token())
            .map(|t| t.kind())
            .next();
        let expr = match token_kind {
            Some(SyntaxKind::TOKEN_INTEGER) => Expr::Int(text),
            Some(SyntaxKind::TOKEN_FLOAT) => Expr::Float(text),
            Some(SyntaxKind::TOKEN_URI) | Some(SyntaxKind::TOKEN_PATH) => Expr::Path(text),
            _ => Expr::Raw(text),
        };
        self.tree.alloc(expr)
    }

    // ---- compound expressions -------------------------------------------

    fn build_attr_set(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, trailing, tokens) = self.walk(node);
        let text = self.text_of(node);
        let member_indent = children.first().and_then(|c| self.line_indent_at(c.start));
        let close_indent = self.close_delim_indent(node);

        let set_id = self.tree.alloc(Expr::AttrSet(AttrSet {
            recursive: tokens.has(SyntaxKind::TOKEN_REC),
            multiline: text.contains('\n'),
            synthetic: false,
            members: Vec::new(),
            attrpath_order: Vec::new(),
            layout: Vec::new(),
            member_indent,
            close_indent,
        }));

        for child in &children {
            self.build_member(set_id, set_id, child)?;
        }
        self.attach_trailing_to_last_member(set_id, trailing);
        Ok(set_id)
    }

    fn build_let_in(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, trailing, tokens) = self.walk(node);
        let in_offset = tokens
            .offset_of(SyntaxKind::TOKEN_IN)
            .ok_or_else(|| BuildError::MalformedNode("let without `in`".into()))?;

        let scope_multiline = children
            .iter()
            .take_while(|c| c.start < in_offset)
            .any(|c| c.before.iter().any(Trivia::is_vertical));
        let member_indent = children
            .iter()
            .find(|c| c.start < in_offset)
            .and_then(|c| self.line_indent_at(c.start));
        let scope_id = self.tree.alloc(Expr::AttrSet(AttrSet {
            multiline: scope_multiline,
            member_indent,
            ..AttrSet::synthetic()
        }));

        let mut body = None;
        for child in &children {
            if child.start < in_offset {
                self.build_member(scope_id, scope_id, child)?;
            } else if body.is_none() {
                body = Some(self.build_child(child)?);
            } else {
                return Err(BuildError::MalformedNode("let with two bodies".into()));
            }
        }
        let body = body.ok_or_else(|| BuildError::MalformedNode("let without body".into()))?;
        self.tree.push_after(body, strip_trailing_vertical(trailing));

        let let_id = self.tree.alloc(Expr::LetIn(LetIn {
            scope: scope_id,
            body,
        }));
        self.tree.set_parent_quiet(scope_id, Some(let_id));
        self.tree.set_parent_quiet(body, Some(let_id));
        Ok(let_id)
    }

    fn build_list(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, trailing, _) = self.walk(node);
        let text = self.text_of(node);

        let member_indent = children.first().and_then(|c| self.line_indent_at(c.start));
        let close_indent = self.close_delim_indent(node);
        let mut items = Vec::with_capacity(children.len());
        for child in &children {
            items.push(self.build_child(child)?);
        }

        let list_id = self.tree.alloc(Expr::List(List {
            items: items.clone(),
            multiline: text.contains('\n'),
            member_indent,
            close_indent,
        }));
        for item in &items {
            self.tree.set_parent_quiet(*item, Some(list_id));
        }

        let trailing = strip_trailing_vertical(trailing);
        if let Some(last) = items.last() {
            self.tree.push_after(*last, trailing);
        }
        Ok(list_id)
    }

    fn build_lambda(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let [param_child, body_child] = children.as_slice() else {
            return Err(BuildError::MalformedNode(
                "lambda without parameter and body".into(),
            ));
        };

        let param = match param_child.syntax.kind() {
            SyntaxKind::NODE_IDENT_PARAM | SyntaxKind::NODE_IDENT => {
                Param::Ident(self.text_of(&param_child.syntax).trim().to_string())
            }
            SyntaxKind::NODE_PATTERN => Param::Pattern(self.build_pattern(&param_child.syntax)?),
            other => {
                return Err(BuildError::UnsupportedNodeKind(format!("{:?}", other)));
            }
        };
        let defaults: Vec<NodeId> = match &param {
            Param::Pattern(pat) => pat.entries.iter().filter_map(|e| e.default).collect(),
            Param::Ident(_) => Vec::new(),
        };

        let body = self.build_child(body_child)?;
        let lambda_id = self.tree.alloc(Expr::Lambda(Lambda { param, body }));
        self.tree.set_parent_quiet(body, Some(lambda_id));
        for default in defaults {
            self.tree.set_parent_quiet(default, Some(lambda_id));
        }
        Ok(lambda_id)
    }

    fn build_pattern(&mut self, node: &SyntaxNode) -> Result<Pattern, BuildError> {
        let mut entries = Vec::new();
        let mut bind = None;
        let mut ellipsis = false;

        for el in node.children_with_tokens() {
            if el
                .as_token()
                .is_some_and(|t| t.kind() == SyntaxKind::TOKEN_ELLIPSIS)
            {
                ellipsis = true;
                continue;
            }
            let Some(n) = el.as_node() else { continue };
            match n.kind() {
                SyntaxKind::NODE_PAT_ENTRY => {
                    let mut parts = n.children();
                    let name_node = parts.next().ok_or_else(|| {
                        BuildError::MalformedNode("pattern entry without name".into())
                    })?;
                    let default = match parts.next() {
                        Some(d) => Some(self.build_expr(&d)?),
                        None => None,
                    };
                    entries.push(PatEntry {
                        name: self.text_of(&name_node),
                        default,
                    });
                }
                SyntaxKind::NODE_PAT_BIND => {
                    let name_node = n.children().next().ok_or_else(|| {
                        BuildError::MalformedNode("pattern bind without name".into())
                    })?;
                    bind = Some(PatBind {
                        name: self.text_of(&name_node),
                        at_start: entries.is_empty(),
                    });
                }
                _ => {}
            }
        }

        Ok(Pattern {
            entries,
            ellipsis,
            bind,
        })
    }

    fn build_apply(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let [function_child, argument_child] = children.as_slice() else {
            return Err(BuildError::MalformedNode(
                "apply without function and argument".into(),
            ));
        };
        let function = self.build_child(function_child)?;
        let argument = self.build_child(argument_child)?;

        let id = self.tree.alloc(Expr::Apply(Apply { function, argument }));
        self.tree.set_parent_quiet(function, Some(id));
        self.tree.set_parent_quiet(argument, Some(id));
        Ok(id)
    }

    fn build_select(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let base_child = children
            .first()
            .ok_or_else(|| BuildError::MalformedNode("select without base".into()))?;
        let path_child = children
            .get(1)
            .filter(|c| c.syntax.kind() == SyntaxKind::NODE_ATTRPATH)
            .ok_or_else(|| BuildError::MalformedNode("select without attrpath".into()))?;
        let default_child = children.get(2);

        let base = self.build_child(base_child)?;
        let default = match default_child {
            Some(d) => Some(self.build_child(d)?),
            None => None,
        };

        let id = self.tree.alloc(Expr::Select(Select {
            base,
            path: self.text_of(&path_child.syntax),
            default,
        }));
        self.tree.set_parent_quiet(base, Some(id));
        if let Some(d) = default {
            self.tree.set_parent_quiet(d, Some(id));
        }
        Ok(id)
    }

    fn build_has_attr(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let base_child = children
            .first()
            .ok_or_else(|| BuildError::MalformedNode("has-attr without base".into()))?;
        let path_child = children
            .get(1)
            .ok_or_else(|| BuildError::MalformedNode("has-attr without attrpath".into()))?;

        let base = self.build_child(base_child)?;
        let id = self.tree.alloc(Expr::HasAttr(HasAttr {
            base,
            path: self.text_of(&path_child.syntax),
        }));
        self.tree.set_parent_quiet(base, Some(id));
        Ok(id)
    }

    fn build_with(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let [env_child, body_child] = children.as_slice() else {
            return Err(BuildError::MalformedNode(
                "with without environment and body".into(),
            ));
        };
        let env = self.build_child(env_child)?;
        let body = self.build_child(body_child)?;

        let id = self.tree.alloc(Expr::With(With { env, body }));
        self.tree.set_parent_quiet(env, Some(id));
        self.tree.set_parent_quiet(body, Some(id));
        Ok(id)
    }

    fn build_assert(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let [condition_child, body_child] = children.as_slice() else {
            return Err(BuildError::MalformedNode(
                "assert without condition and body".into(),
            ));
        };
        let condition = self.build_child(condition_child)?;
        let body = self.build_child(body_child)?;

        let id = self.tree.alloc(Expr::Assert(Assert { condition, body }));
        self.tree.set_parent_quiet(condition, Some(id));
        self.tree.set_parent_quiet(body, Some(id));
        Ok(id)
    }

    fn build_if_else(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let [c, t, a] = children.as_slice() else {
            return Err(BuildError::MalformedNode("if without three branches".into()));
        };
        let condition = self.build_child(c)?;
        let consequent = self.build_child(t)?;
        let alternative = self.build_child(a)?;

        let id = self.tree.alloc(Expr::IfElse(IfElse {
            condition,
            consequent,
            alternative,
        }));
        self.tree.set_parent_quiet(condition, Some(id));
        self.tree.set_parent_quiet(consequent, Some(id));
        self.tree.set_parent_quiet(alternative, Some(id));
        Ok(id)
    }

    fn build_unary_op(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, tokens) = self.walk(node);
        let op = tokens
            .first_text()
            .ok_or_else(|| BuildError::MalformedNode("unary op without operator".into()))?
            .to_string();
        let operand_child = children
            .first()
            .ok_or_else(|| BuildError::MalformedNode("unary op without operand".into()))?;
        let operand = self.build_child(operand_child)?;

        let id = self.tree.alloc(Expr::UnaryOp(UnaryOp { op, operand }));
        self.tree.set_parent_quiet(operand, Some(id));
        Ok(id)
    }

    fn build_bin_op(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, tokens) = self.walk(node);
        let op = tokens
            .first_text()
            .ok_or_else(|| BuildError::MalformedNode("binary op without operator".into()))?
            .to_string();
        let [lhs_child, rhs_child] = children.as_slice() else {
            return Err(BuildError::MalformedNode(
                "binary op without two operands".into(),
            ));
        };
        let lhs = self.build_child(lhs_child)?;
        let rhs = self.build_child(rhs_child)?;

        let id = self.tree.alloc(Expr::BinOp(BinOp { lhs, op, rhs }));
        self.tree.set_parent_quiet(lhs, Some(id));
        self.tree.set_parent_quiet(rhs, Some(id));
        Ok(id)
    }

    fn build_paren(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let inner_child = children
            .first()
            .ok_or_else(|| BuildError::MalformedNode("empty parenthesis".into()))?;
        let inner = self.build_child(inner_child)?;
        let id = self.tree.alloc(Expr::Paren(inner));
        self.tree.set_parent_quiet(inner, Some(id));
        Ok(id)
    }

    fn build_inherit(&mut self, node: &SyntaxNode) -> Result<NodeId, BuildError> {
        let (children, _, _) = self.walk(node);
        let mut from = None;
        let mut names = Vec::new();

        for child in &children {
            match child.syntax.kind() {
                SyntaxKind::NODE_INHERIT_FROM => {
                    let inner = child.syntax.children().next().ok_or_else(|| {
                        BuildError::MalformedNode("inherit source without expression".into())
                    })?;
                    from = Some(self.build_expr(&inner)?);
                }
                SyntaxKind::NODE_IDENT | SyntaxKind::NODE_STRING => {
                    let text = self.text_of(&child.syntax);
                    let name_id = if text.starts_with('"') || text.starts_with("''") {
                        self.tree.alloc(Expr::Str(text.clone()))
                    } else {
                        self.tree.alloc(Expr::Ident(text.clone()))
                    };
                    self.tree.set_raw(name_id, text);
                    self.tree.push_before(name_id, child.before.clone());
                    self.tree.push_after(name_id, child.after.clone());
                    names.push(name_id);
                }
                SyntaxKind::NODE_DYNAMIC => {
                    let text = self.text_of(&child.syntax);
                    let name_id = self.tree.alloc(Expr::Raw(text.clone()));
                    self.tree.set_raw(name_id, text);
                    names.push(name_id);
                }
                other => {
                    return Err(BuildError::UnsupportedNodeKind(format!("{:?}", other)));
                }
            }
        }

        let id = self.tree.alloc(Expr::Inherit(Inherit {
            from,
            names: names.clone(),
        }));
        if let Some(from) = from {
            self.tree.set_parent_quiet(from, Some(id));
        }
        for name in names {
            self.tree.set_parent_quiet(name, Some(id));
        }
        Ok(id)
    }

    // ---- binding members and attrpath merging ----------------------------

    /// Build one member of a binding container (attribute set or `let`
    /// binding region) and merge it in. `owner` is the explicit container
    /// that records attrpath order.
    fn build_member(
        &mut self,
        owner: NodeId,
        container: NodeId,
        child: &RawChild,
    ) -> Result<(), BuildError> {
        match child.syntax.kind() {
            SyntaxKind::NODE_ATTRPATH_VALUE => {
                self.insert_parsed_binding(owner, container, child)
            }
            SyntaxKind::NODE_INHERIT => {
                let member = self.build_child(child)?;
                let mut raw = self.text_of(&child.syntax);
                if !raw.trim_end().ends_with(';') {
                    raw.push(';');
                }
                self.tree.set_raw(member, raw);
                self.push_plain_member(container, member);
                Ok(())
            }
            SyntaxKind::NODE_ERROR => self.raw_member(container, child),
            other => Err(BuildError::UnsupportedNodeKind(format!("{:?}", other))),
        }
    }

    /// Preserve an unparseable member verbatim and flag the tree.
    fn raw_member(&mut self, container: NodeId, child: &RawChild) -> Result<(), BuildError> {
        self.saw_error = true;
        let text = self.text_of(&child.syntax);
        let member = self.tree.alloc(Expr::Raw(text.clone()));
        self.tree.set_raw(member, text);
        self.tree.push_before(member, child.before.clone());
        self.tree.push_after(member, child.after.clone());
        self.push_plain_member(container, member);
        Ok(())
    }

    fn insert_parsed_binding(
        &mut self,
        owner: NodeId,
        container: NodeId,
        child: &RawChild,
    ) -> Result<(), BuildError> {
        let (members, _, _) = self.walk(&child.syntax);
        let path_child = members
            .iter()
            .find(|c| c.syntax.kind() == SyntaxKind::NODE_ATTRPATH);
        let value_child = members
            .iter()
            .find(|c| c.syntax.kind() != SyntaxKind::NODE_ATTRPATH);
        let (path_child, value_child) = match (path_child, value_child) {
            (Some(p), Some(v)) => (p, v),
            // Parser error recovery can leave a binding without one half;
            // preserve it verbatim and flag the tree.
            _ => return self.raw_member(container, child),
        };

        let names = self.attrpath_names(&path_child.syntax);
        if names.is_empty() {
            return self.raw_member(container, child);
        }
        let mut raw = self.text_of(&child.syntax);
        if !raw.trim_end().ends_with(';') {
            raw.push(';');
        }

        if names.len() == 1 {
            let name = names.into_iter().next().expect("checked non-empty");
            if let Some(existing) = self.find_member_binding(container, &name) {
                if self.binding_is_nested(existing) {
                    return Err(BuildError::MixedAttrpathBinding(name.text));
                }
                // Duplicate plain definitions are preserved verbatim.
            }
            let value = self.build_child(value_child)?;
            let binding = self.tree.alloc(Expr::Binding(Binding {
                name,
                value,
                nested: false,
            }));
            self.tree.set_raw(binding, raw);
            self.tree.set_parent_quiet(value, Some(binding));
            self.tree.push_before(binding, child.before.clone());
            self.tree.push_after(binding, child.after.clone());
            self.push_plain_member(container, binding);
            return Ok(());
        }

        // Dotted attrpath: merge through synthetic sets.
        let mut cur = container;
        for seg in &names[..names.len() - 1] {
            cur = self.descend_attrpath(cur, seg)?;
        }

        let last = names
            .last()
            .expect("attrpath has at least two segments")
            .clone();
        if self.find_member_binding(cur, &last).is_some() {
            // Identical leaf path defined twice, or a plain binding in the
            // way at the final level.
            return Err(BuildError::MixedAttrpathBinding(last.text));
        }

        let value = self.build_child(value_child)?;
        let leaf = self.tree.alloc(Expr::Binding(Binding {
            name: last,
            value,
            nested: true,
        }));
        self.tree.set_raw(leaf, raw);
        self.tree.set_parent_quiet(value, Some(leaf));
        self.tree.set_parent_quiet(leaf, Some(cur));
        self.tree.push_before(leaf, child.before.clone());
        self.tree.push_after(leaf, child.after.clone());

        if let Expr::AttrSet(set) = self.tree.expr_mut(cur) {
            set.members.push(leaf);
        }
        if let Expr::AttrSet(set) = self.tree.expr_mut(owner) {
            set.attrpath_order.push(AttrpathEntry { path: names, leaf });
            set.layout.push(SetItem::Attrpath(leaf));
        }
        Ok(())
    }

    /// Walk one attrpath segment down from `cur`, creating or merging the
    /// intermediate set.
    fn descend_attrpath(&mut self, cur: NodeId, seg: &Name) -> Result<NodeId, BuildError> {
        if let Some(existing) = self.find_member_binding(cur, seg) {
            let value = match self.tree.expr(existing) {
                Expr::Binding(b) => b.value,
                _ => return Err(BuildError::MixedAttrpathBinding(seg.text.clone())),
            };
            // Merging into synthetic and explicit nested sets alike; any
            // other value kind means a plain binding is in the way.
            return match self.tree.expr(value) {
                Expr::AttrSet(_) => Ok(value),
                _ => Err(BuildError::MixedAttrpathBinding(seg.text.clone())),
            };
        }

        let set = self.tree.alloc(Expr::AttrSet(AttrSet::synthetic()));
        let binding = self.tree.alloc(Expr::Binding(Binding {
            name: seg.clone(),
            value: set,
            nested: true,
        }));
        self.tree.set_parent_quiet(set, Some(binding));
        self.tree.set_parent_quiet(binding, Some(cur));
        if let Expr::AttrSet(container) = self.tree.expr_mut(cur) {
            container.members.push(binding);
        }
        Ok(set)
    }

    fn find_member_binding(&self, container: NodeId, name: &Name) -> Option<NodeId> {
        let members = match self.tree.expr(container) {
            Expr::AttrSet(set) => &set.members,
            _ => return None,
        };
        members.iter().copied().find(|&m| match self.tree.expr(m) {
            Expr::Binding(b) => b.name.matches(name),
            _ => false,
        })
    }

    fn binding_is_nested(&self, binding: NodeId) -> bool {
        matches!(self.tree.expr(binding), Expr::Binding(b) if b.nested)
    }

    fn push_plain_member(&mut self, container: NodeId, member: NodeId) {
        self.tree.set_parent_quiet(member, Some(container));
        if let Expr::AttrSet(set) = self.tree.expr_mut(container) {
            set.members.push(member);
            set.layout.push(SetItem::Member(member));
        }
    }

    fn attrpath_names(&self, path: &SyntaxNode) -> Vec<Name> {
        let mut names = Vec::new();
        for part in path.children() {
            match part.kind() {
                SyntaxKind::NODE_IDENT => {
                    names.push(Name::plain(self.text_of(&part)));
                }
                SyntaxKind::NODE_STRING => {
                    let text = self.text_of(&part);
                    let simple = part.children().all(|c| c.kind() != SyntaxKind::NODE_INTERPOL);
                    if simple && text.starts_with('"') && text.ends_with('"') && text.len() >= 2 {
                        let content = &text[1..text.len() - 1];
                        names.push(Name::quoted(escape::unescape_string(content).into_owned()));
                    } else {
                        names.push(Name {
                            text,
                            kind: NameKind::Dynamic,
                        });
                    }
                }
                _ => {
                    names.push(Name {
                        text: self.text_of(&part),
                        kind: NameKind::Dynamic,
                    });
                }
            }
        }
        names
    }

    /// Attach container-trailing comments to the last member; structural
    /// newlines before the closing brace are re-synthesized at render time.
    fn attach_trailing_to_last_member(&mut self, set_id: NodeId, trailing: Vec<Trivia>) {
        let trailing = strip_trailing_vertical(trailing);
        if trailing.is_empty() {
            return;
        }
        let last = match self.tree.expr(set_id) {
            Expr::AttrSet(set) => set.members.last().copied(),
            _ => None,
        };
        if let Some(last) = last {
            self.tree.push_after(last, trailing);
        }
    }

    // ---- gap walking ------------------------------------------------------

    /// Walk a node's direct children, classifying the token gaps. Returns
    /// the child nodes with their attached trivia, any trailing trivia, and
    /// the significant tokens seen.
    fn walk(&mut self, node: &SyntaxNode) -> (Vec<RawChild>, Vec<Trivia>, WalkedTokens) {
        let mut children: Vec<RawChild> = Vec::new();
        let mut pending: Vec<Trivia> = Vec::new();
        let mut newlines_in_gap = 0usize;
        let mut last_was_child = false;
        let mut seen_significant = false;
        let mut tokens = WalkedTokens { kinds: Vec::new() };

        for el in node.children_with_tokens() {
            if let Some(n) = el.as_node() {
                let start = usize::from(n.text_range().start());
                children.push(RawChild {
                    syntax: n.clone(),
                    before: std::mem::take(&mut pending),
                    after: Vec::new(),
                    start,
                });
                newlines_in_gap = 0;
                last_was_child = true;
                seen_significant = true;
                continue;
            }
            let Some(t) = el.as_token() else { continue };
            match t.kind() {
                SyntaxKind::TOKEN_WHITESPACE => {
                    let run = trivia::from_whitespace(t.text());
                    newlines_in_gap += t.text().bytes().filter(|&b| b == b'\n').count();
                    pending.extend(run);
                }
                SyntaxKind::TOKEN_COMMENT => {
                    let start = usize::from(t.text_range().start());
                    let inline = newlines_in_gap == 0 && seen_significant;
                    let piece =
                        trivia::from_comment(t.text(), self.column_of(start), start == 0, inline);
                    if inline && last_was_child && pending.is_empty() {
                        if let Some(last) = children.last_mut() {
                            last.after.push(piece);
                            continue;
                        }
                    }
                    pending.push(piece);
                }
                kind => {
                    if kind == SyntaxKind::TOKEN_ERROR {
                        self.saw_error = true;
                    }
                    tokens.kinds.push((
                        kind,
                        usize::from(t.text_range().start()),
                        t.text().to_string(),
                    ));
                    newlines_in_gap = 0;
                    last_was_child = false;
                    seen_significant = true;
                }
            }
        }

        (children, pending, tokens)
    }

    // ---- source helpers ---------------------------------------------------

    fn text_of(&self, node: &SyntaxNode) -> String {
        let range = node.text_range();
        self.src[usize::from(range.start())..usize::from(range.end())].to_string()
    }

    fn column_of(&self, offset: usize) -> usize {
        let line_start = self.src[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        offset - line_start
    }

    /// Leading whitespace of the line `offset` sits on, when nothing else
    /// precedes it on that line. Column zero captures as the empty string;
    /// `None` means the position does not start a line.
    fn line_indent_at(&self, offset: usize) -> Option<String> {
        let line_start = self.src[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let prefix = &self.src[line_start..offset];
        if prefix.chars().all(|c| c == ' ' || c == '\t') {
            Some(prefix.to_string())
        } else {
            None
        }
    }

    /// Indentation of the closing delimiter's line, when the delimiter
    /// starts its own line.
    fn close_delim_indent(&self, node: &SyntaxNode) -> Option<String> {
        let end = usize::from(node.text_range().end());
        if end == 0 {
            return None;
        }
        self.line_indent_at(end - 1)
    }
}

fn strip_trailing_vertical(mut trivia: Vec<Trivia>) -> Vec<Trivia> {
    while trivia.last().is_some_and(Trivia::is_vertical) {
        trivia.pop();
    }
    trivia
}
