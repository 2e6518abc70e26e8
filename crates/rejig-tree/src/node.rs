//! The lossless expression tree.
//!
//! Nodes live in an arena ([`Tree`]) and refer to each other through stable
//! [`NodeId`] indices; a node owns its expression data and trivia, and keeps
//! a parent link for upward walks. Every node built from source carries the
//! verbatim payload text it was parsed from; mutating a node clears the
//! payload along the whole ancestor spine, so rebuilding re-emits untouched
//! regions byte-for-byte and re-renders only the dirty spine.

use crate::trivia::Trivia;

/// Stable index of a node in a [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An attribute name: `foo`, `"foo.bar"` or `${expr}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    /// Decoded name for `Plain`/`Quoted`, verbatim source for `Dynamic`.
    pub text: String,
    pub kind: NameKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Bare identifier.
    Plain,
    /// Double-quoted string name.
    Quoted,
    /// `${...}` interpolated name; opaque to path addressing.
    Dynamic,
}

impl Name {
    pub fn plain(text: impl Into<String>) -> Self {
        Name {
            text: text.into(),
            kind: NameKind::Plain,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Name {
            text: text.into(),
            kind: NameKind::Quoted,
        }
    }

    /// The comparison key for merging and path addressing. Dynamic names
    /// never match anything.
    pub fn key(&self) -> Option<&str> {
        match self.kind {
            NameKind::Plain | NameKind::Quoted => Some(&self.text),
            NameKind::Dynamic => None,
        }
    }

    /// True when this name and `other` address the same attribute.
    pub fn matches(&self, other: &Name) -> bool {
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Render the name as it appears left of `=`: bare when possible,
    /// quoted (and escaped) otherwise, dynamic names verbatim.
    pub fn render(&self) -> String {
        match self.kind {
            NameKind::Plain => self.text.clone(),
            NameKind::Quoted => format!("\"{}\"", crate::escape::escape_attr_name(&self.text)),
            NameKind::Dynamic => self.text.clone(),
        }
    }
}

/// An attrpath-derived leaf recorded on its explicit owner set: the full
/// dotted path and the leaf binding node, in original source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrpathEntry {
    pub path: Vec<Name>,
    pub leaf: NodeId,
}

/// One emission slot in an attribute set's source-order layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetItem {
    /// A plain binding or inherit, rendered from the member node.
    Member(NodeId),
    /// An attrpath-derived leaf binding, rendered as `a.b.c = v;` from the
    /// owner's [`AttrSet::attrpath_order`] entry with this leaf.
    Attrpath(NodeId),
}

/// `{ ... }`, `rec { ... }`, or the braceless binding region of a `let`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSet {
    pub recursive: bool,
    /// Layout captured at parse time; programmatic sets fall back to a
    /// heuristic.
    pub multiline: bool,
    /// Fabricated container without braces of its own: an attrpath
    /// intermediate or a `let` binding region.
    pub synthetic: bool,
    /// Merged members in order of first appearance: bindings (plain and
    /// attrpath-derived) and inherits.
    pub members: Vec<NodeId>,
    /// Attrpath-derived leaves in original source order.
    pub attrpath_order: Vec<AttrpathEntry>,
    /// Source-order interleaving of plain members and attrpath leaves for
    /// faithful re-emission.
    pub layout: Vec<SetItem>,
    /// Leading whitespace of the first member line, captured so edits do
    /// not re-indent untouched sibling lines.
    pub member_indent: Option<String>,
    /// Leading whitespace of the closing-brace line.
    pub close_indent: Option<String>,
}

impl AttrSet {
    /// An empty explicit set.
    pub fn empty() -> Self {
        AttrSet {
            recursive: false,
            multiline: false,
            synthetic: false,
            members: Vec::new(),
            attrpath_order: Vec::new(),
            layout: Vec::new(),
            member_indent: None,
            close_indent: None,
        }
    }

    /// An empty synthetic (braceless) container.
    pub fn synthetic() -> Self {
        AttrSet {
            synthetic: true,
            ..AttrSet::empty()
        }
    }

    /// Index of the attrpath entry for `leaf`, if any.
    pub fn attrpath_index_of(&self, leaf: NodeId) -> Option<usize> {
        self.attrpath_order.iter().position(|e| e.leaf == leaf)
    }
}

/// `name = value;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: Name,
    pub value: NodeId,
    /// Originated from dotted attrpath syntax (`a.b = v;`) rather than an
    /// explicit nested set.
    pub nested: bool,
}

/// `inherit a b;` or `inherit (src) a b;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inherit {
    pub from: Option<NodeId>,
    /// Name nodes (identifier or string), each carrying its own trivia.
    pub names: Vec<NodeId>,
}

/// `[ a b c ]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    pub items: Vec<NodeId>,
    pub multiline: bool,
    pub member_indent: Option<String>,
    pub close_indent: Option<String>,
}

/// A lambda formal parameter set: `{ a, b ? default, ... } @ args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub entries: Vec<PatEntry>,
    pub ellipsis: bool,
    pub bind: Option<PatBind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatEntry {
    pub name: String,
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatBind {
    pub name: String,
    /// `args @ { ... }` when true, `{ ... } @ args` when false.
    pub at_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `x: body`
    Ident(String),
    /// `{ a, b ? d, ... }: body`
    Pattern(Pattern),
}

/// `param: body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    pub param: Param,
    pub body: NodeId,
}

/// `function argument`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apply {
    pub function: NodeId,
    pub argument: NodeId,
}

/// `base.path` or `base.path or default`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub base: NodeId,
    /// Verbatim attrpath text (without the leading dot).
    pub path: String,
    pub default: Option<NodeId>,
}

/// `base ? path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasAttr {
    pub base: NodeId,
    pub path: String,
}

/// `with env; body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct With {
    pub env: NodeId,
    pub body: NodeId,
}

/// `let bindings in body`; the binding region is a synthetic [`AttrSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetIn {
    pub scope: NodeId,
    pub body: NodeId,
}

/// `assert condition; body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assert {
    pub condition: NodeId,
    pub body: NodeId,
}

/// `if condition then consequent else alternative`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfElse {
    pub condition: NodeId,
    pub consequent: NodeId,
    pub alternative: NodeId,
}

/// `!operand` or `-operand`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryOp {
    pub op: String,
    pub operand: NodeId,
}

/// `lhs op rhs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinOp {
    pub lhs: NodeId,
    pub op: String,
    pub rhs: NodeId,
}

/// The closed set of expression kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    AttrSet(AttrSet),
    Binding(Binding),
    Inherit(Inherit),
    List(List),
    Lambda(Lambda),
    Apply(Apply),
    /// A free identifier.
    Ident(String),
    Select(Select),
    With(With),
    LetIn(LetIn),
    Assert(Assert),
    IfElse(IfElse),
    HasAttr(HasAttr),
    UnaryOp(UnaryOp),
    BinOp(BinOp),
    /// `"..."`, verbatim including quotes and any interpolation.
    Str(String),
    /// `''...''`, verbatim including delimiters.
    IndentedStr(String),
    /// Integer literal, verbatim decimal text.
    Int(String),
    /// Float literal, verbatim text.
    Float(String),
    Bool(bool),
    Null,
    /// Path or URI literal, verbatim text.
    Path(String),
    /// `( inner )`
    Paren(NodeId),
    /// Verbatim fallback for parser error subtrees and constructs the tree
    /// does not model structurally.
    Raw(String),
}

impl Expr {
    /// A quoted string literal carrying `value`, escaped for emission.
    pub fn string_literal(value: &str) -> Expr {
        Expr::Str(format!("\"{}\"", crate::escape::escape_string(value)))
    }

    /// A free identifier.
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    /// True for the kinds that may render on the same line as an
    /// introducing `with ENV;` prelude or a chainable binary operator
    /// without an added indent level.
    pub fn is_absorbable(&self, tree: &Tree) -> bool {
        match self {
            Expr::AttrSet(_) | Expr::IndentedStr(_) => true,
            Expr::List(list) => list.items.len() <= 1,
            Expr::Paren(inner) => tree.expr(*inner).is_absorbable(tree),
            _ => false,
        }
    }

    pub fn as_attr_set(&self) -> Option<&AttrSet> {
        match self {
            Expr::AttrSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_binding(&self) -> Option<&Binding> {
        match self {
            Expr::Binding(binding) => Some(binding),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// The numeric value of an integer literal.
    pub fn int_value(&self) -> Option<i64> {
        match self {
            Expr::Int(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// The numeric value of a float literal.
    pub fn float_value(&self) -> Option<f64> {
        match self {
            Expr::Float(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn bool_value(&self) -> Option<bool> {
        match self {
            Expr::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The decoded content of a simple quoted string literal. Interpolated
    /// strings have no static value and return `None`.
    pub fn string_value(&self) -> Option<String> {
        let text = match self {
            Expr::Str(text) => text,
            _ => return None,
        };
        if !text.starts_with('"') || !text.ends_with('"') || text.len() < 2 {
            return None;
        }
        let content = &text[1..text.len() - 1];
        if has_interpolation(content) {
            return None;
        }
        Some(crate::escape::unescape_string(content).into_owned())
    }
}

/// True when string content contains an unescaped `${` interpolation.
fn has_interpolation(content: &str) -> bool {
    let bytes = content.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes[i + 1] == b'{' => return true,
            _ => i += 1,
        }
    }
    false
}

/// A tree node: expression data plus attached trivia and bookkeeping.
#[derive(Debug, Clone)]
pub struct Node {
    pub expr: Expr,
    pub before: Vec<Trivia>,
    pub after: Vec<Trivia>,
    pub(crate) parent: Option<NodeId>,
    /// Verbatim payload captured at parse; `None` once this node or any
    /// descendant has been modified.
    pub(crate) raw: Option<String>,
}

/// Non-owning reference into a scope chain, checked against the arena
/// generation so a reparented node can never resolve against its old
/// location silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Scope-introducing nodes, innermost first.
    pub chain: Vec<NodeId>,
    pub generation: u64,
}

/// Arena of expression nodes.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    generation: u64,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a fresh node with no trivia, no parent and no verbatim
    /// payload.
    pub fn alloc(&mut self, expr: Expr) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node {
            expr,
            before: Vec::new(),
            after: Vec::new(),
            parent: None,
            raw: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn expr(&self, id: NodeId) -> &Expr {
        &self.nodes[id.index()].expr
    }

    /// Mutable access to a node's expression. Clears the verbatim payload
    /// along the ancestor spine: the node re-renders structurally from now
    /// on, siblings keep their exact source text.
    pub fn expr_mut(&mut self, id: NodeId) -> &mut Expr {
        self.mark_dirty(id);
        &mut self.nodes[id.index()].expr
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn before(&self, id: NodeId) -> &[Trivia] {
        &self.nodes[id.index()].before
    }

    pub fn after(&self, id: NodeId) -> &[Trivia] {
        &self.nodes[id.index()].after
    }

    /// Mutable leading trivia. A node's verbatim payload does not cover its
    /// surrounding trivia, so only the ancestors (whose payloads span the
    /// gaps) go dirty.
    pub fn before_mut(&mut self, id: NodeId) -> &mut Vec<Trivia> {
        if let Some(parent) = self.nodes[id.index()].parent {
            self.mark_dirty(parent);
        }
        &mut self.nodes[id.index()].before
    }

    /// Mutable trailing trivia; see [`Tree::before_mut`].
    pub fn after_mut(&mut self, id: NodeId) -> &mut Vec<Trivia> {
        if let Some(parent) = self.nodes[id.index()].parent {
            self.mark_dirty(parent);
        }
        &mut self.nodes[id.index()].after
    }

    /// Verbatim payload, present while the node is untouched.
    pub fn raw(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.index()].raw.as_deref()
    }

    /// Arena generation; bumped on every reparenting.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Attach `child` under `parent`. Bumps the generation so outstanding
    /// resolution contexts fail explicitly instead of resolving against a
    /// stale location.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        self.nodes[child.index()].parent = parent;
        self.generation += 1;
    }

    /// Clear verbatim payloads from `id` up to the root.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = &mut self.nodes[c.index()];
            node.raw = None;
            cur = node.parent;
        }
    }

    pub(crate) fn set_raw(&mut self, id: NodeId, raw: String) {
        self.nodes[id.index()].raw = Some(raw);
    }

    pub(crate) fn set_parent_quiet(&mut self, child: NodeId, parent: Option<NodeId>) {
        // Builder-internal: wiring during construction is not a reparent.
        self.nodes[child.index()].parent = parent;
    }

    pub(crate) fn push_before(&mut self, id: NodeId, trivia: Vec<Trivia>) {
        self.nodes[id.index()].before.extend(trivia);
    }

    /// Builder-internal trivia reset that keeps verbatim payloads intact.
    pub(crate) fn clear_trivia(&mut self, id: NodeId) {
        self.nodes[id.index()].before.clear();
        self.nodes[id.index()].after.clear();
    }

    pub(crate) fn push_after(&mut self, id: NodeId, trivia: Vec<Trivia>) {
        self.nodes[id.index()].after.extend(trivia);
    }

    /// A resolution context snapshot for `id`: its chain of
    /// scope-introducing ancestors, innermost first, stamped with the
    /// current generation.
    pub fn context_for(&self, id: NodeId) -> ResolutionContext {
        let mut chain = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            match self.expr(p) {
                Expr::LetIn(_) | Expr::With(_) | Expr::Lambda(_) => chain.push(p),
                Expr::AttrSet(set) if set.recursive => chain.push(p),
                _ => {}
            }
            cur = self.parent(p);
        }
        ResolutionContext {
            chain,
            generation: self.generation,
        }
    }

    /// Check a context against the current generation.
    pub fn context_is_current(&self, ctx: &ResolutionContext) -> bool {
        ctx.generation == self.generation
    }

    /// Ordered child node ids of `id`.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.expr(id) {
            Expr::AttrSet(set) => set.members.clone(),
            Expr::Binding(b) => vec![b.value],
            Expr::Inherit(inh) => {
                let mut out = Vec::new();
                if let Some(from) = inh.from {
                    out.push(from);
                }
                out.extend(&inh.names);
                out
            }
            Expr::List(list) => list.items.clone(),
            Expr::Lambda(lambda) => {
                let mut out = Vec::new();
                if let Param::Pattern(pat) = &lambda.param {
                    out.extend(pat.entries.iter().filter_map(|e| e.default));
                }
                out.push(lambda.body);
                out
            }
            Expr::Apply(apply) => vec![apply.function, apply.argument],
            Expr::Select(sel) => {
                let mut out = vec![sel.base];
                out.extend(sel.default);
                out
            }
            Expr::With(with) => vec![with.env, with.body],
            Expr::LetIn(let_in) => vec![let_in.scope, let_in.body],
            Expr::Assert(a) => vec![a.condition, a.body],
            Expr::IfElse(ite) => vec![ite.condition, ite.consequent, ite.alternative],
            Expr::HasAttr(ha) => vec![ha.base],
            Expr::UnaryOp(un) => vec![un.operand],
            Expr::BinOp(bin) => vec![bin.lhs, bin.rhs],
            Expr::Paren(inner) => vec![*inner],
            Expr::Ident(_)
            | Expr::Str(_)
            | Expr::IndentedStr(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Path(_)
            | Expr::Raw(_) => Vec::new(),
        }
    }

    /// Replace the child link `old` with `new` in `parent`'s expression.
    /// Returns false when `old` is not a direct child.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        let replaced = {
            let expr = &mut self.nodes[parent.index()].expr;
            match expr {
                Expr::AttrSet(set) => replace_in(&mut set.members, old, new),
                Expr::Binding(b) => replace_slot(&mut b.value, old, new),
                Expr::Inherit(inh) => {
                    let mut hit = false;
                    if let Some(from) = &mut inh.from {
                        hit |= replace_slot(from, old, new);
                    }
                    hit || replace_in(&mut inh.names, old, new)
                }
                Expr::List(list) => replace_in(&mut list.items, old, new),
                Expr::Lambda(lambda) => {
                    let mut hit = replace_slot(&mut lambda.body, old, new);
                    if let Param::Pattern(pat) = &mut lambda.param {
                        for entry in &mut pat.entries {
                            if let Some(default) = &mut entry.default {
                                hit |= replace_slot(default, old, new);
                            }
                        }
                    }
                    hit
                }
                Expr::Apply(apply) => {
                    replace_slot(&mut apply.function, old, new)
                        || replace_slot(&mut apply.argument, old, new)
                }
                Expr::Select(sel) => {
                    let mut hit = replace_slot(&mut sel.base, old, new);
                    if let Some(default) = &mut sel.default {
                        hit |= replace_slot(default, old, new);
                    }
                    hit
                }
                Expr::With(with) => {
                    replace_slot(&mut with.env, old, new) || replace_slot(&mut with.body, old, new)
                }
                Expr::LetIn(let_in) => {
                    replace_slot(&mut let_in.scope, old, new)
                        || replace_slot(&mut let_in.body, old, new)
                }
                Expr::Assert(a) => {
                    replace_slot(&mut a.condition, old, new) || replace_slot(&mut a.body, old, new)
                }
                Expr::IfElse(ite) => {
                    replace_slot(&mut ite.condition, old, new)
                        || replace_slot(&mut ite.consequent, old, new)
                        || replace_slot(&mut ite.alternative, old, new)
                }
                Expr::HasAttr(ha) => replace_slot(&mut ha.base, old, new),
                Expr::UnaryOp(un) => replace_slot(&mut un.operand, old, new),
                Expr::BinOp(bin) => {
                    replace_slot(&mut bin.lhs, old, new) || replace_slot(&mut bin.rhs, old, new)
                }
                Expr::Paren(inner) => replace_slot(inner, old, new),
                Expr::Ident(_)
                | Expr::Str(_)
                | Expr::IndentedStr(_)
                | Expr::Int(_)
                | Expr::Float(_)
                | Expr::Bool(_)
                | Expr::Null
                | Expr::Path(_)
                | Expr::Raw(_) => false,
            }
        };
        if replaced {
            self.mark_dirty(parent);
            self.set_parent(new, Some(parent));
        }
        replaced
    }
}

fn replace_slot(slot: &mut NodeId, old: NodeId, new: NodeId) -> bool {
    if *slot == old {
        *slot = new;
        true
    } else {
        false
    }
}

fn replace_in(list: &mut Vec<NodeId>, old: NodeId, new: NodeId) -> bool {
    for slot in list.iter_mut() {
        if *slot == old {
            *slot = new;
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_marking_clears_the_spine() {
        let mut tree = Tree::new();
        let leaf = tree.alloc(Expr::Int("1".into()));
        let binding = tree.alloc(Expr::Binding(Binding {
            name: Name::plain("a"),
            value: leaf,
            nested: false,
        }));
        tree.set_parent_quiet(leaf, Some(binding));
        tree.set_raw(leaf, "1".into());
        tree.set_raw(binding, "a = 1;".into());

        assert!(tree.raw(binding).is_some());
        let _ = tree.expr_mut(leaf);
        assert!(tree.raw(leaf).is_none());
        assert!(tree.raw(binding).is_none());
    }

    #[test]
    fn typed_value_accessors() {
        assert_eq!(Expr::Int("42".into()).int_value(), Some(42));
        assert_eq!(Expr::Float("2.5".into()).float_value(), Some(2.5));
        assert_eq!(Expr::Bool(true).bool_value(), Some(true));
        assert_eq!(Expr::Ident("pkgs".into()).as_ident(), Some("pkgs"));
        assert_eq!(
            Expr::Str("\"hello\\nworld\"".into()).string_value(),
            Some("hello\nworld".to_string())
        );
        // Interpolated strings have no static value.
        assert_eq!(Expr::Str("\"v${x}\"".into()).string_value(), None);
        // An escaped dollar-brace is plain text.
        assert_eq!(
            Expr::Str("\"v\\${x}\"".into()).string_value(),
            Some("v${x}".to_string())
        );
        assert_eq!(Expr::Null.int_value(), None);
    }

    #[test]
    fn string_literal_constructor_escapes() {
        assert_eq!(
            Expr::string_literal("a \"b\""),
            Expr::Str("\"a \\\"b\\\"\"".to_string())
        );
    }

    #[test]
    fn reparenting_invalidates_contexts() {
        let mut tree = Tree::new();
        let body = tree.alloc(Expr::Ident("x".into()));
        let scope = tree.alloc(Expr::AttrSet(AttrSet::synthetic()));
        let let_in = tree.alloc(Expr::LetIn(LetIn { scope, body }));
        tree.set_parent_quiet(body, Some(let_in));
        tree.set_parent_quiet(scope, Some(let_in));

        let ctx = tree.context_for(body);
        assert_eq!(ctx.chain, vec![let_in]);
        assert!(tree.context_is_current(&ctx));

        tree.set_parent(body, None);
        assert!(!tree.context_is_current(&ctx));
    }
}
