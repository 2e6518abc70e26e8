//! Trivia-preserving rebuild engine.
//!
//! Inverts the builder: untouched nodes re-emit their verbatim payload,
//! nodes on a dirty spine re-render structurally from their expression data
//! and trivia. Sibling formatting survives edits because only the payloads
//! along the modified spine are regenerated, and containers remember the
//! member indentation they were parsed with.

use crate::builder::Source;
use crate::node::{AttrSet, Expr, List, NodeId, Param, SetItem, Tree};
use crate::trivia::{self, Trivia};

/// Rendering knobs for structurally rendered (programmatic or edited)
/// nodes. Untouched source is never affected by these.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Indentation unit for containers with no captured indentation.
    pub indent: &'static str,
    /// Advisory width bound used by construction helpers when deciding
    /// whether a programmatic container should prefer multiline layout.
    pub max_inline_width: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: "  ",
            max_inline_width: 60,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Render a whole source file.
pub fn render_source(source: &Source, options: &RenderOptions) -> String {
    let tree = source.tree();
    let root = source.root();
    let mut renderer = Renderer::new(tree, options);
    renderer.render_node(root, "");
    renderer.finish()
}

/// Render a single node without its surrounding trivia (value read-back).
pub fn render_value(tree: &Tree, id: NodeId, options: &RenderOptions) -> String {
    if let Some(raw) = tree.raw(id) {
        return raw.to_string();
    }
    let mut renderer = Renderer::new(tree, options);
    renderer.render_payload(id, "");
    renderer.finish()
}

struct Renderer<'t> {
    tree: &'t Tree,
    options: &'t RenderOptions,
    out: String,
    at_line_start: bool,
    /// The last thing written was a line comment with no newline yet; any
    /// further payload must break the line first.
    line_comment_open: bool,
}

impl<'t> Renderer<'t> {
    fn new(tree: &'t Tree, options: &'t RenderOptions) -> Self {
        Self {
            tree,
            options,
            out: String::new(),
            at_line_start: false,
            line_comment_open: false,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    // ---- low-level writing ------------------------------------------------

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
        self.line_comment_open = false;
    }

    fn write(&mut self, indent: &str, s: &str) {
        if self.line_comment_open {
            // Nothing may share a line with an open line comment.
            self.newline();
        }
        if self.at_line_start {
            self.out.push_str(indent);
            self.at_line_start = false;
        }
        self.out.push_str(s);
    }

    fn space(&mut self) {
        if self.line_comment_open || self.at_line_start {
            return;
        }
        if !self.out.is_empty() && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
    }

    /// A keyword following rendered content: separated by a space, or moved
    /// to its own line when a line comment is open.
    fn keyword(&mut self, indent: &str, kw: &str) {
        if !self.line_comment_open {
            self.space();
        }
        self.write(indent, kw);
    }

    // ---- trivia -----------------------------------------------------------

    fn render_trivia(&mut self, trivia: &[Trivia], indent: &str) {
        for t in trivia {
            match t {
                Trivia::LineBreak | Trivia::BlankLine => self.newline(),
                Trivia::Comma => self.write(indent, ","),
                Trivia::LineComment { text, inline, .. } => {
                    if *inline && !self.at_line_start && !self.line_comment_open {
                        self.out.push(' ');
                        self.out.push_str(text);
                    } else {
                        self.write(indent, text);
                    }
                    self.line_comment_open = true;
                }
                Trivia::BlockComment {
                    text,
                    inner_indent,
                    inline,
                    ..
                } => {
                    if *inline && !self.at_line_start && !self.line_comment_open {
                        self.out.push(' ');
                        self.out.push_str(text);
                        self.out.push(' ');
                    } else {
                        self.write_block_comment(text, *inner_indent, indent);
                    }
                }
            }
        }
    }

    fn write_block_comment(&mut self, text: &str, inner_indent: usize, indent: &str) {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.write(indent, first);
        }
        for line in lines {
            self.newline();
            if line.is_empty() {
                continue;
            }
            self.out.push_str(indent);
            for _ in 0..inner_indent {
                self.out.push(' ');
            }
            self.at_line_start = false;
            self.out.push_str(line);
        }
    }

    // ---- nodes ------------------------------------------------------------

    fn render_node(&mut self, id: NodeId, indent: &str) {
        let node = self.tree.node(id);
        self.render_trivia(&node.before, indent);
        self.render_payload(id, indent);
        self.render_trivia(&node.after, indent);
    }

    fn render_payload(&mut self, id: NodeId, indent: &str) {
        if let Some(raw) = self.tree.raw(id) {
            self.write(indent, raw);
            return;
        }
        self.render_expr(id, indent)
    }

    fn render_expr(&mut self, id: NodeId, indent: &str) {
        let child_indent = self.child_indent(indent);
        match self.tree.expr(id) {
            Expr::AttrSet(set) => self.render_attr_set(set, indent),
            Expr::Binding(_) => self.render_binding(id, indent),
            Expr::Inherit(inherit) => {
                self.write(indent, "inherit");
                if let Some(from) = inherit.from {
                    self.space();
                    self.write(indent, "(");
                    self.render_node(from, indent);
                    self.write(indent, ")");
                }
                for &name in &inherit.names {
                    if !has_vertical(self.tree.before(name)) {
                        self.space();
                    }
                    self.render_node(name, indent);
                }
                self.write(indent, ";");
            }
            Expr::List(list) => self.render_list(list, indent),
            Expr::Lambda(lambda) => {
                self.render_param(&lambda.param, indent);
                self.write(indent, ":");
                self.lead_or_space(lambda.body);
                self.render_node(lambda.body, indent);
            }
            Expr::Apply(apply) => {
                self.render_node(apply.function, indent);
                self.lead_or_space(apply.argument);
                self.render_node(apply.argument, &child_indent);
            }
            Expr::Ident(name) => self.write(indent, name),
            Expr::Select(sel) => {
                self.render_node(sel.base, indent);
                self.write(indent, ".");
                self.write(indent, &sel.path);
                if let Some(default) = sel.default {
                    self.keyword(indent, "or");
                    self.lead_or_space(default);
                    self.render_node(default, indent);
                }
            }
            Expr::With(with) => {
                self.write(indent, "with");
                self.lead_or_space(with.env);
                self.render_node(with.env, indent);
                self.write(indent, ";");
                self.render_prelude_body(with.body, indent);
            }
            Expr::LetIn(let_in) => self.render_let_in(let_in.scope, let_in.body, indent),
            Expr::Assert(assert) => {
                self.write(indent, "assert");
                self.lead_or_space(assert.condition);
                self.render_node(assert.condition, indent);
                self.write(indent, ";");
                self.lead_or_space(assert.body);
                self.render_node(assert.body, indent);
            }
            Expr::IfElse(ite) => {
                self.write(indent, "if");
                self.lead_or_space(ite.condition);
                self.render_node(ite.condition, indent);
                self.keyword(indent, "then");
                self.lead_or_space(ite.consequent);
                self.render_node(ite.consequent, &child_indent);
                self.keyword(indent, "else");
                self.lead_or_space(ite.alternative);
                self.render_node(ite.alternative, &child_indent);
            }
            Expr::HasAttr(ha) => {
                self.render_node(ha.base, indent);
                self.write(indent, " ? ");
                self.write(indent, &ha.path);
            }
            Expr::UnaryOp(un) => {
                self.write(indent, &un.op);
                self.render_node(un.operand, indent);
            }
            Expr::BinOp(bin) => {
                self.render_node(bin.lhs, indent);
                self.keyword(indent, &bin.op);
                let rhs_indent = if self.tree.expr(bin.rhs).is_absorbable(self.tree) {
                    indent
                } else {
                    &child_indent
                };
                self.lead_or_space(bin.rhs);
                self.render_node(bin.rhs, rhs_indent);
            }
            Expr::Str(text)
            | Expr::IndentedStr(text)
            | Expr::Int(text)
            | Expr::Float(text)
            | Expr::Path(text)
            | Expr::Raw(text) => self.write(indent, text),
            Expr::Bool(true) => self.write(indent, "true"),
            Expr::Bool(false) => self.write(indent, "false"),
            Expr::Null => self.write(indent, "null"),
            Expr::Paren(inner) => {
                let inner = *inner;
                self.write(indent, "(");
                self.render_node(inner, indent);
                self.write(indent, ")");
            }
        }
    }

    /// `with ENV;` absorbs certain terms on the same line without an added
    /// indent level; everything else breaks to an indented line.
    fn render_prelude_body(&mut self, body: NodeId, indent: &str) {
        let absorbable = self.tree.expr(body).is_absorbable(self.tree);
        let body_indent = if absorbable {
            indent.to_string()
        } else {
            self.child_indent(indent)
        };
        self.lead_or_space(body);
        self.render_node(body, &body_indent);
    }

    /// Either let the node's own leading trivia position it (when it has a
    /// line break) or separate it from the preceding text with one space.
    fn lead_or_space(&mut self, id: NodeId) {
        if !has_vertical(self.tree.before(id)) {
            self.space();
        }
    }

    fn render_param(&mut self, param: &Param, indent: &str) {
        match param {
            Param::Ident(name) => self.write(indent, name),
            Param::Pattern(pat) => {
                if let Some(bind) = &pat.bind {
                    if bind.at_start {
                        self.write(indent, &bind.name);
                        self.write(indent, " @ ");
                    }
                }
                self.write(indent, "{ ");
                let mut first = true;
                for entry in &pat.entries {
                    if !first {
                        self.write(indent, ", ");
                    }
                    first = false;
                    self.write(indent, &entry.name);
                    if let Some(default) = entry.default {
                        self.write(indent, " ? ");
                        self.render_node(default, indent);
                    }
                }
                if pat.ellipsis {
                    if !first {
                        self.write(indent, ", ");
                    }
                    self.write(indent, "...");
                }
                self.write(indent, " }");
                if let Some(bind) = &pat.bind {
                    if !bind.at_start {
                        self.write(indent, " @ ");
                        self.write(indent, &bind.name);
                    }
                }
            }
        }
    }

    fn render_binding(&mut self, id: NodeId, indent: &str) {
        let (name, value) = match self.tree.expr(id) {
            Expr::Binding(b) => (b.name.render(), b.value),
            _ => return,
        };
        self.write(indent, &name);
        self.write(indent, " =");
        self.lead_or_space(value);
        self.render_node(value, indent);
        self.write(indent, ";");
    }

    fn render_let_in(&mut self, scope: NodeId, body: NodeId, indent: &str) {
        let set = match self.tree.expr(scope) {
            Expr::AttrSet(set) => set,
            _ => return,
        };
        let multiline = set.multiline || layout_forces_multiline(self.tree, set);
        let member_indent = set
            .member_indent
            .clone()
            .unwrap_or_else(|| self.child_indent(indent));

        self.write(indent, "let");
        self.render_set_members(set, multiline, &member_indent);
        if multiline {
            self.newline();
            self.write(indent, "in");
        } else {
            self.keyword(indent, "in");
        }
        self.lead_or_space(body);
        self.render_node(body, indent);
    }

    fn render_attr_set(&mut self, set: &AttrSet, indent: &str) {
        let multiline = set.multiline || layout_forces_multiline(self.tree, set);
        let member_indent = set
            .member_indent
            .clone()
            .unwrap_or_else(|| self.child_indent(indent));
        let close_indent = set
            .close_indent
            .clone()
            .unwrap_or_else(|| indent.to_string());

        if set.recursive {
            self.write(indent, "rec ");
        }
        self.write(indent, "{");
        if set.layout.is_empty() && set.members.is_empty() {
            self.write(indent, " }");
            return;
        }
        if set.layout.is_empty() {
            // Synthetic sets (attrpath intermediates) carry no layout of
            // their own; read-back renders their members as plain bindings.
            for &member in &set.members {
                if multiline && !has_vertical(self.tree.before(member)) {
                    self.newline();
                } else if !multiline {
                    self.space();
                }
                self.render_synthetic_member(member, &member_indent);
            }
        } else {
            self.render_set_members(set, multiline, &member_indent);
        }
        if multiline {
            self.newline();
            self.write(&close_indent, "}");
        } else {
            self.space();
            self.write(indent, "}");
        }
    }

    /// A member of a synthetic set, rendered `name = value;` regardless of
    /// the verbatim attrpath text it was parsed from.
    fn render_synthetic_member(&mut self, member: NodeId, indent: &str) {
        match self.tree.expr(member) {
            Expr::Binding(b) => {
                let name = b.name.render();
                let value = b.value;
                self.write(indent, &name);
                self.write(indent, " =");
                self.lead_or_space(value);
                self.render_node(value, indent);
                self.write(indent, ";");
            }
            _ => self.render_node(member, indent),
        }
    }

    fn render_set_members(&mut self, set: &AttrSet, multiline: bool, member_indent: &str) {
        for item in &set.layout {
            let member = match item {
                SetItem::Member(id) => *id,
                SetItem::Attrpath(leaf) => *leaf,
            };
            if multiline {
                if !has_vertical(self.tree.before(member)) {
                    self.newline();
                }
            } else {
                self.space();
            }
            match item {
                SetItem::Member(id) => self.render_node(*id, member_indent),
                SetItem::Attrpath(leaf) => self.render_attrpath_member(set, *leaf, member_indent),
            }
        }
    }

    /// An attrpath-derived leaf re-emits as `a.b.c = v;` from the owner's
    /// order entry, never expanded into nested-set syntax.
    fn render_attrpath_member(&mut self, set: &AttrSet, leaf: NodeId, indent: &str) {
        let node = self.tree.node(leaf);
        self.render_trivia(&node.before, indent);
        if let Some(raw) = self.tree.raw(leaf) {
            self.write(indent, raw);
        } else {
            let value = match self.tree.expr(leaf) {
                Expr::Binding(b) => b.value,
                _ => return,
            };
            let path = match set.attrpath_order.iter().find(|e| e.leaf == leaf) {
                Some(entry) => entry
                    .path
                    .iter()
                    .map(|n| n.render())
                    .collect::<Vec<_>>()
                    .join("."),
                None => match self.tree.expr(leaf) {
                    Expr::Binding(b) => b.name.render(),
                    _ => return,
                },
            };
            self.write(indent, &path);
            self.write(indent, " =");
            self.lead_or_space(value);
            self.render_node(value, indent);
            self.write(indent, ";");
        }
        self.render_trivia(&node.after, indent);
    }

    fn render_list(&mut self, list: &List, indent: &str) {
        let multiline = list.multiline
            || list
                .items
                .iter()
                .any(|&i| trivia::contains_comment(self.tree.before(i)));
        let member_indent = list
            .member_indent
            .clone()
            .unwrap_or_else(|| self.child_indent(indent));
        let close_indent = list
            .close_indent
            .clone()
            .unwrap_or_else(|| indent.to_string());

        self.write(indent, "[");
        if list.items.is_empty() {
            self.write(indent, " ]");
            return;
        }
        for &item in &list.items {
            if multiline {
                if !has_vertical(self.tree.before(item)) {
                    self.newline();
                }
            } else {
                self.space();
            }
            self.render_node(item, &member_indent);
        }
        if multiline {
            self.newline();
            self.write(&close_indent, "]");
        } else {
            self.space();
            self.write(indent, "]");
        }
    }

    fn child_indent(&self, indent: &str) -> String {
        let mut s = String::with_capacity(indent.len() + self.options.indent.len());
        s.push_str(indent);
        s.push_str(self.options.indent);
        s
    }
}

fn has_vertical(trivia: &[Trivia]) -> bool {
    trivia.iter().any(Trivia::is_vertical)
}

/// Members carrying comments force multiline layout even on containers
/// parsed inline.
fn layout_forces_multiline(tree: &Tree, set: &AttrSet) -> bool {
    set.layout.iter().any(|item| {
        let id = match item {
            SetItem::Member(id) => *id,
            SetItem::Attrpath(leaf) => *leaf,
        };
        trivia::contains_comment(tree.before(id)) || trivia::contains_comment(tree.after(id))
    })
}
