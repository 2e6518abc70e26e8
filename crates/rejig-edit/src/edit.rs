//! The structural edit engine: NPath-addressed `set`/`remove`/`get`.
//!
//! Edits prefer the shape the file already has: an existing attrpath leaf
//! is updated in place, new leaves under attrpath-derived intermediates
//! continue the attrpath style, everything else becomes plain bindings and
//! explicit nested sets. A binding whose value is an identifier is updated
//! through resolution at its true definition site, with a documented
//! fallback of overwriting the identifier in place when resolution fails.

use rejig_tree::escape::is_bare_name;
use rejig_tree::node::{AttrSet, AttrpathEntry, Binding, SetItem};
use rejig_tree::{
    build_fragment, render_value, Expr, Name, NodeId, RenderOptions, Source, Tree, Trivia,
};

use crate::npath::{NPath, Segment};
use crate::scope;
use crate::EditError;

/// Set the binding at `npath` to the expression in `value`, returning the
/// rebuilt source text.
pub fn set(source: &mut Source, npath: &str, value: &str) -> Result<String, EditError> {
    ensure_editable(source)?;
    let path = NPath::parse(npath)?;
    let target = resolve_edit_target(source, path.depth)?;
    let names = segment_names(&path.segments);
    let value_id = build_fragment(source.tree_mut(), value)?;
    set_at(source, target, &names, value_id)?;
    source.mark_edited();
    tracing::debug!(path = npath, "set binding");
    Ok(source.rebuild())
}

/// Remove the binding at `npath`, returning the rebuilt source text.
///
/// Multi-segment paths prune now-empty synthetic intermediate sets upward;
/// emptying a `let` scope layer unwraps the `let` entirely.
pub fn remove(source: &mut Source, npath: &str) -> Result<String, EditError> {
    ensure_editable(source)?;
    let path = NPath::parse(npath)?;
    let target = resolve_edit_target(source, path.depth)?;
    let names = segment_names(&path.segments);
    remove_at(source, target, &names)?;
    if path.depth > 0 {
        maybe_unwrap_let(source, target);
    }
    source.mark_edited();
    tracing::debug!(path = npath, "removed binding");
    Ok(source.rebuild())
}

/// Read back the rendered value text at `npath`.
pub fn get(source: &Source, npath: &str) -> Result<String, EditError> {
    let path = NPath::parse(npath)?;
    let target = resolve_edit_target(source, path.depth)?;
    let names = segment_names(&path.segments);
    let tree = source.tree();

    let binding = match find_attrpath_leaf(tree, target, &names) {
        Some(leaf) => leaf,
        None => walk_to_binding(tree, target, &names)?,
    };
    let value = binding_value(tree, binding)
        .ok_or_else(|| EditError::MissingKey(path_text(&names)))?;
    Ok(render_value(tree, value, &RenderOptions::default()))
}

fn ensure_editable(source: &Source) -> Result<(), EditError> {
    if source.contains_error() {
        return Err(EditError::Syntax(
            "source contains parse errors; refusing to edit".into(),
        ));
    }
    Ok(())
}

/// Unwrap the top-level expression down to the attribute set edits apply
/// to. A leading `@`-depth selects the n-th scope layer met on the way
/// instead.
fn resolve_edit_target(source: &Source, depth: usize) -> Result<NodeId, EditError> {
    let tree = source.tree();
    let mut layers_seen = 0;
    let mut cur = source.root();
    loop {
        match tree.expr(cur) {
            Expr::Assert(assert) => cur = assert.body,
            Expr::Paren(inner) => cur = *inner,
            Expr::Lambda(lambda) => cur = lambda.body,
            Expr::LetIn(let_in) => {
                layers_seen += 1;
                if layers_seen == depth {
                    return Ok(let_in.scope);
                }
                cur = let_in.body;
            }
            Expr::With(with) => {
                layers_seen += 1;
                if layers_seen == depth {
                    return unwrap_parens_to_set(tree, with.env)
                        .ok_or_else(|| EditError::NotAnAttributeSet("with environment".into()));
                }
                cur = with.body;
            }
            // A direct call argument (`mkDerivation { ... }`) is the edit
            // target of the call.
            Expr::Apply(apply) => cur = apply.argument,
            Expr::AttrSet(_) => {
                if depth > layers_seen {
                    return Err(EditError::InvalidNPath(format!(
                        "scope depth {} exceeds the {} available layer(s)",
                        depth, layers_seen
                    )));
                }
                return Ok(cur);
            }
            _ => return Err(EditError::AmbiguousEditTarget),
        }
    }
}

// ---- set -------------------------------------------------------------------

fn set_at(
    source: &mut Source,
    target: NodeId,
    names: &[Name],
    value_id: NodeId,
) -> Result<(), EditError> {
    // An existing attrpath-derived leaf is always preferred.
    if let Some(leaf) = find_attrpath_leaf(source.tree(), target, names) {
        replace_binding_value(source.tree_mut(), leaf, value_id);
        return Ok(());
    }

    let mut cur = target;
    for (i, name) in names.iter().enumerate() {
        let is_last = i + 1 == names.len();
        match find_member_binding(source.tree(), cur, name) {
            Some(binding) => {
                if is_last {
                    return update_binding(source, binding, value_id);
                }
                let value = binding_value(source.tree(), binding)
                    .ok_or_else(|| EditError::NotAnAttributeSet(name.text.clone()))?;
                match source.tree().expr(value) {
                    Expr::AttrSet(_) => cur = value,
                    _ => return Err(EditError::NotAnAttributeSet(name.text.clone())),
                }
            }
            None => return create_missing(source, cur, &names[i..], value_id),
        }
    }
    Ok(())
}

/// Update an existing binding. Identifier values are written through to
/// their defining binding; when resolution fails the identifier itself is
/// overwritten (the documented fallback).
fn update_binding(
    source: &mut Source,
    binding: NodeId,
    value_id: NodeId,
) -> Result<(), EditError> {
    let tree = source.tree();
    let nested = matches!(tree.expr(binding), Expr::Binding(b) if b.nested);
    let old_value = binding_value(tree, binding);
    if let Some(old_value) = old_value {
        if !nested && matches!(tree.expr(old_value), Expr::Ident(_)) {
            if let Ok(resolved) = scope::resolve(tree, old_value) {
                if let Some(defining) = resolved.binding {
                    if defining != binding {
                        replace_binding_value(source.tree_mut(), defining, value_id);
                        return Ok(());
                    }
                }
            }
        }
    }
    replace_binding_value(source.tree_mut(), binding, value_id);
    Ok(())
}

/// Create the missing tail of a path: attrpath-style when extending an
/// attrpath-derived synthetic set, explicit nested sets otherwise.
fn create_missing(
    source: &mut Source,
    cur: NodeId,
    rest: &[Name],
    value_id: NodeId,
) -> Result<(), EditError> {
    if let Some((owner, prefix)) = attrpath_owner_of(source.tree(), cur) {
        let mut full_path = prefix;
        full_path.extend(rest.iter().cloned());
        extend_attrpath(source.tree_mut(), owner, cur, full_path, rest, value_id);
        return Ok(());
    }

    // Build the explicit chain inside out.
    let tree = source.tree_mut();
    let mut innermost = value_id;
    for name in rest.iter().skip(1).rev() {
        let binding = tree.alloc(Expr::Binding(Binding {
            name: name.clone(),
            value: innermost,
            nested: false,
        }));
        tree.set_parent(innermost, Some(binding));
        let set = tree.alloc(Expr::AttrSet(AttrSet {
            members: vec![binding],
            layout: vec![SetItem::Member(binding)],
            ..AttrSet::empty()
        }));
        tree.set_parent(binding, Some(set));
        innermost = set;
    }
    append_plain_member(tree, cur, rest[0].clone(), innermost);
    Ok(())
}

/// The explicit owner set and path prefix of an attrpath-derived synthetic
/// set, or `None` when `cur` is not an attrpath intermediate (explicit
/// sets, `let` binding regions).
fn attrpath_owner_of(tree: &Tree, cur: NodeId) -> Option<(NodeId, Vec<Name>)> {
    match tree.expr(cur) {
        Expr::AttrSet(set) if set.synthetic => {}
        _ => return None,
    }
    let mut prefix = Vec::new();
    let mut set_id = cur;
    loop {
        let binding = tree.parent(set_id)?;
        match tree.expr(binding) {
            Expr::Binding(b) if b.nested => prefix.push(b.name.clone()),
            // A synthetic set whose parent is not a nested binding is a
            // `let` binding region, not an attrpath intermediate.
            _ => return None,
        }
        let container = tree.parent(binding)?;
        match tree.expr(container) {
            Expr::AttrSet(set) if set.synthetic => set_id = container,
            Expr::AttrSet(_) => {
                prefix.reverse();
                return Some((container, prefix));
            }
            _ => return None,
        }
    }
}

/// Register a new attrpath leaf (and any missing synthetic intermediates)
/// on its explicit owner, keeping it next to its family in the layout.
fn extend_attrpath(
    tree: &mut Tree,
    owner: NodeId,
    cur: NodeId,
    full_path: Vec<Name>,
    rest: &[Name],
    value_id: NodeId,
) {
    let mut container = cur;
    for name in &rest[..rest.len() - 1] {
        let set = tree.alloc(Expr::AttrSet(AttrSet::synthetic()));
        let binding = tree.alloc(Expr::Binding(Binding {
            name: name.clone(),
            value: set,
            nested: true,
        }));
        tree.set_parent(set, Some(binding));
        tree.set_parent(binding, Some(container));
        if let Expr::AttrSet(set_expr) = tree.expr_mut(container) {
            set_expr.members.push(binding);
        }
        container = set;
    }

    let leaf_name = full_path.last().cloned().unwrap_or_else(|| Name::plain(""));
    let leaf = tree.alloc(Expr::Binding(Binding {
        name: leaf_name,
        value: value_id,
        nested: true,
    }));
    tree.set_parent(value_id, Some(leaf));
    tree.set_parent(leaf, Some(container));
    if let Expr::AttrSet(set_expr) = tree.expr_mut(container) {
        set_expr.members.push(leaf);
    }

    let owner_multiline = matches!(tree.expr(owner), Expr::AttrSet(s) if s.multiline);
    if owner_multiline {
        tree.before_mut(leaf).push(Trivia::LineBreak);
    }

    let head = full_path.first().and_then(|n| n.key().map(str::to_string));
    if let Expr::AttrSet(set_expr) = tree.expr_mut(owner) {
        set_expr.attrpath_order.push(AttrpathEntry {
            path: full_path,
            leaf,
        });
        // Insert right after the last leaf sharing the head segment so
        // families stay together; append otherwise.
        let family_end = set_expr
            .layout
            .iter()
            .rposition(|item| match item {
                SetItem::Attrpath(other) => set_expr
                    .attrpath_order
                    .iter()
                    .find(|e| e.leaf == *other)
                    .and_then(|e| e.path.first())
                    .and_then(|n| n.key())
                    .map(str::to_string)
                    == head
                    && *other != leaf,
                SetItem::Member(_) => false,
            })
            .map(|idx| idx + 1);
        match family_end {
            Some(idx) => set_expr.layout.insert(idx, SetItem::Attrpath(leaf)),
            None => set_expr.layout.push(SetItem::Attrpath(leaf)),
        }
    }
}

fn append_plain_member(tree: &mut Tree, container: NodeId, name: Name, value_id: NodeId) {
    let binding = tree.alloc(Expr::Binding(Binding {
        name,
        value: value_id,
        nested: false,
    }));
    tree.set_parent(value_id, Some(binding));
    tree.set_parent(binding, Some(container));

    let multiline = matches!(tree.expr(container), Expr::AttrSet(s) if s.multiline);
    if multiline {
        tree.before_mut(binding).push(Trivia::LineBreak);
    }
    if let Expr::AttrSet(set) = tree.expr_mut(container) {
        set.members.push(binding);
        set.layout.push(SetItem::Member(binding));
    }
}

// ---- remove ----------------------------------------------------------------

fn remove_at(source: &mut Source, target: NodeId, names: &[Name]) -> Result<(), EditError> {
    if let Some(leaf) = find_attrpath_leaf(source.tree(), target, names) {
        remove_attrpath_leaf(source.tree_mut(), leaf);
        return Ok(());
    }

    let mut cur = target;
    for (i, name) in names.iter().enumerate() {
        let is_last = i + 1 == names.len();
        let binding = find_member_binding(source.tree(), cur, name)
            .ok_or_else(|| EditError::MissingKey(path_text(names)))?;
        if is_last {
            let nested = matches!(source.tree().expr(binding), Expr::Binding(b) if b.nested);
            if nested {
                remove_attrpath_leaf(source.tree_mut(), binding);
            } else {
                remove_plain_member(source.tree_mut(), cur, binding);
            }
            return Ok(());
        }
        let value = binding_value(source.tree(), binding)
            .ok_or_else(|| EditError::NotAnAttributeSet(name.text.clone()))?;
        match source.tree().expr(value) {
            Expr::AttrSet(_) => cur = value,
            _ => return Err(EditError::NotAnAttributeSet(name.text.clone())),
        }
    }
    Err(EditError::MissingKey(path_text(names)))
}

/// Remove an attrpath leaf: drop it from its container, unregister it from
/// the explicit owner, then prune emptied synthetic ancestors, stopping at
/// the first non-empty (or explicit) one.
fn remove_attrpath_leaf(tree: &mut Tree, leaf: NodeId) {
    let Some(container) = tree.parent(leaf) else {
        return;
    };
    if let Expr::AttrSet(set) = tree.expr_mut(container) {
        set.members.retain(|&m| m != leaf);
    }

    // The owner explicit set holds the order entry and layout slot.
    let mut owner = container;
    loop {
        let found = matches!(
            tree.expr(owner),
            Expr::AttrSet(set) if set.attrpath_order.iter().any(|e| e.leaf == leaf)
        );
        if found {
            if let Expr::AttrSet(set) = tree.expr_mut(owner) {
                set.attrpath_order.retain(|e| e.leaf != leaf);
                set.layout.retain(|item| !matches!(item, SetItem::Attrpath(l) if *l == leaf));
            }
            break;
        }
        match tree.parent(owner) {
            Some(parent) => owner = parent,
            None => break,
        }
    }

    // Prune upward through emptied synthetic sets.
    let mut cur = container;
    loop {
        let is_empty_synthetic = matches!(
            tree.expr(cur),
            Expr::AttrSet(set) if set.synthetic && set.members.is_empty()
        );
        if !is_empty_synthetic {
            break;
        }
        let Some(binding) = tree.parent(cur) else {
            break;
        };
        if !matches!(tree.expr(binding), Expr::Binding(b) if b.nested) {
            // A `let` binding region: nothing to prune above it.
            break;
        }
        let Some(grandparent) = tree.parent(binding) else {
            break;
        };
        if let Expr::AttrSet(set) = tree.expr_mut(grandparent) {
            set.members.retain(|&m| m != binding);
        }
        cur = grandparent;
    }
}

fn remove_plain_member(tree: &mut Tree, container: NodeId, member: NodeId) {
    if let Expr::AttrSet(set) = tree.expr_mut(container) {
        set.members.retain(|&m| m != member);
        set.layout
            .retain(|item| !matches!(item, SetItem::Member(m) if *m == member));
    }
}

/// Unwrap `let ... in body` when its binding region has been emptied,
/// re-homing the wrapper's leading and trailing trivia onto the surviving
/// body.
fn maybe_unwrap_let(source: &mut Source, scope_set: NodeId) {
    let tree = source.tree();
    let empty = matches!(
        tree.expr(scope_set),
        Expr::AttrSet(set) if set.synthetic && set.members.is_empty()
    );
    if !empty {
        return;
    }
    let Some(let_node) = tree.parent(scope_set) else {
        return;
    };
    let body = match tree.expr(let_node) {
        Expr::LetIn(let_in) if let_in.scope == scope_set => let_in.body,
        _ => return,
    };

    let before = tree.before(let_node).to_vec();
    let after = tree.after(let_node).to_vec();
    let parent = tree.parent(let_node);

    let tree = source.tree_mut();
    *tree.before_mut(body) = before;
    tree.after_mut(body).extend(after);
    match parent {
        Some(parent) => {
            tree.replace_child(parent, let_node, body);
        }
        None => {
            tree.set_parent(body, None);
            source.set_root(body);
        }
    }
    tracing::debug!("unwrapped emptied let wrapper");
}

// ---- shared helpers --------------------------------------------------------

fn segment_names(segments: &[Segment]) -> Vec<Name> {
    segments
        .iter()
        .map(|seg| {
            if seg.quoted || !is_bare_name(&seg.name) {
                Name::quoted(seg.name.clone())
            } else {
                Name::plain(seg.name.clone())
            }
        })
        .collect()
}

fn path_text(names: &[Name]) -> String {
    names
        .iter()
        .map(|n| n.render())
        .collect::<Vec<_>>()
        .join(".")
}

fn find_member_binding(tree: &Tree, container: NodeId, name: &Name) -> Option<NodeId> {
    let members = match tree.expr(container) {
        Expr::AttrSet(set) => &set.members,
        _ => return None,
    };
    members.iter().copied().find(|&m| match tree.expr(m) {
        Expr::Binding(b) => b.name.matches(name),
        _ => false,
    })
}

/// An attrpath-order entry on `target` whose full path equals `names`.
fn find_attrpath_leaf(tree: &Tree, target: NodeId, names: &[Name]) -> Option<NodeId> {
    let set = match tree.expr(target) {
        Expr::AttrSet(set) => set,
        _ => return None,
    };
    set.attrpath_order
        .iter()
        .find(|entry| {
            entry.path.len() == names.len()
                && entry
                    .path
                    .iter()
                    .zip(names)
                    .all(|(a, b)| a.matches(b))
        })
        .map(|entry| entry.leaf)
}

fn walk_to_binding(tree: &Tree, target: NodeId, names: &[Name]) -> Result<NodeId, EditError> {
    let mut cur = target;
    for (i, name) in names.iter().enumerate() {
        let binding = find_member_binding(tree, cur, name)
            .ok_or_else(|| EditError::MissingKey(path_text(names)))?;
        if i + 1 == names.len() {
            return Ok(binding);
        }
        let value =
            binding_value(tree, binding).ok_or_else(|| EditError::MissingKey(path_text(names)))?;
        match tree.expr(value) {
            Expr::AttrSet(_) => cur = value,
            _ => return Err(EditError::NotAnAttributeSet(name.text.clone())),
        }
    }
    Err(EditError::MissingKey(path_text(names)))
}

fn binding_value(tree: &Tree, binding: NodeId) -> Option<NodeId> {
    match tree.expr(binding) {
        Expr::Binding(b) => Some(b.value),
        _ => None,
    }
}

fn replace_binding_value(tree: &mut Tree, binding: NodeId, value_id: NodeId) {
    if let Expr::Binding(b) = tree.expr_mut(binding) {
        b.value = value_id;
    }
    tree.set_parent(value_id, Some(binding));
}

fn unwrap_parens_to_set(tree: &Tree, id: NodeId) -> Option<NodeId> {
    let mut cur = id;
    loop {
        match tree.expr(cur) {
            Expr::Paren(inner) => cur = *inner,
            Expr::AttrSet(_) => return Some(cur),
            _ => return None,
        }
    }
}
