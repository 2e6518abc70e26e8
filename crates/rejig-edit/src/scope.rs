//! Lexical scope chains and identifier resolution.
//!
//! Scope is derived from parent links rather than stored back-pointers: a
//! node's chain is the ordered list of scope-introducing ancestors,
//! innermost first. `let…in` and `rec { }` contribute their own bindings,
//! `with ENV;` contributes the members of its (recursively resolved)
//! environment, and an applied lambda contributes its formals bound to the
//! matching argument fields or their defaults.

use std::collections::HashSet;

use rejig_tree::escape::unescape_string;
use rejig_tree::{Expr, NodeId, Param, ResolutionContext, Tree};

use crate::EditError;

/// One layer of a scope chain, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLayer {
    /// A binding container: a `let` binding region or a `rec { }` set.
    Bindings(NodeId),
    /// A `with` node whose environment is resolved lazily at lookup time.
    With(NodeId),
    /// A lambda whose formals are in scope for its body and defaults.
    Formals(NodeId),
}

/// The scope chain visible from `from`, innermost first.
pub fn scope_chain(tree: &Tree, from: NodeId) -> Vec<ScopeLayer> {
    let mut chain = Vec::new();
    let mut prev = from;
    let mut cur = tree.parent(from);
    while let Some(p) = cur {
        match tree.expr(p) {
            // `let` bindings see each other and the body sees them all.
            Expr::LetIn(let_in) => chain.push(ScopeLayer::Bindings(let_in.scope)),
            Expr::AttrSet(set) if set.recursive => chain.push(ScopeLayer::Bindings(p)),
            // Only the body is inside the `with`; the environment is not.
            Expr::With(with) if with.body == prev => chain.push(ScopeLayer::With(p)),
            Expr::Lambda(_) => chain.push(ScopeLayer::Formals(p)),
            _ => {}
        }
        prev = p;
        cur = tree.parent(p);
    }
    chain
}

/// A successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// The defining binding, when the name resolves to one (the
    /// write-through target). Absent for lambda formals bound to defaults
    /// or whole-argument binds.
    pub binding: Option<NodeId>,
    /// The resolved value expression.
    pub value: NodeId,
}

/// Resolve an identifier node to its defining binding, following
/// identifier aliases and `inherit` transitively. Terminates on cyclic
/// definitions with [`EditError::ReferenceCycle`].
pub fn resolve(tree: &Tree, ident: NodeId) -> Result<Resolved, EditError> {
    let name = match tree.expr(ident) {
        Expr::Ident(name) => name.clone(),
        // Anything else already is its own value.
        _ => {
            return Ok(Resolved {
                binding: None,
                value: ident,
            });
        }
    };
    let mut seen = HashSet::new();
    tracing::trace!(name = %name, "resolving identifier");
    resolve_at(tree, ident, &name, &mut seen)
}

/// Resolve against a previously captured context, failing explicitly when
/// the tree has been reparented since the context was taken.
pub fn resolve_with_context(
    tree: &Tree,
    ctx: &ResolutionContext,
    ident: NodeId,
) -> Result<Resolved, EditError> {
    if !tree.context_is_current(ctx) {
        return Err(EditError::StaleContext);
    }
    resolve(tree, ident)
}

fn resolve_at(
    tree: &Tree,
    at: NodeId,
    name: &str,
    seen: &mut HashSet<NodeId>,
) -> Result<Resolved, EditError> {
    for layer in scope_chain(tree, at) {
        match lookup_layer(tree, layer, name, seen)? {
            LayerHit::Found(resolved) => {
                if let Expr::Ident(next) = tree.expr(resolved.value) {
                    let key = resolved.binding.unwrap_or(resolved.value);
                    if !seen.insert(key) {
                        return Err(EditError::ReferenceCycle(name.to_string()));
                    }
                    let next = next.clone();
                    return resolve_at(tree, resolved.value, &next, seen);
                }
                return Ok(resolved);
            }
            // `inherit name;` aliases the same name from an outer layer.
            LayerHit::Alias => continue,
            LayerHit::None => continue,
        }
    }
    Err(EditError::UnboundIdentifier(name.to_string()))
}

enum LayerHit {
    Found(Resolved),
    Alias,
    None,
}

fn lookup_layer(
    tree: &Tree,
    layer: ScopeLayer,
    name: &str,
    seen: &mut HashSet<NodeId>,
) -> Result<LayerHit, EditError> {
    match layer {
        ScopeLayer::Bindings(container) => lookup_bindings(tree, container, name, seen),
        ScopeLayer::With(with_id) => {
            let env = match tree.expr(with_id) {
                Expr::With(with) => with.env,
                _ => return Ok(LayerHit::None),
            };
            let env_set = env_to_set(tree, env, seen)?;
            lookup_bindings(tree, env_set, name, seen)
        }
        ScopeLayer::Formals(lambda_id) => lookup_formals(tree, lambda_id, name),
    }
}

fn lookup_bindings(
    tree: &Tree,
    container: NodeId,
    name: &str,
    seen: &mut HashSet<NodeId>,
) -> Result<LayerHit, EditError> {
    let members = match tree.expr(container) {
        Expr::AttrSet(set) => &set.members,
        _ => return Ok(LayerHit::None),
    };
    for &member in members {
        match tree.expr(member) {
            Expr::Binding(b) => {
                if b.name.key() == Some(name) {
                    return Ok(LayerHit::Found(Resolved {
                        binding: Some(member),
                        value: b.value,
                    }));
                }
            }
            Expr::Inherit(inherit) => {
                if !inherit.names.iter().any(|&n| name_node_is(tree, n, name)) {
                    continue;
                }
                match inherit.from {
                    // `inherit (src) name;` defines name as src's member.
                    Some(from) => {
                        let from_set = env_to_set(tree, from, seen)?;
                        return match lookup_bindings(tree, from_set, name, seen)? {
                            LayerHit::Found(resolved) => Ok(LayerHit::Found(resolved)),
                            _ => Err(EditError::UnboundIdentifier(name.to_string())),
                        };
                    }
                    // `inherit name;` aliases the enclosing scope.
                    None => return Ok(LayerHit::Alias),
                }
            }
            _ => {}
        }
    }
    Ok(LayerHit::None)
}

fn lookup_formals(tree: &Tree, lambda_id: NodeId, name: &str) -> Result<LayerHit, EditError> {
    let param = match tree.expr(lambda_id) {
        Expr::Lambda(lambda) => &lambda.param,
        _ => return Ok(LayerHit::None),
    };
    let argument = application_argument(tree, lambda_id);

    match param {
        Param::Ident(formal) => {
            if formal != name {
                return Ok(LayerHit::None);
            }
            match argument {
                Some(arg) => Ok(LayerHit::Found(Resolved {
                    binding: None,
                    value: arg,
                })),
                None => Err(EditError::MissingParameter(name.to_string())),
            }
        }
        Param::Pattern(pat) => {
            if let Some(bind) = &pat.bind {
                if bind.name == name {
                    return match argument {
                        Some(arg) => Ok(LayerHit::Found(Resolved {
                            binding: None,
                            value: arg,
                        })),
                        None => Err(EditError::MissingParameter(name.to_string())),
                    };
                }
            }
            let Some(entry) = pat.entries.iter().find(|e| e.name == name) else {
                return Ok(LayerHit::None);
            };
            // Prefer the matching argument field, fall back to the default.
            if let Some(arg) = argument {
                if let Some(arg_set) = unwrap_parens_to_set(tree, arg) {
                    if let Expr::AttrSet(set) = tree.expr(arg_set) {
                        for &member in &set.members {
                            if let Expr::Binding(b) = tree.expr(member) {
                                if b.name.key() == Some(name) {
                                    return Ok(LayerHit::Found(Resolved {
                                        binding: Some(member),
                                        value: b.value,
                                    }));
                                }
                            }
                        }
                    }
                }
            }
            match entry.default {
                Some(default) => Ok(LayerHit::Found(Resolved {
                    binding: None,
                    value: default,
                })),
                None => Err(EditError::MissingParameter(name.to_string())),
            }
        }
    }
}

/// The argument this lambda is directly applied to, seen through
/// parentheses.
fn application_argument(tree: &Tree, lambda_id: NodeId) -> Option<NodeId> {
    let mut cur = lambda_id;
    loop {
        let parent = tree.parent(cur)?;
        match tree.expr(parent) {
            Expr::Paren(_) => cur = parent,
            Expr::Apply(apply) if apply.function == cur => return Some(apply.argument),
            _ => return None,
        }
    }
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

/// Resolve a `with` environment (or `inherit` source) down to an attribute
/// set, recursively through identifiers and parentheses.
fn env_to_set(
    tree: &Tree,
    env: NodeId,
    seen: &mut HashSet<NodeId>,
) -> Result<NodeId, EditError> {
    match tree.expr(env) {
        Expr::AttrSet(_) => Ok(env),
        Expr::Paren(inner) => env_to_set(tree, *inner, seen),
        Expr::Ident(name) => {
            let name = name.clone();
            let resolved = resolve_at(tree, env, &name, seen)?;
            env_to_set(tree, resolved.value, seen)
        }
        _ => Err(EditError::NotAnAttributeSet(
            "scope environment".to_string(),
        )),
    }
}

fn name_node_is(tree: &Tree, node: NodeId, name: &str) -> bool {
    match tree.expr(node) {
        Expr::Ident(text) => text == name,
        Expr::Str(text) => {
            text.len() >= 2
                && text.starts_with('"')
                && text.ends_with('"')
                && unescape_string(&text[1..text.len() - 1]) == name
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rejig_tree::{parse, render_value, RenderOptions, Source};

    fn rendered(tree: &Tree, id: NodeId) -> String {
        render_value(tree, id, &RenderOptions::default())
    }

    /// The body expression of a `let`/`with`/lambda chain at the root.
    fn body_of(source: &Source) -> NodeId {
        let tree = source.tree();
        let mut cur = source.root();
        loop {
            match tree.expr(cur) {
                Expr::LetIn(let_in) => cur = let_in.body,
                Expr::With(with) => cur = with.body,
                Expr::Lambda(lambda) => cur = lambda.body,
                Expr::Paren(inner) => cur = *inner,
                Expr::Apply(apply) => cur = apply.function,
                _ => return cur,
            }
        }
    }

    fn binding_name(tree: &Tree, binding: NodeId) -> String {
        match tree.expr(binding) {
            Expr::Binding(b) => b.name.text.clone(),
            other => panic!("expected binding, got {other:?}"),
        }
    }

    #[test]
    fn let_alias_resolves_to_defining_binding() {
        let source = parse("let x = 1; y = x; in y").unwrap();
        let tree = source.tree();
        let resolved = resolve(tree, body_of(&source)).unwrap();
        assert_eq!(rendered(tree, resolved.value), "1");
        assert_eq!(binding_name(tree, resolved.binding.unwrap()), "x");
    }

    #[test]
    fn reference_cycle_terminates() {
        let source = parse("let a = b; b = a; in a").unwrap();
        let tree = source.tree();
        assert!(matches!(
            resolve(tree, body_of(&source)),
            Err(EditError::ReferenceCycle(_))
        ));
    }

    #[test]
    fn self_reference_cycle_terminates() {
        let source = parse("let a = a; in a").unwrap();
        let tree = source.tree();
        assert!(matches!(
            resolve(tree, body_of(&source)),
            Err(EditError::ReferenceCycle(_))
        ));
    }

    #[test]
    fn rec_set_members_see_each_other() {
        let source = parse("rec { x = 1; y = x; }").unwrap();
        let tree = source.tree();
        let y_value = match tree.expr(source.root()) {
            Expr::AttrSet(set) => match tree.expr(set.members[1]) {
                Expr::Binding(b) => b.value,
                other => panic!("expected binding, got {other:?}"),
            },
            other => panic!("expected attrset, got {other:?}"),
        };
        let resolved = resolve(tree, y_value).unwrap();
        assert_eq!(rendered(tree, resolved.value), "1");
    }

    #[test]
    fn with_environment_resolves() {
        let source = parse("with { v = 2; }; v").unwrap();
        let tree = source.tree();
        let resolved = resolve(tree, body_of(&source)).unwrap();
        assert_eq!(rendered(tree, resolved.value), "2");
    }

    #[test]
    fn with_environment_through_identifier() {
        let source = parse("let env = { v = 2; }; in with env; v").unwrap();
        let tree = source.tree();
        let resolved = resolve(tree, body_of(&source)).unwrap();
        assert_eq!(rendered(tree, resolved.value), "2");
    }

    #[test]
    fn inherit_aliases_outer_scope() {
        let source = parse("let x = 1; in rec { inherit x; y = x; }").unwrap();
        let tree = source.tree();
        let y_value = match tree.expr(body_of(&source)) {
            Expr::AttrSet(set) => set
                .members
                .iter()
                .find_map(|&m| match tree.expr(m) {
                    Expr::Binding(b) if b.name.key() == Some("y") => Some(b.value),
                    _ => None,
                })
                .expect("y binding"),
            other => panic!("expected attrset, got {other:?}"),
        };
        let resolved = resolve(tree, y_value).unwrap();
        assert_eq!(rendered(tree, resolved.value), "1");
        assert_eq!(binding_name(tree, resolved.binding.unwrap()), "x");
    }

    #[test]
    fn inherit_from_resolves_into_source_set() {
        let source = parse("rec { src = { v = 5; }; inherit (src) v; y = v; }").unwrap();
        let tree = source.tree();
        let y_value = match tree.expr(source.root()) {
            Expr::AttrSet(set) => set
                .members
                .iter()
                .find_map(|&m| match tree.expr(m) {
                    Expr::Binding(b) if b.name.key() == Some("y") => Some(b.value),
                    _ => None,
                })
                .expect("y binding"),
            other => panic!("expected attrset, got {other:?}"),
        };
        let resolved = resolve(tree, y_value).unwrap();
        assert_eq!(rendered(tree, resolved.value), "5");
    }

    #[test]
    fn lambda_defaults_resolve() {
        let source = parse("{ a ? 1, b ? a }: b").unwrap();
        let tree = source.tree();
        let resolved = resolve(tree, body_of(&source)).unwrap();
        assert_eq!(rendered(tree, resolved.value), "1");
    }

    #[test]
    fn missing_parameter_is_reported() {
        let source = parse("{ a }: a").unwrap();
        let tree = source.tree();
        assert!(matches!(
            resolve(tree, body_of(&source)),
            Err(EditError::MissingParameter(name)) if name == "a"
        ));
    }

    #[test]
    fn applied_lambda_binds_formals_to_arguments() {
        let source = parse("({ pkgs }: pkgs) { pkgs = 3; }").unwrap();
        let tree = source.tree();
        let resolved = resolve(tree, body_of(&source)).unwrap();
        assert_eq!(rendered(tree, resolved.value), "3");
        assert!(resolved.binding.is_some());
    }

    #[test]
    fn unbound_identifier_is_reported() {
        let source = parse("x").unwrap();
        let tree = source.tree();
        assert!(matches!(
            resolve(tree, source.root()),
            Err(EditError::UnboundIdentifier(name)) if name == "x"
        ));
    }

    #[test]
    fn stale_context_fails_explicitly() {
        let mut source = parse("let x = 1; in x").unwrap();
        let body = body_of(&source);
        let ctx = source.tree().context_for(body);
        source.tree_mut().set_parent(body, None);
        assert!(matches!(
            resolve_with_context(source.tree(), &ctx, body),
            Err(EditError::StaleContext)
        ));
    }
}
