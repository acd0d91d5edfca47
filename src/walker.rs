//! The walker (spec §4.C): matches a [`PathPattern`](crate::path::PathPattern)
//! against a [`Tree`], deterministically.
//!
//! Two entry points, matching the two shapes command dispatch needs:
//!
//! - [`resolve_many`] walks every existing node the pattern can match,
//!   depth-first, children visited in identifier order (`BTreeMap` order).
//!   Used by the multi-target commands (`put_many`, `delete_many`, reads).
//! - [`resolve_one`] is for single-target commands. It requires
//!   [`crate::path::require_specific`] to have already passed, descends the
//!   pinned identifier chain regardless of whether intermediate nodes exist,
//!   and evaluates only the final component -- so a pattern like
//!   `/stock/wood/oak` combined with `NodeExists(false)` can express "this
//!   path, which may not exist yet".

use crate::error::StoreError;
use crate::path::{require_specific, Component, NodeIdent, Path, PathPattern};
use crate::tree::{Tree, TreeNode};

/// One match produced by [`resolve_many`].
#[derive(Debug, Clone)]
pub struct Matched {
    pub path: Path,
}

/// Walk `pattern` against `tree`, depth-first, in identifier order.
///
/// # Errors
/// Propagates a malformed `NameRegex` pattern as `MismatchingNode`.
pub fn resolve_many(tree: &Tree, pattern: &PathPattern) -> Result<Vec<Matched>, StoreError> {
    let mut out = Vec::new();
    walk(&tree.root, &[], pattern, &mut out)?;
    Ok(out)
}

fn walk(
    node: &TreeNode,
    prefix: &[NodeIdent],
    pattern: &[Component],
    out: &mut Vec<Matched>,
) -> Result<(), StoreError> {
    let Some((head, rest)) = pattern.split_first() else {
        out.push(Matched {
            path: prefix.to_vec(),
        });
        return Ok(());
    };

    match head {
        Component::WildcardAnyDepth => {
            // Zero levels consumed.
            walk(node, prefix, rest, out)?;
            // One or more levels consumed: descend, keeping `**` active.
            for (name, child) in &node.children {
                let child_prefix = Tree::join(prefix, name);
                walk(child, &child_prefix, pattern, out)?;
            }
        }
        Component::Literal(id) => {
            if let Some(child) = node.children.get(id) {
                let child_prefix = Tree::join(prefix, id);
                walk(child, &child_prefix, rest, out)?;
            }
        }
        Component::WildcardOne => {
            for (name, child) in &node.children {
                let child_prefix = Tree::join(prefix, name);
                walk(child, &child_prefix, rest, out)?;
            }
        }
        Component::Cond(cond) => {
            for (name, child) in &node.children {
                if cond.matches(Some(child), name)? {
                    let child_prefix = Tree::join(prefix, name);
                    walk(child, &child_prefix, rest, out)?;
                }
            }
        }
    }
    Ok(())
}

/// The outcome of resolving a specific pattern to a single candidate path.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The fully pinned path the pattern resolves to, whether or not a node
    /// currently exists there.
    pub path: Path,
    /// Whether every ancestor on `path` exists.
    pub ancestors_exist: bool,
    /// Whether the final component's condition (or plain existence, for a
    /// bare literal) is satisfied.
    pub matched: bool,
}

/// Resolve a pattern already known to be [`crate::path::is_specific`] to its
/// single candidate path, without requiring the target (or its ancestors)
/// to exist.
///
/// # Errors
/// `NotSpecific` if `pattern` is not specific; propagates malformed
/// `NameRegex` patterns as `MismatchingNode`.
pub fn resolve_one(tree: &Tree, pattern: &PathPattern) -> Result<Resolution, StoreError> {
    require_specific(pattern)?;

    let mut path = Path::new();
    let mut cursor: Option<&TreeNode> = Some(&tree.root);
    let mut ancestors_exist = true;

    for component in &pattern[..pattern.len().saturating_sub(1)] {
        let id = pinned_ident(component);
        path.push(id.clone());
        cursor = cursor.and_then(|n| n.children.get(&id));
        if cursor.is_none() {
            ancestors_exist = false;
        }
    }

    let Some(last) = pattern.last() else {
        // Empty pattern: the root itself.
        return Ok(Resolution {
            path,
            ancestors_exist: true,
            matched: true,
        });
    };

    let last_id = pinned_ident(last);
    path.push(last_id.clone());
    let existing = cursor.and_then(|n| n.children.get(&last_id));

    let matched = match last {
        Component::Literal(_) => existing.is_some(),
        Component::Cond(cond) => cond.matches(existing, &last_id)?,
        Component::WildcardOne | Component::WildcardAnyDepth => {
            unreachable!("require_specific rejects bare wildcards")
        }
    };

    Ok(Resolution {
        path,
        ancestors_exist,
        matched,
    })
}

/// Extract the identifier a specific component is pinned to.
fn pinned_ident(component: &Component) -> NodeIdent {
    match component {
        Component::Literal(id) => id.clone(),
        Component::Cond(cond) => pinned_ident_from_condition(cond)
            .expect("is_specific guarantees a pinning NameEquals"),
        Component::WildcardOne | Component::WildcardAnyDepth => {
            unreachable!("require_specific rejects bare wildcards")
        }
    }
}

fn pinned_ident_from_condition(cond: &crate::path::Condition) -> Option<NodeIdent> {
    use crate::path::Condition;
    match cond {
        Condition::NameEquals(id) => Some(id.clone()),
        Condition::All(conds) => conds.iter().find_map(pinned_ident_from_condition),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{combine, parse_string, Condition};
    use crate::tree::Payload;

    fn build_tree() -> Tree {
        let mut t = Tree::new();
        let oak: Path = vec![
            NodeIdent::name("stock"),
            NodeIdent::name("wood"),
            NodeIdent::name("oak"),
        ];
        t.set_payload(&oak, Payload::Data(serde_json::json!(12)));
        t.ensure_path(&[
            NodeIdent::name("stock"),
            NodeIdent::name("wood"),
            NodeIdent::name("pine"),
        ]);
        t.ensure_path(&[
            NodeIdent::name("stock"),
            NodeIdent::name("metal"),
            NodeIdent::name("iron"),
        ]);
        t
    }

    #[test]
    fn resolve_many_wildcard_one() {
        let t = build_tree();
        let pattern = parse_string("/stock/wood/*").unwrap();
        let matches = resolve_many(&t, &pattern).unwrap();
        assert_eq!(matches.len(), 2);
        let mut last: Vec<&NodeIdent> = matches.iter().map(|m| m.path.last().unwrap()).collect();
        last.sort();
        assert_eq!(
            last,
            vec![&NodeIdent::name("oak"), &NodeIdent::name("pine")]
        );
    }

    #[test]
    fn resolve_many_wildcard_any_depth_includes_zero_levels() {
        let t = build_tree();
        let pattern = parse_string("/stock/**").unwrap();
        let matches = resolve_many(&t, &pattern).unwrap();
        // stock itself, wood, metal, oak, pine, iron = 6 nodes under and including /stock
        assert_eq!(matches.len(), 6);
        assert!(matches.iter().any(|m| m.path == vec![NodeIdent::name("stock")]));
    }

    #[test]
    fn resolve_one_reports_missing_target_without_creating_it() {
        let t = build_tree();
        let base = parse_string("/stock/wood/maple").unwrap();
        let pattern = combine(&base, vec![Condition::NodeExists(false)]);
        let res = resolve_one(&t, &pattern).unwrap();
        assert!(res.ancestors_exist);
        assert!(res.matched, "maple doesn't exist yet, so NodeExists(false) holds");
    }

    #[test]
    fn resolve_one_detects_existing_target() {
        let t = build_tree();
        let base = parse_string("/stock/wood/oak").unwrap();
        let pattern = combine(&base, vec![Condition::NodeExists(false)]);
        let res = resolve_one(&t, &pattern).unwrap();
        assert!(!res.matched, "oak exists, so NodeExists(false) fails");
    }

    #[test]
    fn resolve_one_missing_ancestor_is_reported() {
        let t = build_tree();
        let pattern = parse_string("/stock/plastic/pvc").unwrap();
        let res = resolve_one(&t, &pattern).unwrap();
        assert!(!res.ancestors_exist);
        assert!(!res.matched);
    }
}
