//! Classification synchronizer
//!
//! Resolves the source record's terms against a target workspace by slug,
//! creating missing terms (ancestors first) and re-parenting existing ones
//! so the target hierarchy follows the source.

use super::context::TermTree;
use crate::error::AppError;
use crate::models::{Term, TermId, TermNode};
use crate::store::WorkspaceScope;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Terms of one taxonomy on the target, indexed by slug
struct TargetTerms<'a> {
    scope: &'a WorkspaceScope,
    taxonomy: &'a str,
    by_slug: HashMap<String, Term>,
}

impl<'a> TargetTerms<'a> {
    async fn load(scope: &'a WorkspaceScope, taxonomy: &'a str) -> Result<Self, AppError> {
        let terms = scope.store().list_terms(scope.workspace(), taxonomy).await?;
        Ok(Self {
            scope,
            taxonomy,
            by_slug: terms.into_iter().map(|t| (t.slug.clone(), t)).collect(),
        })
    }

    fn id_of(&self, slug: &str) -> Option<TermId> {
        self.by_slug.get(slug).map(|t| t.id)
    }

    async fn create(&mut self, node: &TermNode, parent: Option<TermId>) -> Result<TermId, AppError> {
        let id = self
            .scope
            .store()
            .create_term(self.scope.workspace(), self.taxonomy, &node.name, &node.slug, parent)
            .await?;

        debug!("Created term {} ({}) in {} on {}", node.slug, id, self.taxonomy, self.scope.workspace());
        self.by_slug.insert(
            node.slug.clone(),
            Term {
                id,
                taxonomy: self.taxonomy.to_string(),
                slug: node.slug.clone(),
                name: node.name.clone(),
                parent,
            },
        );
        Ok(id)
    }

    /// Resolve a node, creating it and any missing ancestors.
    /// Returns None when a creation failed; the failure is logged.
    async fn resolve(&mut self, node: &TermNode, tree: &TermTree) -> Option<TermId> {
        if let Some(id) = self.id_of(&node.slug) {
            return Some(id);
        }

        // Walk up until an ancestor exists on the target or the root is reached.
        let mut chain = vec![node.clone()];
        let mut next = node.parent_slug.clone();
        while let Some(slug) = next {
            if self.id_of(&slug).is_some() || chain.iter().any(|n| n.slug == slug) {
                break;
            }
            match tree.node(&slug) {
                Some(parent) => {
                    next = parent.parent_slug.clone();
                    chain.push(parent.clone());
                }
                None => break,
            }
        }

        // Create from the top of the chain down.
        let mut created = None;
        for pending in chain.iter().rev() {
            if let Some(id) = self.id_of(&pending.slug) {
                created = Some(id);
                continue;
            }
            let parent = pending.parent_slug.as_deref().and_then(|slug| self.id_of(slug));
            match self.create(pending, parent).await {
                Ok(id) => created = Some(id),
                Err(e) => {
                    warn!(
                        "Could not create term {} in {} on {}: {}",
                        pending.slug, self.taxonomy, self.scope.workspace(), e
                    );
                    return None;
                }
            }
        }
        created
    }

    /// Give matched target terms the same parent as in the source tree
    async fn sync_parents(&mut self, tree: &TermTree) -> Result<(), AppError> {
        for node in &tree.all {
            let Some(term) = self.by_slug.get(&node.slug) else {
                continue;
            };
            let Some(parent_slug) = node.parent_slug.as_deref() else {
                continue;
            };
            let Some(parent_id) = self.id_of(parent_slug) else {
                continue;
            };
            if term.parent == Some(parent_id) || term.id == parent_id {
                continue;
            }

            let term_id = term.id;
            debug!("Re-parenting term {} under {} on {}", node.slug, parent_slug, self.scope.workspace());
            self.scope
                .store()
                .set_term_parent(self.scope.workspace(), self.taxonomy, term_id, Some(parent_id))
                .await?;
            if let Some(term) = self.by_slug.get_mut(&node.slug) {
                term.parent = Some(parent_id);
            }
        }
        Ok(())
    }
}

/// Resolve the source terms of one taxonomy on the scope's workspace
///
/// Returns the target term ids in source order without duplicates. Terms
/// that could not be created are left out.
pub async fn sync_taxonomy(
    scope: &WorkspaceScope,
    taxonomy: &str,
    tree: &TermTree,
) -> Result<Vec<TermId>, AppError> {
    let mut target = TargetTerms::load(scope, taxonomy).await?;

    let mut resolved = Vec::with_capacity(tree.assigned.len());
    for node in &tree.assigned {
        if let Some(id) = target.resolve(node, tree).await {
            if !resolved.contains(&id) {
                resolved.push(id);
            }
        }
    }

    target.sync_parents(tree).await?;
    Ok(resolved)
}

/// Build the source-side tree for one taxonomy
pub fn build_tree(assigned: &[Term], all: &[Term]) -> TermTree {
    TermTree {
        assigned: assigned.iter().map(|t| TermNode::from_term(t, all)).collect(),
        all: all.iter().map(|t| TermNode::from_term(t, all)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentStore, MemoryStore, StoreContext};
    use std::sync::Arc;

    fn node(slug: &str, parent: Option<&str>) -> TermNode {
        TermNode {
            taxonomy: "category".to_string(),
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            parent_slug: parent.map(|p| p.to_string()),
        }
    }

    async fn store() -> (tempfile::TempDir, Arc<MemoryStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path()));
        store.add_workspace(1, "http://one.test").await;
        store.add_workspace(2, "http://two.test").await;
        (dir, store)
    }

    #[tokio::test]
    async fn test_creates_ancestors_first() {
        let (_dir, store) = store().await;
        let ctx = StoreContext::new(store.clone(), 1);
        let scope = ctx.switch_to(2);

        let tree = TermTree {
            assigned: vec![node("leaf", Some("mid"))],
            all: vec![node("root", None), node("mid", Some("root")), node("leaf", Some("mid"))],
        };

        let ids = sync_taxonomy(&scope, "category", &tree).await.unwrap();
        assert_eq!(ids.len(), 1);

        let terms = store.list_terms(2, "category").await.unwrap();
        let by_slug: HashMap<_, _> = terms.iter().map(|t| (t.slug.as_str(), t)).collect();
        assert_eq!(by_slug.len(), 3);
        assert_eq!(by_slug["leaf"].id, ids[0]);
        assert_eq!(by_slug["leaf"].parent, Some(by_slug["mid"].id));
        assert_eq!(by_slug["mid"].parent, Some(by_slug["root"].id));
        assert_eq!(by_slug["root"].parent, None);
        assert_eq!(by_slug["leaf"].name, "LEAF");
    }

    #[tokio::test]
    async fn test_second_pass_reuses_terms() {
        let (_dir, store) = store().await;
        let ctx = StoreContext::new(store.clone(), 1);
        let scope = ctx.switch_to(2);

        let tree = TermTree {
            assigned: vec![node("news", None), node("local", Some("news"))],
            all: vec![node("news", None), node("local", Some("news"))],
        };

        let first = sync_taxonomy(&scope, "category", &tree).await.unwrap();
        let second = sync_taxonomy(&scope, "category", &tree).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list_terms(2, "category").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reparents_existing_term() {
        let (_dir, store) = store().await;
        let news = store.create_term(2, "category", "News", "news", None).await.unwrap();
        let local = store.create_term(2, "category", "Local", "local", None).await.unwrap();

        let ctx = StoreContext::new(store.clone(), 1);
        let scope = ctx.switch_to(2);
        let tree = TermTree {
            assigned: vec![node("local", Some("news"))],
            all: vec![node("news", None), node("local", Some("news"))],
        };

        let ids = sync_taxonomy(&scope, "category", &tree).await.unwrap();
        assert_eq!(ids, vec![local]);

        let terms = store.list_terms(2, "category").await.unwrap();
        let local_term = terms.iter().find(|t| t.id == local).unwrap();
        assert_eq!(local_term.parent, Some(news));
    }

    #[tokio::test]
    async fn test_creation_failure_is_skipped() {
        let (_dir, store) = store().await;
        store.set_read_only(2, true).await;

        let ctx = StoreContext::new(store.clone(), 1);
        let scope = ctx.switch_to(2);
        let tree = TermTree {
            assigned: vec![node("news", None)],
            all: vec![node("news", None)],
        };

        let ids = sync_taxonomy(&scope, "category", &tree).await.unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_build_tree_resolves_parent_slugs() {
        let all = vec![
            Term { id: 1, taxonomy: "category".into(), slug: "news".into(), name: "News".into(), parent: None },
            Term { id: 2, taxonomy: "category".into(), slug: "local".into(), name: "Local".into(), parent: Some(1) },
        ];

        let tree = build_tree(&all[1..], &all);
        assert_eq!(tree.assigned, vec![TermNode {
            taxonomy: "category".into(),
            slug: "local".into(),
            name: "Local".into(),
            parent_slug: Some("news".into()),
        }]);
        assert_eq!(tree.node("news").unwrap().parent_slug, None);
    }
}
