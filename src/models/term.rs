//! Classification terms

use serde::{Deserialize, Serialize};

/// Identifier of a term inside a workspace
pub type TermId = u64;

/// A term as stored in one workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: TermId,
    pub taxonomy: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<TermId>,
}

/// Workspace-independent view of a source term
///
/// Parents are referenced by slug so the node can be resolved against any
/// other workspace's term store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermNode {
    pub taxonomy: String,
    pub slug: String,
    pub name: String,
    pub parent_slug: Option<String>,
}

impl TermNode {
    /// Build a node from a stored term, resolving the parent's slug against
    /// the rest of the taxonomy.
    pub fn from_term(term: &Term, taxonomy_terms: &[Term]) -> Self {
        let parent_slug = term.parent.and_then(|parent_id| {
            taxonomy_terms
                .iter()
                .find(|t| t.id == parent_id)
                .map(|t| t.slug.clone())
        });

        Self {
            taxonomy: term.taxonomy.clone(),
            slug: term.slug.clone(),
            name: term.name.clone(),
            parent_slug,
        }
    }
}
