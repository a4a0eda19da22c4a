use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branch_path;
use super::document::CalculatorDocument;
use super::result::CalculationResult;
use crate::error::{Error, Result};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// A saved snapshot without its payload, as listed in the project tree.
///
/// Snapshots link to their parent through `parent_id`; roots have none.
/// `branch_path` is a human label (`A`, `A-B`, …) unique across the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    pub branch_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A saved document together with the result computed for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(flatten)]
    pub summary: ProjectSummary,
    #[serde(rename = "input")]
    pub document: CalculatorDocument,
    pub result: CalculationResult,
}

impl ProjectSnapshot {
    pub fn id(&self) -> Uuid {
        self.summary.id
    }

    pub fn meta(&self) -> ProjectMeta {
        ProjectMeta {
            name: self.summary.name.clone(),
            description: self.summary.description.clone(),
        }
    }
}

/// User-facing name and description of a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ProjectMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::validation(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Input for creating a root snapshot or overwriting an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProjectInput {
    #[serde(flatten)]
    pub meta: ProjectMeta,
    pub input: CalculatorDocument,
}

/// Input for branching off an existing snapshot; the document is inherited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBranchInput {
    #[serde(flatten)]
    pub meta: ProjectMeta,
}

/// Every id removed by one cascading delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedProjects {
    pub deleted_ids: Vec<Uuid>,
}

/// Whether a save creates a new root snapshot or overwrites the current one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Create,
    Update,
}

/// A snapshot summary with its nested children, used for tree responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectNode {
    pub project: ProjectSummary,
    pub children: Vec<ProjectNode>,
}

impl ProjectNode {
    /// This node and all of its descendants, depth first.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &ProjectSummary> + '_> {
        Box::new(std::iter::once(&self.project).chain(self.children.iter().flat_map(|c| c.walk())))
    }
}

/// All saved snapshots linked into trees by `parent_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProjectForest {
    pub roots: Vec<ProjectNode>,
}

impl ProjectForest {
    /// Link flat summaries into a forest.
    ///
    /// A summary is a root when it has no parent or its parent is not in the
    /// set. Siblings are ordered by branch path, then creation time, then
    /// id, so the result depends only on the set of summaries. Anything not
    /// reachable from a root (a parent cycle) is left out.
    pub fn from_summaries(summaries: Vec<ProjectSummary>) -> Self {
        let ids: HashSet<Uuid> = summaries.iter().map(|s| s.id).collect();

        // Group summaries by parent_id
        let mut children_map: HashMap<Option<Uuid>, Vec<ProjectSummary>> = HashMap::new();
        for summary in summaries {
            let parent = summary.parent_id.filter(|p| ids.contains(p));
            children_map.entry(parent).or_default().push(summary);
        }
        for siblings in children_map.values_mut() {
            siblings.sort_by(|a, b| {
                branch_path::compare(&a.branch_path, &b.branch_path)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
        }

        // Recursively build tree starting from roots (parent_id = None)
        fn build_subtree(
            parent_id: Option<Uuid>,
            children_map: &HashMap<Option<Uuid>, Vec<ProjectSummary>>,
        ) -> Vec<ProjectNode> {
            children_map
                .get(&parent_id)
                .map(|siblings| {
                    siblings
                        .iter()
                        .map(|s| ProjectNode {
                            project: s.clone(),
                            children: build_subtree(Some(s.id), children_map),
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        Self {
            roots: build_subtree(None, &children_map),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectSummary> {
        self.roots.iter().flat_map(|root| root.walk())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn find(&self, id: Uuid) -> Option<&ProjectSummary> {
        self.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }
}
