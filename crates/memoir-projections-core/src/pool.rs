//! Per-project registry of content identifiers.
//!
//! The pool holds no prose, only identifiers and the metadata needed to
//! filter them (contributor and tags per item).

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Membership {
    contributor_id: String,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPool {
    pub project_id: String,
    content_ids: Vec<String>,
    contributor_ids: BTreeSet<String>,
    tags: BTreeSet<String>,
    total_items: usize,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    memberships: HashMap<String, Membership>,
}

impl ContentPool {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            content_ids: Vec::new(),
            contributor_ids: BTreeSet::new(),
            tags: BTreeSet::new(),
            total_items: 0,
            last_updated: Utc::now(),
            memberships: HashMap::new(),
        }
    }

    /// Register a content item. Adding an id already present is a no-op.
    ///
    /// Returns `true` if the id was new.
    pub fn add(&mut self, content_id: &str, contributor_id: &str, tags: &[String]) -> bool {
        if self.memberships.contains_key(content_id) {
            return false;
        }
        self.content_ids.push(content_id.to_string());
        self.contributor_ids.insert(contributor_id.to_string());
        self.tags.extend(tags.iter().cloned());
        self.memberships.insert(
            content_id.to_string(),
            Membership {
                contributor_id: contributor_id.to_string(),
                tags: tags.to_vec(),
            },
        );
        self.total_items = self.content_ids.len();
        self.last_updated = Utc::now();
        true
    }

    /// Ids in the pool that are not in `baseline_ids`, in pool order.
    pub fn new_since(&self, baseline_ids: &[String]) -> Vec<String> {
        let baseline: HashSet<&str> = baseline_ids.iter().map(String::as_str).collect();
        self.content_ids
            .iter()
            .filter(|id| !baseline.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Ids matching every given filter, in pool order.
    ///
    /// An item matches the contributor filter when its contributor is in the
    /// list, and the tag filter when it carries every listed tag. `None`
    /// means "no restriction".
    pub fn filtered(
        &self,
        contributor_filter: Option<&[String]>,
        tag_filter: Option<&[String]>,
    ) -> Vec<String> {
        self.content_ids
            .iter()
            .filter(|id| {
                let Some(m) = self.memberships.get(id.as_str()) else {
                    return contributor_filter.is_none() && tag_filter.is_none();
                };
                let contributor_ok = contributor_filter
                    .map(|allowed| allowed.iter().any(|c| c == &m.contributor_id))
                    .unwrap_or(true);
                let tags_ok = tag_filter
                    .map(|required| required.iter().all(|t| m.tags.contains(t)))
                    .unwrap_or(true);
                contributor_ok && tags_ok
            })
            .cloned()
            .collect()
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.memberships.contains_key(content_id)
    }

    pub fn contributor_of(&self, content_id: &str) -> Option<&str> {
        self.memberships
            .get(content_id)
            .map(|m| m.contributor_id.as_str())
    }

    pub fn content_ids(&self) -> &[String] {
        &self.content_ids
    }

    pub fn contributor_ids(&self) -> &BTreeSet<String> {
        &self.contributor_ids
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}
