//! # Plans
//!
//! The plan executor's input: an ordered, immutable sequence of skill calls
//! produced by an external planner and checked against a [`SkillCatalog`].

mod catalog;

pub use catalog::{CatalogEntry, SkillCatalog, ValidationError};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named, parameterized action for the remote worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCall {
    pub skill_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl SkillCall {
    pub fn new(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Ordered skill calls; index is execution order
///
/// A plan never changes once built. The executor holds it for a whole run
/// and only ever reads `plan[step]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    calls: Vec<SkillCall>,
}

impl Plan {
    pub fn new(calls: Vec<SkillCall>) -> Self {
        Self { calls }
    }

    /// Parse the planner's JSON output: `[{"skill_name": .., "arguments": {..}}, ..]`
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<&SkillCall> {
        self.calls.get(step)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SkillCall> {
        self.calls.iter()
    }

    pub fn calls(&self) -> &[SkillCall] {
        &self.calls
    }
}

impl From<Vec<SkillCall>> for Plan {
    fn from(calls: Vec<SkillCall>) -> Self {
        Self::new(calls)
    }
}

impl FromIterator<SkillCall> for Plan {
    fn from_iter<I: IntoIterator<Item = SkillCall>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a SkillCall;
    type IntoIter = std::slice::Iter<'a, SkillCall>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
