//! Skill catalog and plan validation.
//!
//! The catalog is a YAML document listing every skill the worker understands
//! together with its argument names:
//!
//! ```yaml
//! skills:
//!   - name: pour_liquid
//!     args: [source, target]
//!   - name: home
//!     args: []
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{Plan, SkillCall};

/// Reasons a plan is rejected before execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("[Step {step}] Unknown skill: '{skill}'")]
    UnknownSkill { step: usize, skill: String },

    #[error("[Step {step}] Skill '{skill}' expects {expected} arguments {expected_args:?}, but got {actual:?}")]
    ArityMismatch {
        step: usize,
        skill: String,
        expected: usize,
        expected_args: Vec<String>,
        actual: Vec<String>,
    },

    #[error("[Step {step}] Missing argument '{argument}' for skill '{skill}'")]
    MissingArgument {
        step: usize,
        skill: String,
        argument: String,
    },

    #[error("[Step {step}] Unexpected argument '{argument}' for skill '{skill}'")]
    UnexpectedArgument {
        step: usize,
        skill: String,
        argument: String,
    },

    #[error("Invalid skill catalog: {0}")]
    InvalidCatalog(String),
}

impl ValidationError {
    /// Step index the error refers to, if any
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::UnknownSkill { step, .. }
            | Self::ArityMismatch { step, .. }
            | Self::MissingArgument { step, .. }
            | Self::UnexpectedArgument { step, .. } => Some(*step),
            Self::InvalidCatalog(_) => None,
        }
    }
}

/// One skill as declared in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    skills: Vec<CatalogEntry>,
}

/// Known skills by name
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: HashMap<String, Vec<String>>,
}

impl SkillCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            skills: entries.into_iter().map(|e| (e.name, e.args)).collect(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ValidationError> {
        let document: CatalogDocument = serde_yaml::from_str(raw)
            .map_err(|e| ValidationError::InvalidCatalog(e.to_string()))?;
        Ok(Self::new(document.skills))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::InvalidCatalog(format!("{}: {e}", path.display()))
        })?;
        let catalog = Self::from_yaml_str(&raw)?;
        debug!(path = %path.display(), skills = catalog.len(), "Loaded skill catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn args_for(&self, skill: &str) -> Option<&[String]> {
        self.skills.get(skill).map(Vec::as_slice)
    }

    /// Check every call against the catalog and freeze the calls into a plan
    ///
    /// Checks run per step in order: unknown skill, argument count, missing
    /// argument, unexpected argument. The first failure wins.
    pub fn validate(&self, calls: Vec<SkillCall>) -> Result<Plan, ValidationError> {
        for (step, call) in calls.iter().enumerate() {
            self.check_call(step, call)?;
        }
        Ok(Plan::new(calls))
    }

    fn check_call(&self, step: usize, call: &SkillCall) -> Result<(), ValidationError> {
        let skill = &call.skill_name;
        let expected = self
            .args_for(skill)
            .ok_or_else(|| ValidationError::UnknownSkill {
                step,
                skill: skill.clone(),
            })?;

        if call.arguments.len() != expected.len() {
            return Err(ValidationError::ArityMismatch {
                step,
                skill: skill.clone(),
                expected: expected.len(),
                expected_args: expected.to_vec(),
                actual: call.arguments.keys().cloned().collect(),
            });
        }

        if let Some(missing) = expected.iter().find(|a| !call.arguments.contains_key(*a)) {
            return Err(ValidationError::MissingArgument {
                step,
                skill: skill.clone(),
                argument: missing.clone(),
            });
        }

        if let Some(extra) = call.arguments.keys().find(|a| !expected.contains(*a)) {
            return Err(ValidationError::UnexpectedArgument {
                step,
                skill: skill.clone(),
                argument: extra.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
skills:
  - name: pick
    args: [object]
  - name: pour_liquid
    args: [source, target]
  - name: home
    args: []
"#;

    fn catalog() -> SkillCatalog {
        SkillCatalog::from_yaml_str(CATALOG).unwrap()
    }

    #[test]
    fn test_valid_plan_passes_through() {
        let calls = vec![
            SkillCall::new("pick").with_argument("object", "tube_blue"),
            SkillCall::new("pour_liquid")
                .with_argument("source", "tube_blue")
                .with_argument("target", "beaker_1"),
            SkillCall::new("home"),
        ];
        let plan = catalog().validate(calls.clone()).unwrap();
        assert_eq!(plan.calls(), calls.as_slice());
    }

    #[test]
    fn test_unknown_skill_names_step() {
        let calls = vec![SkillCall::new("home"), SkillCall::new("teleport")];
        let err = catalog().validate(calls).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownSkill {
                step: 1,
                skill: "teleport".into()
            }
        );
        assert_eq!(err.to_string(), "[Step 1] Unknown skill: 'teleport'");
    }

    #[test]
    fn test_arity_checked_before_names() {
        let calls = vec![SkillCall::new("pour_liquid").with_argument("source", "a")];
        let err = catalog().validate(calls).unwrap_err();
        assert!(matches!(err, ValidationError::ArityMismatch { expected: 2, .. }));
        assert_eq!(err.step(), Some(0));
    }

    #[test]
    fn test_missing_argument_with_matching_arity() {
        let calls = vec![SkillCall::new("pour_liquid")
            .with_argument("source", "a")
            .with_argument("volume", "5ml")];
        let err = catalog().validate(calls).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingArgument {
                step: 0,
                skill: "pour_liquid".into(),
                argument: "target".into()
            }
        );
    }

    #[test]
    fn test_empty_plan_is_valid() {
        assert!(catalog().validate(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_catalog() {
        let err = SkillCatalog::from_yaml_str("skills: 3").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCatalog(_)));
    }
}
