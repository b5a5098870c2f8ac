//! ---
//! sgrid_section: "03-lifecycle-modeling"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Lifecycle naming, transition notation, and next-hop search."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Opaque lifecycle state name, e.g. `tomcat_started`.
pub type LifecycleState = String;

/// Bare identifier prefixing every state name of one lifecycle.
///
/// The name `tomcat` constrains all states of its machine to the shape
/// `tomcat_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LifecycleName(String);

impl LifecycleName {
    /// Validate and wrap a lifecycle name.
    pub fn new(name: impl Into<String>) -> Result<Self, LifecycleError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric())
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(LifecycleError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Enforce the `<name>_<suffix>` rule for one state name.
    ///
    /// The prefix must occur exactly once: the suffix is non-empty and may
    /// not itself open with another `<name>_` repetition.
    pub fn validate_state(&self, state: &str) -> Result<(), LifecycleError> {
        let violation = || LifecycleError::NamingViolation {
            name: self.0.clone(),
            state: state.to_owned(),
        };
        let suffix = state
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .ok_or_else(violation)?;
        if suffix.is_empty() {
            return Err(violation());
        }
        let repeated = suffix
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('_'));
        if repeated {
            return Err(violation());
        }
        Ok(())
    }

    /// Build a state name from a suffix, e.g. `tomcat` + `started`.
    pub fn state(&self, suffix: &str) -> LifecycleState {
        format!("{}_{}", self.0, suffix)
    }
}

impl fmt::Display for LifecycleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LifecycleName {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LifecycleName> for String {
    fn from(value: LifecycleName) -> Self {
        value.0
    }
}
