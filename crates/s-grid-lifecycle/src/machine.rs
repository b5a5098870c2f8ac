//! ---
//! sgrid_section: "03-lifecycle-modeling"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Lifecycle naming, transition notation, and next-hop search."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::name::{LifecycleName, LifecycleState};
use crate::text::{parse, LifecycleStateMachineText};

/// Immutable directed adjacency compiled from a notation text.
///
/// Children keep declaration order; the next-hop search result depends on
/// it, so the graph never reorders entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifecycleGraph {
    adjacency: IndexMap<String, Vec<String>>,
}

impl LifecycleGraph {
    /// Compile a notation text, validating every state against the
    /// lifecycle naming rule.
    pub fn compile(
        name: &LifecycleName,
        text: &LifecycleStateMachineText,
    ) -> Result<Self, LifecycleError> {
        let declarations = parse(text.as_str())?;
        let mut graph = Self::default();
        for (from, to) in &declarations.edges {
            name.validate_state(from)?;
            name.validate_state(to)?;
            graph.add_transition(from, to);
        }
        for state in &declarations.isolated {
            name.validate_state(state)?;
            graph.add_state(state);
        }
        Ok(graph)
    }

    fn add_state(&mut self, state: &str) {
        self.adjacency.entry(state.to_owned()).or_default();
    }

    fn add_transition(&mut self, from: &str, to: &str) {
        self.add_state(from);
        self.add_state(to);
        let children = self
            .adjacency
            .entry(from.to_owned())
            .or_default();
        if !children.iter().any(|child| child == to) {
            children.push(to.to_owned());
        }
    }

    pub fn contains(&self, state: &str) -> bool {
        self.adjacency.contains_key(state)
    }

    /// Children of a state in declaration order.
    pub fn children(&self, state: &str) -> Result<&[String], LifecycleError> {
        self.adjacency
            .get(state)
            .map(Vec::as_slice)
            .ok_or_else(|| LifecycleError::UnknownState(state.to_owned()))
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }
}

/// Serialized shape of a [`LifecycleStateMachine`]; the graph is
/// recompiled on deserialization so the compiled form never travels.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MachineSpec {
    name: LifecycleName,
    text: LifecycleStateMachineText,
    begin_state: LifecycleState,
    end_state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    properties: IndexMap<String, String>,
}

/// Lifecycle state machine of one service instance.
///
/// Holds begin/end anchors, the state most recently reached, free-form
/// string properties for out-of-band collaborators, and the compiled
/// transition graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MachineSpec", into = "MachineSpec")]
pub struct LifecycleStateMachine {
    name: LifecycleName,
    text: LifecycleStateMachineText,
    begin_state: LifecycleState,
    end_state: LifecycleState,
    current_state: Option<LifecycleState>,
    properties: IndexMap<String, String>,
    graph: LifecycleGraph,
}

impl PartialEq for LifecycleStateMachine {
    fn eq(&self, other: &Self) -> bool {
        // The graph is derived from the text; comparing it again would be
        // redundant.
        self.name == other.name
            && self.text == other.text
            && self.begin_state == other.begin_state
            && self.end_state == other.end_state
            && self.current_state == other.current_state
            && self.properties == other.properties
    }
}

impl LifecycleStateMachine {
    /// Compile a machine from its notation; fails on naming violations or
    /// anchors that were never declared.
    pub fn new(
        name: LifecycleName,
        text: LifecycleStateMachineText,
        begin_state: impl Into<LifecycleState>,
        end_state: impl Into<LifecycleState>,
    ) -> Result<Self, LifecycleError> {
        let begin_state = begin_state.into();
        let end_state = end_state.into();
        name.validate_state(&begin_state)?;
        name.validate_state(&end_state)?;
        let graph = LifecycleGraph::compile(&name, &text)?;
        for anchor in [&begin_state, &end_state] {
            if !graph.contains(anchor) {
                return Err(LifecycleError::UnknownState(anchor.clone()));
            }
        }
        Ok(Self {
            name,
            text,
            begin_state,
            end_state,
            current_state: None,
            properties: IndexMap::new(),
            graph,
        })
    }

    pub fn name(&self) -> &LifecycleName {
        &self.name
    }

    pub fn text(&self) -> &LifecycleStateMachineText {
        &self.text
    }

    pub fn begin_state(&self) -> &LifecycleState {
        &self.begin_state
    }

    pub fn end_state(&self) -> &LifecycleState {
        &self.end_state
    }

    pub fn graph(&self) -> &LifecycleGraph {
        &self.graph
    }

    /// State most recently reached, defaulting to the begin state.
    pub fn current_state(&self) -> &LifecycleState {
        self.current_state.as_ref().unwrap_or(&self.begin_state)
    }

    /// Record the state reached by an external actor.
    pub fn set_current_state(
        &mut self,
        state: impl Into<LifecycleState>,
    ) -> Result<(), LifecycleError> {
        let state = state.into();
        self.name.validate_state(&state)?;
        if !self.graph.contains(&state) {
            return Err(LifecycleError::UnknownState(state));
        }
        self.current_state = Some(state);
        Ok(())
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn is_begin_state(&self) -> bool {
        self.current_state() == &self.begin_state
    }

    pub fn is_end_state(&self) -> bool {
        self.current_state() == &self.end_state
    }

    pub fn is_state(&self, expected: &str) -> bool {
        self.current_state() == expected
    }

    /// Single next state on a path from the current state toward
    /// `desired`.
    ///
    /// Returns the current state itself when already there and `None` when
    /// `desired` is undeclared or unreachable. The walk keeps a visited
    /// set seeded with the current state and a stack of
    /// remaining-children lists, one per depth reached; on success the
    /// result is the first hop of the path actually taken.
    pub fn find_next(&self, desired: &str) -> Result<Option<LifecycleState>, LifecycleError> {
        let current = self.current_state();
        if current == desired {
            return Ok(Some(current.clone()));
        }
        if !self.graph.contains(desired) {
            return Ok(None);
        }

        let mut visited: HashSet<&str> = HashSet::from([current.as_str()]);
        let mut stack: Vec<&[String]> = vec![self.graph.children(current)?];
        let mut path: Vec<&String> = Vec::new();
        loop {
            let Some(&top) = stack.last() else {
                return Ok(None);
            };
            match top.iter().find(|child| !visited.contains(child.as_str())) {
                Some(child) if child == desired => {
                    let first_hop = path.first().copied().unwrap_or(child);
                    return Ok(Some(first_hop.clone()));
                }
                Some(child) => {
                    visited.insert(child.as_str());
                    let grandchildren = self.graph.children(child)?;
                    path.push(child);
                    stack.push(grandchildren);
                }
                None => {
                    stack.pop();
                    path.pop();
                }
            }
        }
    }
}

impl TryFrom<MachineSpec> for LifecycleStateMachine {
    type Error = LifecycleError;

    fn try_from(spec: MachineSpec) -> Result<Self, Self::Error> {
        let mut machine = Self::new(spec.name, spec.text, spec.begin_state, spec.end_state)?;
        if let Some(current) = spec.current_state {
            machine.set_current_state(current)?;
        }
        machine.properties = spec.properties;
        Ok(machine)
    }
}

impl From<LifecycleStateMachine> for MachineSpec {
    fn from(machine: LifecycleStateMachine) -> Self {
        Self {
            name: machine.name,
            text: machine.text,
            begin_state: machine.begin_state,
            end_state: machine.end_state,
            current_state: machine.current_state,
            properties: machine.properties,
        }
    }
}
