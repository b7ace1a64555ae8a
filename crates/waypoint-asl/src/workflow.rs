use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Location of a state inside [`Workflow::branches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StatePosition {
  pub branch: usize,
  pub offset: usize,
}

/// A compiled workflow.
///
/// States are grouped into branches: straight runs of states linked by
/// `Next`. The first branch starts at `StartAt`; later ones start at
/// choice and catch targets. The index maps each state name to its place,
/// so dispatch by name doesn't search. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  comment: Option<String>,
  start_at: String,
  version: String,
  timeout_seconds: u64,
  branches: Vec<Vec<State>>,
  index: HashMap<String, StatePosition>,
}

impl Workflow {
  pub(crate) fn new(
    comment: Option<String>,
    start_at: String,
    version: String,
    timeout_seconds: u64,
    branches: Vec<Vec<State>>,
    index: HashMap<String, StatePosition>,
  ) -> Self {
    Self {
      comment,
      start_at,
      version,
      timeout_seconds,
      branches,
      index,
    }
  }

  pub fn comment(&self) -> Option<&str> {
    self.comment.as_deref()
  }

  pub fn start_at(&self) -> &str {
    &self.start_at
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Zero means no overall timeout.
  pub fn timeout_seconds(&self) -> u64 {
    self.timeout_seconds
  }

  pub fn branches(&self) -> &[Vec<State>] {
    &self.branches
  }

  #[cfg(test)]
  pub(crate) fn position(&self, name: &str) -> Option<StatePosition> {
    self.index.get(name).copied()
  }

  pub fn state(&self, name: &str) -> Option<&State> {
    let position = self.index.get(name)?;
    self.branches.get(position.branch)?.get(position.offset)
  }

  pub fn start(&self) -> Option<&State> {
    self.state(&self.start_at)
  }

  /// All states, branch by branch.
  pub fn states(&self) -> impl Iterator<Item = &State> {
    self.branches.iter().flatten()
  }

  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }
}
