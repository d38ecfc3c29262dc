use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input problems that are always surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("{} invalid candidate(s): {}", .issues.len(), join_display(.issues))]
    InvalidCandidates { issues: Vec<CandidateIssue> },
    #[error("unknown dependency reference(s): {}", join_display(.references))]
    UnknownDependency { references: Vec<UnknownDependency> },
    #[error("dependency cycle(s): {}", format_cycles(.cycles))]
    DependencyCycle { cycles: Vec<Vec<String>> },
    #[error("invalid budget {value}: must be a finite, non-negative amount")]
    InvalidBudget { value: String },
    #[error("invalid sensitivity level {value}: must be finite and non-negative")]
    InvalidLevel { value: f64 },
    #[error("candidate set too large for solver: {count} candidates (max {max})")]
    TooManyCandidates { count: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateIssue {
    /// Position of the record in the submitted batch.
    pub index: usize,
    pub id: Option<String>,
    pub problem: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    MissingId,
    DuplicateId,
    NonPositiveCost { value: String },
    NegativeBenefit { value: String },
    Malformed { field: String, detail: String },
    SelfDependency,
    DependencyCycle { members: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownDependency {
    pub candidate: String,
    pub missing: String,
}

impl Display for CandidateIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = self
            .id
            .clone()
            .unwrap_or_else(|| format!("record #{}", self.index));
        match &self.problem {
            IssueKind::MissingId => write!(f, "record #{} has no id", self.index),
            IssueKind::DuplicateId => write!(f, "{label}: duplicate id"),
            IssueKind::NonPositiveCost { value } => {
                write!(f, "{label}: cost must be positive (got {value})")
            }
            IssueKind::NegativeBenefit { value } => {
                write!(f, "{label}: expected benefit must be >= 0 (got {value})")
            }
            IssueKind::Malformed { field, detail } => write!(f, "{label}: {field} {detail}"),
            IssueKind::SelfDependency => write!(f, "{label}: depends on itself"),
            IssueKind::DependencyCycle { members } => {
                write!(f, "{label}: part of cycle [{}]", members.join(", "))
            }
        }
    }
}

impl Display for UnknownDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.candidate, self.missing)
    }
}

fn join_display<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|members| format!("[{}]", members.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
