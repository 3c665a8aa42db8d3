use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HustleError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Approved,
    Disputed,
    Expired,
}

impl TaskStatus {
    /// Index order matches the contract's `uint8 status`.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Approved,
        TaskStatus::Disputed,
        TaskStatus::Expired,
    ];

    pub fn from_index(index: u8) -> Result<Self, HustleError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| HustleError::InvalidInput(format!("unknown task status index {index}")))
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Approved => "Approved",
            TaskStatus::Disputed => "Disputed",
            TaskStatus::Expired => "Expired",
        }
    }

    /// Only a pending task moves, and it never moves back.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (
                TaskStatus::Pending,
                TaskStatus::Approved | TaskStatus::Disputed | TaskStatus::Expired
            )
        )
    }

    pub fn is_final(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskCategory {
    Development,
    Design,
    Writing,
    Marketing,
    Research,
    Other,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 6] = [
        TaskCategory::Development,
        TaskCategory::Design,
        TaskCategory::Writing,
        TaskCategory::Marketing,
        TaskCategory::Research,
        TaskCategory::Other,
    ];

    pub fn from_index(index: u8) -> Result<Self, HustleError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| HustleError::InvalidInput(format!("unknown task category index {index}")))
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskCategory::Development => "Development",
            TaskCategory::Design => "Design",
            TaskCategory::Writing => "Writing",
            TaskCategory::Marketing => "Marketing",
            TaskCategory::Research => "Research",
            TaskCategory::Other => "Other",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TaskCategory::Development => "Coding, apps, websites",
            TaskCategory::Design => "Logos, graphics, UI/UX",
            TaskCategory::Writing => "Articles, copywriting, blogs",
            TaskCategory::Marketing => "Social media, ads, SEO",
            TaskCategory::Research => "Data analysis, market research",
            TaskCategory::Other => "Anything else",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    Pending,
    WorkerWins,
    ClientWins,
}

impl DisputeStatus {
    pub const ALL: [DisputeStatus; 3] = [
        DisputeStatus::Pending,
        DisputeStatus::WorkerWins,
        DisputeStatus::ClientWins,
    ];

    pub fn from_index(index: u8) -> Result<Self, HustleError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| HustleError::InvalidInput(format!("unknown dispute status index {index}")))
    }

    pub fn label(self) -> &'static str {
        match self {
            DisputeStatus::Pending => "Pending",
            DisputeStatus::WorkerWins => "WorkerWins",
            DisputeStatus::ClientWins => "ClientWins",
        }
    }
}

/// Human label for a difficulty weight in `1..=1000`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyLabel {
    Simple,
    Moderate,
    Complex,
    Advanced,
    Expert,
}

impl DifficultyLabel {
    pub fn for_weight(weight: u16) -> Self {
        match weight {
            0..=100 => DifficultyLabel::Simple,
            101..=300 => DifficultyLabel::Moderate,
            301..=600 => DifficultyLabel::Complex,
            601..=800 => DifficultyLabel::Advanced,
            _ => DifficultyLabel::Expert,
        }
    }
}
