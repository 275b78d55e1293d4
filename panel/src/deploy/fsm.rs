//! Finite State Machine for a deploy conversation

use serde::{Deserialize, Serialize};

/// How the new content reaches the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMethod {
    /// Upload an archive that replaces the repository content
    Archive,
    /// Commit and push a working copy on the user's server
    Remote,
}

/// How a deploy ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NoChanges,
    /// `path_error` allows the user to pick another remote path
    Failed { path_error: bool },
    Cancelled,
}

/// Deploy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
    /// Waiting for the user to pick a method
    ChoosingMethod,

    /// Waiting for the archive upload
    CollectingArchive,

    /// Waiting for the absolute path on the server
    CollectingRemotePath,

    /// Waiting for the commit message
    CollectingCommitMessage(DeployMethod),

    /// Pipeline running; no further input accepted
    Executing(DeployMethod),

    Finished(Outcome),
}

/// Deploy event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    ChooseMethod(DeployMethod),
    ArchiveReceived,
    PathReceived,
    MessageReceived,
    Completed(Outcome),
    /// Retry the remote method with a different path
    ChangePath,
    Cancel,
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    stage: DeployStage,
}

impl DeployFsm {
    /// Create a new FSM waiting for a method choice
    pub fn new() -> Self {
        Self {
            stage: DeployStage::ChoosingMethod,
        }
    }

    /// Get current stage
    pub fn stage(&self) -> &DeployStage {
        &self.stage
    }

    pub fn is_executing(&self) -> bool {
        matches!(self.stage, DeployStage::Executing(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, DeployStage::Finished(_))
    }

    /// Process an event and transition stage
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_stage = match (&self.stage, &event) {
            // Cancel is accepted anywhere before the deploy has finished
            (DeployStage::Finished(_), DeployEvent::Cancel) => {
                return Err("Deploy already finished".to_string());
            }
            (_, DeployEvent::Cancel) => DeployStage::Finished(Outcome::Cancelled),

            // From ChoosingMethod
            (DeployStage::ChoosingMethod, DeployEvent::ChooseMethod(DeployMethod::Archive)) => {
                DeployStage::CollectingArchive
            }
            (DeployStage::ChoosingMethod, DeployEvent::ChooseMethod(DeployMethod::Remote)) => {
                DeployStage::CollectingRemotePath
            }

            // Collecting inputs
            (DeployStage::CollectingArchive, DeployEvent::ArchiveReceived) => {
                DeployStage::CollectingCommitMessage(DeployMethod::Archive)
            }
            (DeployStage::CollectingRemotePath, DeployEvent::PathReceived) => {
                DeployStage::CollectingCommitMessage(DeployMethod::Remote)
            }
            (DeployStage::CollectingCommitMessage(method), DeployEvent::MessageReceived) => {
                DeployStage::Executing(*method)
            }

            // From Executing
            (DeployStage::Executing(_), DeployEvent::Completed(outcome)) => {
                DeployStage::Finished(*outcome)
            }

            // Path recovery
            (
                DeployStage::Finished(Outcome::Failed { path_error: true }),
                DeployEvent::ChangePath,
            ) => DeployStage::CollectingRemotePath,

            // Invalid transitions
            (stage, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", stage, event));
            }
        };

        self.stage = new_stage;
        Ok(())
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
