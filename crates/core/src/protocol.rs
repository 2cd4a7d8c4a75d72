//! Supervisor ⇄ worker message contract.
//!
//! A supervisor sends a [`TaskMessage`] ("task_assignment") per capability;
//! the worker answers with a [`CompletionMessage`] ("completion_report")
//! whose `related_message_id` points back at the assignment.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

pub const TASK_ASSIGNMENT: &str = "task_assignment";
pub const COMPLETION_REPORT: &str = "completion_report";

/// Current UTC time as ISO-8601 with a `Z` suffix.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_task_type() -> String {
    TASK_ASSIGNMENT.to_string()
}

fn default_report_type() -> String {
    COMPLETION_REPORT.to_string()
}

/// Task priority, constrained to `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::Validation(format!(
                "priority must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<i64> for Priority {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

/// Open, capability-specific parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Capability name.
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub parameters: TaskParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(default = "new_message_id")]
    pub message_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(rename = "type", default = "default_task_type")]
    pub message_type: String,
    pub task: Task,
    #[serde(default = "iso_now")]
    pub timestamp: String,
}

impl TaskMessage {
    pub fn new(
        sender: &str,
        recipient: &str,
        task_name: &str,
        parameters: Map<String, Value>,
        priority: Priority,
    ) -> Self {
        Self {
            message_id: new_message_id(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            message_type: default_task_type(),
            task: Task {
                name: task_name.to_string(),
                priority,
                parameters: TaskParameters { data: parameters },
            },
            timestamp: iso_now(),
        }
    }

    /// Fill in a fresh `message_id` when the sender left it empty.
    pub fn ensure_message_id(&mut self) {
        if self.message_id.trim().is_empty() {
            self.message_id = new_message_id();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Success,
    Failure,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "SUCCESS"),
            TaskStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    #[serde(default = "new_message_id")]
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    #[serde(rename = "type", default = "default_report_type")]
    pub message_type: String,
    pub related_message_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub results: Map<String, Value>,
    #[serde(default = "iso_now")]
    pub timestamp: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl CompletionMessage {
    /// Successful report answering `assignment`.
    pub fn success(sender: &str, assignment: &TaskMessage, results: Map<String, Value>) -> Self {
        Self {
            message_id: new_message_id(),
            sender: sender.to_string(),
            recipient: assignment.sender.clone(),
            message_type: default_report_type(),
            related_message_id: assignment.message_id.clone(),
            status: TaskStatus::Success,
            results,
            timestamp: iso_now(),
            error: None,
        }
    }

    /// Failed report answering `assignment`; results are always empty.
    pub fn failure(sender: &str, assignment: &TaskMessage, error: impl Into<String>) -> Self {
        Self {
            message_id: new_message_id(),
            sender: sender.to_string(),
            recipient: assignment.sender.clone(),
            message_type: default_report_type(),
            related_message_id: assignment.message_id.clone(),
            status: TaskStatus::Failure,
            results: Map::new(),
            timestamp: iso_now(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// `error` must be set exactly when the status is FAILURE.
    pub fn validate(&self) -> Result<()> {
        match (self.status, &self.error) {
            (TaskStatus::Success, Some(e)) => Err(Error::Validation(format!(
                "SUCCESS report carries an error: {}",
                e
            ))),
            (TaskStatus::Failure, None) => Err(Error::Validation(
                "FAILURE report is missing its error".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
