use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_NUM_QUESTIONS: u8 = 1;
pub const MAX_NUM_QUESTIONS: u8 = 20;
const DEFAULT_NUM_QUESTIONS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailFrequency {
    #[default]
    Daily,
    Weekly,
}

impl EmailFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailFrequency::Daily => "daily",
            EmailFrequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for EmailFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailFrequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(EmailFrequency::Daily),
            "weekly" => Ok(EmailFrequency::Weekly),
            other => Err(AppError::Validation(format!(
                "email frequency must be daily or weekly, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email_frequency: EmailFrequency,
    pub num_questions: u8,
}

/// Draft for the create-course form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseRequest {
    pub name: String,
    pub email_frequency: EmailFrequency,
    pub num_questions: u8,
}

impl Default for NewCourseRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            email_frequency: EmailFrequency::Daily,
            num_questions: DEFAULT_NUM_QUESTIONS,
        }
    }
}

impl NewCourseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("course name is required".to_string()));
        }
        validate_num_questions(self.num_questions)
    }
}

/// Partial course update. Also used as the per-course pending-edit buffer,
/// where `None` means "not overridden".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_frequency: Option<EmailFrequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_questions: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseUpdateField {
    EmailFrequency(EmailFrequency),
    NumQuestions(u8),
}

impl UpdateCourseRequest {
    pub fn apply(&mut self, field: CourseUpdateField) {
        match field {
            CourseUpdateField::EmailFrequency(freq) => self.email_frequency = Some(freq),
            CourseUpdateField::NumQuestions(n) => self.num_questions = Some(n),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email_frequency.is_none() && self.num_questions.is_none()
    }

    /// Fills every field that is not overridden with the course's current value.
    pub fn merged_with(&self, course: &Course) -> UpdateCourseRequest {
        UpdateCourseRequest {
            email_frequency: Some(self.email_frequency.unwrap_or(course.email_frequency)),
            num_questions: Some(self.num_questions.unwrap_or(course.num_questions)),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self.num_questions {
            Some(n) => validate_num_questions(n),
            None => Ok(()),
        }
    }
}

fn validate_num_questions(n: u8) -> Result<(), AppError> {
    if (MIN_NUM_QUESTIONS..=MAX_NUM_QUESTIONS).contains(&n) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "number of questions must be between {} and {}, got {}",
            MIN_NUM_QUESTIONS, MAX_NUM_QUESTIONS, n
        )))
    }
}
