use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Course;

#[derive(Debug, Deserialize)]
pub struct CoursesResponse {
    pub courses: Vec<Course>,
}

/// Course endpoints answer either `{ "course": {...} }` or the bare course.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CourseResponse {
    Wrapped { course: Course },
    Bare(Course),
}

impl CourseResponse {
    pub fn into_course(self) -> Course {
        match self {
            CourseResponse::Wrapped { course } => course,
            CourseResponse::Bare(course) => course,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddMemberRequest<'a> {
    pub username: &'a str,
}

/// Picks the human-readable part of an error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "msg"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
