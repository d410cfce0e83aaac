use std::sync::Mutex;

use tracing::info;

pub const LOGIN_PATH: &str = "/login";

pub fn previous_questions_path(course_id: &str) -> String {
    format!("/courses/{}/previous-questions", course_id)
}

/// Performs forced page transitions, e.g. back to the login entry point.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Logs the redirect. Used where there is no page to leave.
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect(&self, path: &str) {
        info!("Redirecting to {}", path);
    }
}

/// Keeps every redirect in order.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());
    }
}
