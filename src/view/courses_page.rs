use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::api::CourseApi;
use crate::debounce::Debouncer;
use crate::models::{
    Course, CourseUpdateField, FileSelection, NewCourseRequest, UpdateCourseRequest, UserSummary,
};
use crate::store::KeyedStore;
use crate::view::notification::{Notification, NotificationLevel};

/// How a page action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed,
    /// Stopped by a local check before any request was sent.
    Rejected,
    /// Dropped because the same action was already in flight.
    Ignored,
}

#[derive(Default)]
struct PageState {
    courses: Vec<Course>,
    draft: NewCourseRequest,
    is_submitting: bool,
    in_flight: usize,
    create_modal_open: bool,
    pending_files: KeyedStore<FileSelection>,
    pending_updates: KeyedStore<UpdateCourseRequest>,
    query: String,
    search_results: Vec<UserSummary>,
    selected_course: Option<String>,
    add_member_open: bool,
    notifications: Vec<Notification>,
}

impl PageState {
    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification::new(level, message);
        match level {
            NotificationLevel::Success => info!("{}", notification.message),
            NotificationLevel::Warning => warn!("{}", notification.message),
            NotificationLevel::Error => error!("{}", notification.message),
        }
        self.notifications.push(notification);
    }
}

struct PageInner {
    api: Arc<dyn CourseApi>,
    search_delay: Duration,
    search: Debouncer,
    state: Mutex<PageState>,
}

impl PageInner {
    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks an action as in flight. `finish` releases it under the caller's
/// lock, together with the result; dropping it unfinished (a cancelled
/// action) releases it on its own.
struct InFlight {
    inner: Arc<PageInner>,
    submitting: bool,
    armed: bool,
}

impl InFlight {
    fn finish(mut self, state: &mut PageState) {
        self.release(state);
        self.armed = false;
    }

    fn release(&self, state: &mut PageState) {
        state.in_flight = state.in_flight.saturating_sub(1);
        if self.submitting {
            state.is_submitting = false;
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state();
            self.release(&mut state);
        }
    }
}

/// State and actions of the course management page.
///
/// The handle is cheap to clone; clones share state. The state lock is never
/// held across an `.await`, so concurrent actions interleave only at request
/// boundaries and each response is applied independently.
#[derive(Clone)]
pub struct CoursesPage {
    inner: Arc<PageInner>,
}

impl CoursesPage {
    pub fn new(api: Arc<dyn CourseApi>, search_delay: Duration) -> Self {
        Self {
            inner: Arc::new(PageInner {
                api,
                search_delay,
                search: Debouncer::new(),
                state: Mutex::new(PageState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.inner.state()
    }

    fn begin(&self, state: &mut PageState, submitting: bool) -> InFlight {
        state.in_flight += 1;
        if submitting {
            state.is_submitting = true;
        }
        InFlight {
            inner: self.inner.clone(),
            submitting,
            armed: true,
        }
    }

    /// Loads the course list once. A failure is logged and leaves the cache empty.
    pub async fn mount(&self) -> ActionOutcome {
        match self.inner.api.get_courses().await {
            Ok(courses) => {
                info!("Loaded {} courses", courses.len());
                self.state().courses = courses;
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error fetching courses: {}", e);
                ActionOutcome::Failed
            }
        }
    }

    /// Cancels the pending member search.
    pub fn unmount(&self) {
        self.inner.search.cancel();
    }

    pub fn open_create_modal(&self) {
        self.state().create_modal_open = true;
    }

    pub fn close_create_modal(&self) {
        self.state().create_modal_open = false;
    }

    pub fn set_draft(&self, draft: NewCourseRequest) {
        self.state().draft = draft;
    }

    pub fn edit_draft(&self, edit: impl FnOnce(&mut NewCourseRequest)) {
        edit(&mut self.state().draft);
    }

    pub async fn create_course(&self) -> ActionOutcome {
        let (draft, flight) = {
            let mut state = self.state();
            if state.is_submitting {
                debug!("Course creation already in progress, ignoring submit");
                return ActionOutcome::Ignored;
            }
            if let Err(e) = state.draft.validate() {
                state.notify(NotificationLevel::Warning, e.to_string());
                return ActionOutcome::Rejected;
            }
            let draft = state.draft.clone();
            let flight = self.begin(&mut state, true);
            (draft, flight)
        };

        let result = self.inner.api.create_course(&draft).await;
        let mut state = self.state();
        flight.finish(&mut state);
        match result {
            Ok(course) => {
                state.courses.push(course);
                state.draft = NewCourseRequest::default();
                state.create_modal_open = false;
                state.notify(NotificationLevel::Success, "Course created successfully");
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error creating course: {}", e);
                state.notify(NotificationLevel::Error, "Failed to create course");
                ActionOutcome::Failed
            }
        }
    }

    /// Removes the course from the cache once the server confirms the deletion.
    pub async fn delete_course(&self, course_id: &str) -> ActionOutcome {
        let flight = {
            let mut state = self.state();
            self.begin(&mut state, false)
        };

        let result = self.inner.api.delete_course(course_id).await;
        let mut state = self.state();
        flight.finish(&mut state);
        match result {
            Ok(_) => {
                state.courses.retain(|course| course.id != course_id);
                state.notify(NotificationLevel::Success, "Course deleted successfully");
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error deleting course {}: {}", course_id, e);
                state.notify(NotificationLevel::Error, "Failed to delete course");
                ActionOutcome::Failed
            }
        }
    }

    pub fn select_file(&self, course_id: &str, file: FileSelection) {
        self.state().pending_files.set(course_id, file);
    }

    pub fn clear_file(&self, course_id: &str) {
        self.state().pending_files.clear(course_id);
    }

    pub async fn upload_file(&self, course_id: &str) -> ActionOutcome {
        let (file, flight) = {
            let mut state = self.state();
            let Some(file) = state.pending_files.get(course_id).cloned() else {
                state.notify(NotificationLevel::Warning, "Please select a file to upload");
                return ActionOutcome::Rejected;
            };
            let flight = self.begin(&mut state, false);
            (file, flight)
        };

        let result = self.inner.api.upload_file(course_id, &file).await;
        let mut state = self.state();
        flight.finish(&mut state);
        match result {
            Ok(_) => {
                state.pending_files.clear(course_id);
                state.notify(NotificationLevel::Success, "File uploaded successfully");
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error uploading file: {}", e);
                state.notify(NotificationLevel::Error, "Failed to upload file");
                ActionOutcome::Failed
            }
        }
    }

    pub fn set_pending_update(&self, course_id: &str, field: CourseUpdateField) {
        self.state()
            .pending_updates
            .update(course_id, |draft| draft.apply(field));
    }

    pub fn reset_pending_update(&self, course_id: &str) {
        self.state().pending_updates.clear(course_id);
    }

    /// Sends the pending edits merged over the cached course. Neither the
    /// edit buffer nor the cached course is touched afterwards.
    pub async fn update_course(&self, course_id: &str) -> ActionOutcome {
        let (updates, flight) = {
            let mut state = self.state();
            let draft = state.pending_updates.get_or_default(course_id);
            let updates = match state.courses.iter().find(|course| course.id == course_id) {
                Some(course) => draft.merged_with(course),
                None => draft,
            };
            if let Err(e) = updates.validate() {
                state.notify(NotificationLevel::Warning, e.to_string());
                return ActionOutcome::Rejected;
            }
            let flight = self.begin(&mut state, false);
            (updates, flight)
        };

        let result = self.inner.api.update_course(course_id, &updates).await;
        let mut state = self.state();
        flight.finish(&mut state);
        match result {
            Ok(_) => {
                state.notify(NotificationLevel::Success, "Course updated successfully");
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error updating course: {}", e);
                state.notify(NotificationLevel::Error, "Failed to update course");
                ActionOutcome::Failed
            }
        }
    }

    /// Picks the course that new members are added to and opens the modal.
    pub fn open_add_member(&self, course_id: &str) {
        let mut state = self.state();
        state.selected_course = Some(course_id.to_string());
        state.add_member_open = true;
    }

    /// Closes the modal and drops any search still waiting for the quiet period.
    pub fn close_add_member(&self) {
        self.inner.search.cancel();
        self.state().add_member_open = false;
    }

    /// Updates the search query. A non-empty query schedules a remote search
    /// after the quiet period, replacing any search still waiting.
    pub fn set_query(&self, query: &str) {
        let query = query.to_string();
        self.state().query = query.clone();

        if query.is_empty() {
            self.inner.search.cancel();
            self.state().search_results.clear();
            return;
        }

        let page = Arc::downgrade(&self.inner);
        self.inner.search.schedule(self.inner.search_delay, async move {
            let Some(inner) = page.upgrade() else {
                return;
            };
            match inner.api.search_users(&query).await {
                Ok(users) => {
                    let mut state = inner.state();
                    if state.query == query {
                        debug!("Search for {:?} returned {} users", query, users.len());
                        state.search_results = users;
                    }
                }
                Err(e) => error!("Error searching users: {}", e),
            }
        });
    }

    /// Runs the member search right away, skipping the quiet period. Unlike
    /// the debounced search, a failure is reported to the caller.
    pub async fn search_now(&self, query: &str) -> ActionOutcome {
        self.inner.search.cancel();
        {
            let mut state = self.state();
            state.query = query.to_string();
            if query.is_empty() {
                state.search_results.clear();
                state.notify(NotificationLevel::Warning, "Please enter a search query");
                return ActionOutcome::Rejected;
            }
        }

        let result = self.inner.api.search_users(query).await;

        let mut state = self.state();
        match result {
            Ok(users) => {
                if state.query == query {
                    state.search_results = users;
                }
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error searching users: {}", e);
                state.notify(NotificationLevel::Error, "Failed to search users");
                ActionOutcome::Failed
            }
        }
    }

    pub async fn add_member(&self, username: &str) -> ActionOutcome {
        let (course_id, flight) = {
            let mut state = self.state();
            let Some(course_id) = state.selected_course.clone() else {
                state.notify(NotificationLevel::Warning, "No course selected");
                return ActionOutcome::Rejected;
            };
            let flight = self.begin(&mut state, false);
            (course_id, flight)
        };

        let result = self.inner.api.add_member(&course_id, username).await;
        if result.is_ok() {
            self.inner.search.cancel();
        }

        let mut state = self.state();
        flight.finish(&mut state);
        match result {
            Ok(_) => {
                state.query.clear();
                state.search_results.clear();
                state.add_member_open = false;
                state.notify(
                    NotificationLevel::Success,
                    format!("User {} added successfully to the course", username),
                );
                ActionOutcome::Succeeded
            }
            Err(e) => {
                error!("Error adding member: {}", e);
                state.notify(NotificationLevel::Error, "Failed to add member");
                ActionOutcome::Failed
            }
        }
    }

    pub fn courses(&self) -> Vec<Course> {
        self.state().courses.clone()
    }

    pub fn draft(&self) -> NewCourseRequest {
        self.state().draft.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().in_flight > 0
    }

    pub fn is_submitting(&self) -> bool {
        self.state().is_submitting
    }

    pub fn is_create_modal_open(&self) -> bool {
        self.state().create_modal_open
    }

    pub fn pending_file(&self, course_id: &str) -> Option<FileSelection> {
        self.state().pending_files.get(course_id).cloned()
    }

    pub fn pending_update(&self, course_id: &str) -> UpdateCourseRequest {
        self.state().pending_updates.get_or_default(course_id)
    }

    pub fn query(&self) -> String {
        self.state().query.clone()
    }

    pub fn search_results(&self) -> Vec<UserSummary> {
        self.state().search_results.clone()
    }

    pub fn is_search_pending(&self) -> bool {
        self.inner.search.is_pending()
    }

    pub fn selected_course(&self) -> Option<String> {
        self.state().selected_course.clone()
    }

    pub fn is_add_member_open(&self) -> bool {
        self.state().add_member_open
    }

    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.state().notifications)
    }
}
