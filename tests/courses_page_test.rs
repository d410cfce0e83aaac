use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use course_manager::api::CourseApi;
use course_manager::error::AppError;
use course_manager::models::{
    Course, CourseUpdateField, Credentials, EmailFrequency, FileSelection, LoginResponse,
    NewCourseRequest, Profile, RegisterRequest, UpdateCourseRequest, UserSummary,
};
use course_manager::view::{ActionOutcome, CoursesPage, NotificationLevel};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::time::Instant;

const SEARCH_DELAY: Duration = Duration::from_millis(300);

/// In-memory `CourseApi` that records every call it receives.
#[derive(Default)]
struct MockCourseApi {
    courses: Mutex<Vec<Course>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    update_payloads: Mutex<Vec<(String, UpdateCourseRequest)>>,
    searches: Mutex<Vec<(String, Instant)>>,
    added_members: Mutex<Vec<(String, String)>>,
    latency: Duration,
}

impl MockCourseApi {
    fn with_courses(courses: Vec<Course>) -> Self {
        Self {
            courses: Mutex::new(courses),
            ..Default::default()
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == operation).count()
    }

    async fn call(&self, operation: &'static str) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.lock().unwrap().contains(operation) {
            return Err(AppError::Request {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CourseApi for MockCourseApi {
    async fn register(&self, _user: &RegisterRequest) -> Result<Value, AppError> {
        self.call("register").await?;
        Ok(json!({}))
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AppError> {
        self.call("login").await?;
        Ok(LoginResponse {
            token: "tok".to_string(),
            user_id: credentials.username.clone(),
            extra: Default::default(),
        })
    }

    async fn logout(&self) {
        self.calls.lock().unwrap().push("logout".to_string());
    }

    async fn get_profile(&self) -> Result<Profile, AppError> {
        self.call("get_profile").await?;
        Ok(Profile::default())
    }

    async fn create_course(&self, course: &NewCourseRequest) -> Result<Course, AppError> {
        self.call("create_course").await?;
        let created = Course {
            id: uuid::Uuid::new_v4().to_string(),
            name: course.name.clone(),
            email_frequency: course.email_frequency,
            num_questions: course.num_questions,
        };
        self.courses.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn get_courses(&self) -> Result<Vec<Course>, AppError> {
        self.call("get_courses").await?;
        Ok(self.courses.lock().unwrap().clone())
    }

    async fn get_previous_questions(&self, _course_id: &str, _page: u32) -> Result<Value, AppError> {
        self.call("get_previous_questions").await?;
        Ok(json!({ "questions": [] }))
    }

    async fn submit_answers(
        &self,
        _course_id: &str,
        _user_id: &str,
        _answers: &Value,
    ) -> Result<Value, AppError> {
        self.call("submit_answers").await?;
        Ok(json!({}))
    }

    async fn get_personalized_questions(
        &self,
        _course_id: &str,
        _user_id: &str,
    ) -> Result<Value, AppError> {
        self.call("get_personalized_questions").await?;
        Ok(json!({ "questions": [] }))
    }

    async fn upload_file(&self, _course_id: &str, _file: &FileSelection) -> Result<Value, AppError> {
        self.call("upload_file").await?;
        Ok(json!({ "message": "uploaded" }))
    }

    async fn update_course(
        &self,
        course_id: &str,
        updates: &UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        self.update_payloads
            .lock()
            .unwrap()
            .push((course_id.to_string(), updates.clone()));
        self.call("update_course").await?;
        Ok(Course {
            id: course_id.to_string(),
            name: "updated".to_string(),
            email_frequency: updates.email_frequency.unwrap_or_default(),
            num_questions: updates.num_questions.unwrap_or(1),
        })
    }

    async fn add_member(&self, course_id: &str, username: &str) -> Result<Value, AppError> {
        self.call("add_member").await?;
        self.added_members
            .lock()
            .unwrap()
            .push((course_id.to_string(), username.to_string()));
        Ok(json!({ "message": "added" }))
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, AppError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), Instant::now()));
        self.call("search_users").await?;
        Ok(["alice", "alex", "bob"]
            .iter()
            .filter(|name| name.contains(query))
            .map(|name| UserSummary {
                id: format!("id-{}", name),
                username: name.to_string(),
                email: format!("{}@example.com", name),
            })
            .collect())
    }

    async fn delete_course(&self, _course_id: &str) -> Result<Value, AppError> {
        self.call("delete_course").await?;
        Ok(json!({ "message": "deleted" }))
    }
}

fn algebra() -> Course {
    Course {
        id: "1".to_string(),
        name: "Algebra".to_string(),
        email_frequency: EmailFrequency::Daily,
        num_questions: 5,
    }
}

fn physics() -> Course {
    Course {
        id: "2".to_string(),
        name: "Physics".to_string(),
        email_frequency: EmailFrequency::Weekly,
        num_questions: 3,
    }
}

async fn mounted_page(api: MockCourseApi) -> (CoursesPage, Arc<MockCourseApi>) {
    let api = Arc::new(api);
    let page = CoursesPage::new(api.clone(), SEARCH_DELAY);
    page.mount().await;
    (page, api)
}

fn geometry_draft() -> NewCourseRequest {
    NewCourseRequest {
        name: "Geometry".to_string(),
        email_frequency: EmailFrequency::Weekly,
        num_questions: 8,
    }
}

#[tokio::test]
async fn test_mount_loads_courses_once() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra(), physics()])).await;

    assert_eq!(page.courses(), vec![algebra(), physics()]);
    assert_eq!(api.count("get_courses"), 1);
}

#[tokio::test]
async fn test_mount_failure_leaves_cache_empty() {
    let api = MockCourseApi::with_courses(vec![algebra()]);
    api.fail_on("get_courses");

    let (page, api) = mounted_page(api).await;

    assert!(page.courses().is_empty());
    assert_eq!(api.count("get_courses"), 1);
    assert!(page.take_notifications().is_empty());
}

#[tokio::test]
async fn test_create_course_appends_and_resets_draft() {
    let (page, _api) = mounted_page(MockCourseApi::with_courses(vec![algebra()])).await;
    page.open_create_modal();
    page.set_draft(geometry_draft());

    let outcome = page.create_course().await;

    assert_eq!(outcome, ActionOutcome::Succeeded);
    let courses = page.courses();
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[1].name, "Geometry");
    assert_eq!(page.draft(), NewCourseRequest::default());
    assert!(!page.is_create_modal_open());
    assert!(!page.is_submitting());
    assert!(!page.is_loading());

    let notifications = page.take_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Success);
    assert_eq!(notifications[0].message, "Course created successfully");
}

#[tokio::test]
async fn test_create_course_failure_keeps_draft() {
    let api = MockCourseApi::with_courses(vec![algebra()]);
    api.fail_on("create_course");
    let (page, _api) = mounted_page(api).await;
    page.open_create_modal();
    page.set_draft(geometry_draft());

    let outcome = page.create_course().await;

    assert_eq!(outcome, ActionOutcome::Failed);
    assert_eq!(page.courses(), vec![algebra()]);
    assert_eq!(page.draft(), geometry_draft());
    assert!(page.is_create_modal_open());
    assert!(!page.is_submitting());

    let notifications = page.take_notifications();
    assert!(notifications[0].is_error());
    assert_eq!(notifications[0].message, "Failed to create course");
}

#[tokio::test(start_paused = true)]
async fn test_rapid_double_submit_sends_one_request() {
    let api = MockCourseApi::default().with_latency(Duration::from_millis(200));
    let (page, api) = mounted_page(api).await;
    page.set_draft(geometry_draft());

    let second = page.clone();
    let (first_outcome, second_outcome) = tokio::join!(page.create_course(), async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        second.create_course().await
    });

    assert_eq!(first_outcome, ActionOutcome::Succeeded);
    assert_eq!(second_outcome, ActionOutcome::Ignored);
    assert_eq!(api.count("create_course"), 1);
    assert_eq!(page.courses().len(), 1);
}

#[tokio::test]
async fn test_create_course_rejects_invalid_draft_locally() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;
    page.edit_draft(|draft| draft.num_questions = 30);

    assert_eq!(page.create_course().await, ActionOutcome::Rejected);
    page.edit_draft(|draft| {
        draft.name = "Chemistry".to_string();
        draft.num_questions = 0;
    });
    assert_eq!(page.create_course().await, ActionOutcome::Rejected);

    assert_eq!(api.count("create_course"), 0);
    assert_eq!(page.take_notifications().len(), 2);
}

#[tokio::test]
async fn test_delete_removes_course_after_confirmation() {
    let (page, _api) = mounted_page(MockCourseApi::with_courses(vec![algebra(), physics()])).await;

    let outcome = page.delete_course("1").await;

    assert_eq!(outcome, ActionOutcome::Succeeded);
    assert_eq!(page.courses(), vec![physics()]);
}

#[tokio::test]
async fn test_failed_delete_leaves_cache_unchanged() {
    let api = MockCourseApi::with_courses(vec![algebra(), physics()]);
    api.fail_on("delete_course");
    let (page, _api) = mounted_page(api).await;
    let before = page.courses();

    let outcome = page.delete_course("1").await;

    assert_eq!(outcome, ActionOutcome::Failed);
    assert_eq!(page.courses(), before);
    let notifications = page.take_notifications();
    assert_eq!(notifications[0].message, "Failed to delete course");
}

#[tokio::test]
async fn test_upload_without_file_makes_no_request() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra()])).await;
    let calls_before = api.calls().len();

    let outcome = page.upload_file("1").await;

    assert_eq!(outcome, ActionOutcome::Rejected);
    assert_eq!(api.calls().len(), calls_before);
    let notifications = page.take_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Warning);
    assert_eq!(notifications[0].message, "Please select a file to upload");
}

#[tokio::test]
async fn test_upload_clears_selection_only_on_success() {
    let api = MockCourseApi::with_courses(vec![algebra(), physics()]);
    api.fail_on("upload_file");
    let (page, api) = mounted_page(api).await;
    let notes = FileSelection::new("notes.pdf", vec![1, 2, 3]);
    page.select_file("1", notes.clone());

    assert_eq!(page.upload_file("1").await, ActionOutcome::Failed);
    assert_eq!(page.pending_file("1"), Some(notes.clone()));

    api.failing.lock().unwrap().clear();
    page.select_file("2", notes.clone());
    assert_eq!(page.upload_file("1").await, ActionOutcome::Succeeded);
    assert_eq!(page.pending_file("1"), None);
    assert_eq!(page.pending_file("2"), Some(notes));
    assert_eq!(api.count("upload_file"), 2);
}

#[tokio::test]
async fn test_update_merges_pending_fields_over_cached_course() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra()])).await;
    page.set_pending_update("1", CourseUpdateField::NumQuestions(10));

    let outcome = page.update_course("1").await;

    assert_eq!(outcome, ActionOutcome::Succeeded);
    let payloads = api.update_payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].0, "1");
    assert_eq!(
        serde_json::to_value(&payloads[0].1).unwrap(),
        json!({ "emailFrequency": "daily", "numQuestions": 10 })
    );

    // The edit buffer survives and the cache is not refreshed from the response.
    assert_eq!(page.pending_update("1").num_questions, Some(10));
    assert_eq!(page.courses(), vec![algebra()]);
    assert_eq!(
        page.take_notifications()[0].message,
        "Course updated successfully"
    );
}

#[tokio::test]
async fn test_pending_updates_are_independent_per_course() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra(), physics()])).await;
    page.set_pending_update("1", CourseUpdateField::EmailFrequency(EmailFrequency::Daily));
    page.set_pending_update("2", CourseUpdateField::NumQuestions(15));

    page.update_course("2").await;

    let payloads = api.update_payloads.lock().unwrap().clone();
    assert_eq!(payloads[0].1.email_frequency, Some(EmailFrequency::Weekly));
    assert_eq!(payloads[0].1.num_questions, Some(15));
    assert_eq!(page.pending_update("1").num_questions, None);

    page.reset_pending_update("1");
    assert!(page.pending_update("1").is_empty());
}

#[tokio::test]
async fn test_failed_update_notifies() {
    let api = MockCourseApi::with_courses(vec![algebra()]);
    api.fail_on("update_course");
    let (page, _api) = mounted_page(api).await;

    assert_eq!(page.update_course("1").await, ActionOutcome::Failed);
    assert_eq!(page.take_notifications()[0].message, "Failed to update course");
    assert_eq!(page.courses(), vec![algebra()]);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_keystrokes_issue_one_search() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;

    for query in ["a", "al", "ali", "alic"] {
        page.set_query(query);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    page.set_query("alice");
    let last_keystroke = Instant::now();
    assert!(page.is_search_pending());

    tokio::time::sleep(Duration::from_millis(299)).await;
    assert_eq!(api.count("search_users"), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let searches = api.searches.lock().unwrap().clone();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].0, "alice");
    assert!(searches[0].1 >= last_keystroke + SEARCH_DELAY);

    let results = page.search_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].username, "alice");
}

#[tokio::test(start_paused = true)]
async fn test_clearing_query_empties_results_immediately() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;
    page.set_query("al");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(page.search_results().len(), 2);

    page.set_query("ali");
    page.set_query("");

    assert!(page.search_results().is_empty());
    assert!(!page.is_search_pending());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.count("search_users"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_pending_search() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;
    page.set_query("bob");

    page.unmount();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(api.count("search_users"), 0);
    assert!(page.search_results().is_empty());
}

#[tokio::test]
async fn test_add_member_requires_selected_course() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra()])).await;

    let outcome = page.add_member("alice").await;

    assert_eq!(outcome, ActionOutcome::Rejected);
    assert_eq!(api.count("add_member"), 0);
    assert_eq!(page.take_notifications()[0].message, "No course selected");
}

#[tokio::test(start_paused = true)]
async fn test_add_member_success_resets_search() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra(), physics()])).await;
    page.open_add_member("1");
    page.open_add_member("2");
    assert_eq!(page.selected_course().as_deref(), Some("2"));

    page.set_query("al");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(page.search_results().len(), 2);

    let outcome = page.add_member("alice").await;

    assert_eq!(outcome, ActionOutcome::Succeeded);
    assert_eq!(
        api.added_members.lock().unwrap().clone(),
        vec![("2".to_string(), "alice".to_string())]
    );
    assert_eq!(page.query(), "");
    assert!(page.search_results().is_empty());
    assert!(!page.is_add_member_open());
    assert_eq!(
        page.take_notifications()[0].message,
        "User alice added successfully to the course"
    );
}

#[tokio::test(start_paused = true)]
async fn test_add_member_failure_keeps_modal_open() {
    let api = MockCourseApi::with_courses(vec![algebra()]);
    api.fail_on("add_member");
    let (page, _api) = mounted_page(api).await;
    page.open_add_member("1");
    page.set_query("bo");
    tokio::time::sleep(Duration::from_millis(400)).await;

    let outcome = page.add_member("bob").await;

    assert_eq!(outcome, ActionOutcome::Failed);
    assert!(page.is_add_member_open());
    assert_eq!(page.query(), "bo");
    assert_eq!(page.search_results().len(), 1);
    assert_eq!(page.selected_course().as_deref(), Some("1"));
    assert_eq!(page.take_notifications()[0].message, "Failed to add member");
}

#[tokio::test(start_paused = true)]
async fn test_loading_flag_tracks_in_flight_actions() {
    let api = MockCourseApi::with_courses(vec![algebra()]).with_latency(Duration::from_millis(100));
    let (page, _api) = mounted_page(api).await;

    let background = page.clone();
    let task = tokio::spawn(async move { background.update_course("1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(page.is_loading());

    assert_eq!(task.await.unwrap(), ActionOutcome::Succeeded);
    assert!(!page.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_closing_add_member_cancels_pending_search() {
    let (page, api) = mounted_page(MockCourseApi::with_courses(vec![algebra()])).await;
    page.open_add_member("1");
    page.set_query("al");

    page.close_add_member();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!page.is_add_member_open());
    assert!(!page.is_search_pending());
    assert_eq!(api.count("search_users"), 0);
    assert!(page.search_results().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_racing_a_finished_create_never_resends_the_draft() {
    for _ in 0..50 {
        let (page, api) = mounted_page(MockCourseApi::default()).await;
        page.set_draft(geometry_draft());

        let racer = page.clone();
        let spinner = tokio::spawn(async move {
            loop {
                match racer.create_course().await {
                    ActionOutcome::Ignored => tokio::task::yield_now().await,
                    outcome => return outcome,
                }
            }
        });
        let first = page.create_course().await;
        let second = spinner.await.unwrap();

        assert_eq!(api.count("create_course"), 1);
        assert_eq!(page.courses().len(), 1);
        assert!(first == ActionOutcome::Succeeded || second == ActionOutcome::Succeeded);
        assert!(!page.is_submitting());
        assert!(!page.is_loading());
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_create_releases_submit_flag() {
    let api = MockCourseApi::default().with_latency(Duration::from_millis(200));
    let (page, api) = mounted_page(api).await;
    page.set_draft(geometry_draft());

    let background = page.clone();
    let task = tokio::spawn(async move { background.create_course().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(page.is_submitting());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(!page.is_submitting());
    assert!(!page.is_loading());
    assert_eq!(page.create_course().await, ActionOutcome::Succeeded);
    assert_eq!(api.count("create_course"), 2);
}

#[tokio::test]
async fn test_search_now_applies_results_without_waiting() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;

    assert_eq!(page.search_now("al").await, ActionOutcome::Succeeded);

    assert_eq!(api.count("search_users"), 1);
    assert_eq!(page.query(), "al");
    let usernames: Vec<String> = page.search_results().into_iter().map(|u| u.username).collect();
    assert_eq!(usernames, vec!["alice", "alex"]);
    assert!(page.take_notifications().is_empty());
}

#[tokio::test]
async fn test_search_now_reports_failure() {
    let api = MockCourseApi::default();
    api.fail_on("search_users");
    let (page, _api) = mounted_page(api).await;

    assert_eq!(page.search_now("al").await, ActionOutcome::Failed);

    assert!(page.search_results().is_empty());
    let notifications = page.take_notifications();
    assert!(notifications[0].is_error());
    assert_eq!(notifications[0].message, "Failed to search users");
}

#[tokio::test]
async fn test_search_now_rejects_empty_query() {
    let (page, api) = mounted_page(MockCourseApi::default()).await;

    assert_eq!(page.search_now("").await, ActionOutcome::Rejected);
    assert_eq!(api.count("search_users"), 0);
}
