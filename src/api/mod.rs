pub mod dto;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::{
    Course, Credentials, FileSelection, LoginResponse, NewCourseRequest, Profile,
    RegisterRequest, UpdateCourseRequest, UserSummary,
};
use crate::navigation::{LOGIN_PATH, Navigator};
use crate::session::{Session, SessionManager};

pub const DEFAULT_QUESTIONS_PAGE: u32 = 1;

/// Operations of the auth and courses services.
#[async_trait]
pub trait CourseApi: Send + Sync {
    async fn register(&self, user: &RegisterRequest) -> Result<Value, AppError>;
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AppError>;
    async fn logout(&self);
    async fn get_profile(&self) -> Result<Profile, AppError>;

    async fn create_course(&self, course: &NewCourseRequest) -> Result<Course, AppError>;
    async fn get_courses(&self) -> Result<Vec<Course>, AppError>;
    async fn get_previous_questions(&self, course_id: &str, page: u32) -> Result<Value, AppError>;
    async fn submit_answers(
        &self,
        course_id: &str,
        user_id: &str,
        answers: &Value,
    ) -> Result<Value, AppError>;
    async fn get_personalized_questions(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Value, AppError>;
    async fn upload_file(&self, course_id: &str, file: &FileSelection) -> Result<Value, AppError>;
    async fn update_course(
        &self,
        course_id: &str,
        updates: &UpdateCourseRequest,
    ) -> Result<Course, AppError>;
    async fn add_member(&self, course_id: &str, username: &str) -> Result<Value, AppError>;
    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, AppError>;
    async fn delete_course(&self, course_id: &str) -> Result<Value, AppError>;
}

pub struct HttpCourseApi {
    client: Client,
    auth_url: String,
    courses_url: String,
    session: SessionManager,
    navigator: Arc<dyn Navigator>,
}

impl HttpCourseApi {
    pub fn new(
        config: &ClientConfig,
        session: SessionManager,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            auth_url: config.auth_url(),
            courses_url: config.courses_url(),
            session,
            navigator,
        })
    }

    /// Attaches the stored bearer token, if any.
    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, AppError> {
        Ok(match self.session.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Sends the request and normalizes failures. A 401 tears the session
    /// down and redirects to login before the error is returned.
    async fn dispatch(&self, request: RequestBuilder, action: &str) -> Result<Response, AppError> {
        let response = request.send().await.map_err(|e| {
            error!("Error {}: {}", action, e);
            AppError::Network(e)
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Token expired or invalid while {}. Redirecting to login.", action);
            if let Err(e) = self.session.invalidate().await {
                error!("Failed to clear session: {}", e);
            }
            self.navigator.redirect(LOGIN_PATH);
            return Err(AppError::AuthExpired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = dto::error_message(&body);
            error!("Error {}: {} {}", action, status, message);
            return Err(AppError::Request { status, message });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, AppError> {
        let request = self.authorized(request).await?;
        let response = self.dispatch(request, action).await?;
        read_json(response, action).await
    }

    fn course_url(&self, path: &str) -> String {
        format!("{}{}", self.courses_url, path)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T, AppError> {
    let body = response.text().await?;
    decode_json(&body, action)
}

fn decode_json<T: DeserializeOwned>(body: &str, action: &str) -> Result<T, AppError> {
    serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse response while {}: {}", action, e);
        AppError::Decode(e)
    })
}

#[async_trait]
impl CourseApi for HttpCourseApi {
    async fn register(&self, user: &RegisterRequest) -> Result<Value, AppError> {
        let request = self
            .client
            .post(format!("{}/register", self.auth_url))
            .json(user);
        let response = self.dispatch(request, "registering").await?;
        read_json(response, "registering").await
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AppError> {
        let request = self
            .client
            .post(format!("{}/login", self.auth_url))
            .json(credentials);
        let response = self.dispatch(request, "logging in").await?;
        let data: LoginResponse = read_json(response, "logging in").await?;

        self.session
            .store(&Session {
                token: data.token.clone(),
                user_id: data.user_id.clone(),
            })
            .await?;
        Ok(data)
    }

    async fn logout(&self) {
        if let Err(e) = self.session.logout().await {
            error!("Failed to clear session on logout: {}", e);
        }
        self.navigator.redirect(LOGIN_PATH);
    }

    async fn get_profile(&self) -> Result<Profile, AppError> {
        let request = self.client.get(format!("{}/profile", self.auth_url));
        self.send_json(request, "fetching profile").await
    }

    async fn create_course(&self, course: &NewCourseRequest) -> Result<Course, AppError> {
        let request = self.client.post(self.course_url("/create")).json(course);
        let created: dto::CourseResponse = self.send_json(request, "creating course").await?;
        Ok(created.into_course())
    }

    async fn get_courses(&self) -> Result<Vec<Course>, AppError> {
        let request = self.client.get(self.course_url("/"));
        let data: dto::CoursesResponse = self.send_json(request, "fetching courses").await?;
        Ok(data.courses)
    }

    async fn get_previous_questions(&self, course_id: &str, page: u32) -> Result<Value, AppError> {
        let action = "fetching previous questions";
        let request = self.client.get(self.course_url(&format!(
            "/{}/previous-questions?page={}",
            course_id, page
        )));
        let request = self.authorized(request).await?;
        let response = self.dispatch(request, action).await?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            error!("Error {}: no data received from the server", action);
            return Err(AppError::EmptyResponse(
                "No data received from the server.".to_string(),
            ));
        }
        let data: Value = decode_json(&body, action)?;
        if data.is_null() {
            error!("Error {}: no data received from the server", action);
            return Err(AppError::EmptyResponse(
                "No data received from the server.".to_string(),
            ));
        }
        Ok(data)
    }

    async fn submit_answers(
        &self,
        course_id: &str,
        user_id: &str,
        answers: &Value,
    ) -> Result<Value, AppError> {
        let request = self
            .client
            .post(self.course_url(&format!("/submit/{}/{}", course_id, user_id)))
            .json(answers);
        let data: Value = self.send_json(request, "submitting answers").await?;
        info!("Answers submitted successfully for course {}", course_id);
        Ok(data)
    }

    async fn get_personalized_questions(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Value, AppError> {
        let request = self
            .client
            .get(self.course_url(&format!("/{}/questions/{}", course_id, user_id)));
        self.send_json(request, "fetching personalized questions").await
    }

    async fn upload_file(&self, course_id: &str, file: &FileSelection) -> Result<Value, AppError> {
        let mut part = Part::bytes(file.content.clone()).file_name(file.file_name.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part.mime_str(mime_type).map_err(|_| {
                AppError::Validation(format!("invalid mime type {:?}", mime_type))
            })?;
        }
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(self.course_url(&format!("/upload/{}", course_id)))
            .multipart(form);
        let data: Value = self.send_json(request, "uploading file").await?;
        info!("Uploaded {} to course {}", file.file_name, course_id);
        Ok(data)
    }

    async fn update_course(
        &self,
        course_id: &str,
        updates: &UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        let request = self
            .client
            .put(self.course_url(&format!("/update/{}", course_id)))
            .json(updates);
        let updated: dto::CourseResponse = self.send_json(request, "updating course").await?;
        Ok(updated.into_course())
    }

    async fn add_member(&self, course_id: &str, username: &str) -> Result<Value, AppError> {
        let request = self
            .client
            .post(self.course_url(&format!("/{}/add-member", course_id)))
            .json(&dto::AddMemberRequest { username });
        let data: Value = self.send_json(request, "adding member").await?;
        info!("Add member response: {}", data);
        Ok(data)
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, AppError> {
        let url = Url::parse_with_params(&self.course_url("/search-users"), &[("query", query)])
            .map_err(|e| AppError::Config(format!("Invalid search url: {}", e)))?;
        let request = self.client.get(url);
        self.send_json(request, "searching users").await
    }

    async fn delete_course(&self, course_id: &str) -> Result<Value, AppError> {
        let request = self
            .client
            .delete(self.course_url(&format!("/{}", course_id)));
        let data: Value = self.send_json(request, "deleting course").await?;
        info!("Course deleted successfully: {}", course_id);
        Ok(data)
    }
}
