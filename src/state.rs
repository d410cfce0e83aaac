use std::sync::Arc;

use crate::api::{CourseApi, HttpCourseApi};
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::navigation::Navigator;
use crate::session::{SessionManager, SessionStorage, SqliteSessionStorage};
use crate::view::CoursesPage;

#[derive(Clone)]
pub struct AppState {
    pub config: ClientConfig,
    pub session: SessionManager,
    pub api: Arc<dyn CourseApi>,
}

impl AppState {
    /// Opens the persisted session and wires the HTTP client to it.
    pub async fn connect(
        config: ClientConfig,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AppError> {
        let storage: Arc<dyn SessionStorage> =
            Arc::new(SqliteSessionStorage::connect(&config.session_db_url).await?);
        let session = SessionManager::new(storage);
        let api = Arc::new(HttpCourseApi::new(&config, session.clone(), navigator)?);

        Ok(Self {
            config,
            session,
            api,
        })
    }

    pub fn courses_page(&self) -> CoursesPage {
        CoursesPage::new(self.api.clone(), self.config.search_debounce)
    }
}
