use std::path::Path;

use crate::error::AppError;

/// A file picked for upload, held in memory until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub file_name: String,
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FileSelection {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Validation(format!("{} is not a file", path.display())))?;

        Ok(Self::new(file_name, content))
    }
}
