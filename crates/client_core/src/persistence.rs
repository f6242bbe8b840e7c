//! The remote course service the gateway writes through.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Course, CourseId, Module, Student, Teacher, TeacherId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddStudentRequest, CreateCourseRequest, CreateModuleRequest, Envelope, TeacherQuery,
        UpdateCourseRequest, UpdateTeacherRequest,
    },
};
use thiserror::Error;
use tracing::debug;

/// Services that predate structured conflict codes report duplicates only in
/// the message text.
const DUPLICATE_MESSAGE_MARKER: &str = "already exists";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: ApiError,
    },
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl PersistenceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            PersistenceError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message meant for the user: the service's own text when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            PersistenceError::Rejected { body, .. } if !body.message.trim().is_empty() => {
                body.message.clone()
            }
            other => other.to_string(),
        }
    }

    /// A structured conflict (409 or `conflict` code) is authoritative; the
    /// message substring is the fallback for services that send neither.
    pub fn is_duplicate_title(&self) -> bool {
        let PersistenceError::Rejected { status, body, .. } = self else {
            return false;
        };
        *status == StatusCode::CONFLICT.as_u16()
            || body.code == Some(ErrorCode::Conflict)
            || body
                .message
                .to_ascii_lowercase()
                .contains(DUPLICATE_MESSAGE_MARKER)
    }
}

#[async_trait]
pub trait CourseService: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>, PersistenceError>;
    async fn create_course(&self, request: &CreateCourseRequest)
        -> Result<Course, PersistenceError>;
    async fn update_course(
        &self,
        course: &CourseId,
        request: &UpdateCourseRequest,
    ) -> Result<Course, PersistenceError>;
    async fn delete_course(&self, course: &CourseId) -> Result<(), PersistenceError>;
    async fn list_modules(&self, course: &CourseId) -> Result<Vec<Module>, PersistenceError>;
    async fn create_module(&self, request: &CreateModuleRequest)
        -> Result<Module, PersistenceError>;
    async fn add_student(&self, request: &AddStudentRequest) -> Result<Student, PersistenceError>;
    async fn list_teachers(&self, query: &TeacherQuery) -> Result<Vec<Teacher>, PersistenceError>;
    async fn get_teacher(&self, teacher: &TeacherId) -> Result<Teacher, PersistenceError>;
    async fn update_teacher(
        &self,
        teacher: &TeacherId,
        request: &UpdateTeacherRequest,
    ) -> Result<Teacher, PersistenceError>;
    async fn upload_teacher_image(
        &self,
        teacher: &TeacherId,
        upload: ImageUpload,
    ) -> Result<Teacher, PersistenceError>;
    async fn teacher_courses(&self, teacher: &TeacherId) -> Result<Vec<Course>, PersistenceError>;
}

/// REST client for the course service.
pub struct HttpCourseService {
    http: Client,
    server_url: String,
    bearer_token: Option<String>,
}

impl HttpCourseService {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let server_url: String = server_url.into();
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, PersistenceError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| PersistenceError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "course service responded");
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ApiError>(&raw)
            .unwrap_or_else(|_| ApiError::message_only(raw.trim()));
        Err(PersistenceError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, PersistenceError> {
        let response = self.send(endpoint, request).await?;
        response
            .json::<Envelope<T>>()
            .await
            .map(Envelope::into_inner)
            .map_err(|err| PersistenceError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl CourseService for HttpCourseService {
    async fn list_courses(&self) -> Result<Vec<Course>, PersistenceError> {
        self.send_json("GET /courses", self.http.get(self.url("/courses")))
            .await
    }

    async fn create_course(
        &self,
        request: &CreateCourseRequest,
    ) -> Result<Course, PersistenceError> {
        self.send_json(
            "POST /courses",
            self.http.post(self.url("/courses")).json(request),
        )
        .await
    }

    async fn update_course(
        &self,
        course: &CourseId,
        request: &UpdateCourseRequest,
    ) -> Result<Course, PersistenceError> {
        self.send_json(
            "PATCH /courses/{id}",
            self.http
                .patch(self.url(&format!("/courses/{course}")))
                .json(request),
        )
        .await
    }

    async fn delete_course(&self, course: &CourseId) -> Result<(), PersistenceError> {
        self.send(
            "DELETE /courses/{id}",
            self.http.delete(self.url(&format!("/courses/{course}"))),
        )
        .await
        .map(drop)
    }

    async fn list_modules(&self, course: &CourseId) -> Result<Vec<Module>, PersistenceError> {
        self.send_json(
            "GET /courses/{id}/modules",
            self.http.get(self.url(&format!("/courses/{course}/modules"))),
        )
        .await
    }

    async fn create_module(
        &self,
        request: &CreateModuleRequest,
    ) -> Result<Module, PersistenceError> {
        self.send_json(
            "POST /modules",
            self.http.post(self.url("/modules")).json(request),
        )
        .await
    }

    async fn add_student(&self, request: &AddStudentRequest) -> Result<Student, PersistenceError> {
        self.send_json(
            "POST /courses/{id}/students",
            self.http
                .post(self.url(&format!("/courses/{}/students", request.course_id)))
                .json(request),
        )
        .await
    }

    async fn list_teachers(&self, query: &TeacherQuery) -> Result<Vec<Teacher>, PersistenceError> {
        self.send_json(
            "GET /teachers",
            self.http.get(self.url("/teachers")).query(&[
                ("search", query.search.as_str()),
                ("courseCount", query.course_count.as_str()),
                ("sort", query.sort.as_str()),
            ]),
        )
        .await
    }

    async fn get_teacher(&self, teacher: &TeacherId) -> Result<Teacher, PersistenceError> {
        self.send_json(
            "GET /teachers/{id}",
            self.http.get(self.url(&format!("/teachers/{teacher}"))),
        )
        .await
    }

    async fn update_teacher(
        &self,
        teacher: &TeacherId,
        request: &UpdateTeacherRequest,
    ) -> Result<Teacher, PersistenceError> {
        self.send_json(
            "PATCH /teachers/{id}",
            self.http
                .patch(self.url(&format!("/teachers/{teacher}")))
                .json(request),
        )
        .await
    }

    async fn upload_teacher_image(
        &self,
        teacher: &TeacherId,
        upload: ImageUpload,
    ) -> Result<Teacher, PersistenceError> {
        let endpoint = "POST /teachers/{id}/image";
        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.filename);
        if let Some(mime) = upload.mime_type.as_deref() {
            part = part.mime_str(mime).map_err(|err| PersistenceError::Transport {
                endpoint: endpoint.to_string(),
                message: format!("invalid image mime type '{mime}': {err}"),
            })?;
        }
        let form = multipart::Form::new().part("image", part);
        self.send_json(
            endpoint,
            self.http
                .post(self.url(&format!("/teachers/{teacher}/image")))
                .multipart(form),
        )
        .await
    }

    async fn teacher_courses(&self, teacher: &TeacherId) -> Result<Vec<Course>, PersistenceError> {
        self.send_json(
            "GET /teachers/{id}/courses",
            self.http.get(self.url(&format!("/teachers/{teacher}/courses"))),
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/persistence_tests.rs"]
mod tests;
