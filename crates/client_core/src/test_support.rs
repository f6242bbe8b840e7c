//! Fixtures and a scriptable in-process course service for unit tests.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{Course, CourseId, Module, ModuleId, Student, StudentId, Teacher, TeacherId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddStudentRequest, CreateCourseRequest, CreateModuleRequest, TeacherQuery,
        UpdateCourseRequest, UpdateTeacherRequest, UserInfoData, UserInfoRecord,
    },
};
use tokio::sync::Notify;

use crate::{
    persistence::{CourseService, ImageUpload, PersistenceError},
    session::SessionContext,
};

pub(crate) fn course(id: &str, teacher_id: &str, title: &str) -> Course {
    Course {
        id: CourseId::from(id),
        title: title.to_string(),
        category: "General".to_string(),
        description: String::new(),
        image_ref: None,
        teacher_ref: TeacherId::from(teacher_id),
        created_at: None,
    }
}

pub(crate) fn module(id: &str, course_id: &str, title: &str) -> Module {
    Module {
        id: ModuleId::from(id),
        title: title.to_string(),
        description: String::new(),
        start_time: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        course_ref: CourseId::from(course_id),
        teacher_ref: TeacherId::from("t-1"),
    }
}

pub(crate) fn student(id: &str, courses: &[&str]) -> Student {
    Student {
        id: StudentId::from(id),
        name: format!("Student {id}"),
        email: format!("{id}@example.com"),
        phone: None,
        enrollments: courses.iter().map(|course| CourseId::from(*course)).collect(),
    }
}

pub(crate) fn teacher(id: &str, name: &str) -> Teacher {
    Teacher {
        id: TeacherId::from(id),
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        bio: String::new(),
        image_url: None,
        status: "active".to_string(),
        rating: None,
        location: None,
        subjects: BTreeSet::new(),
        course_count: None,
        created_at: None,
    }
}

pub(crate) fn signed_in(user_id: &str) -> SessionContext {
    let record = UserInfoRecord {
        data: UserInfoData {
            id: user_id.into(),
            role: shared::domain::Role::Teacher,
            name: None,
            email: None,
            token: Some("token-1".to_string()),
        },
    };
    let raw = serde_json::to_string(&record).unwrap();
    SessionContext::from_user_info(Some(&raw))
}

pub(crate) fn rejected(status: u16, message: &str) -> PersistenceError {
    let code = match status {
        404 => Some(ErrorCode::NotFound),
        409 => Some(ErrorCode::Conflict),
        _ => None,
    };
    PersistenceError::Rejected {
        endpoint: "fake".to_string(),
        status,
        body: ApiError {
            code,
            message: message.to_string(),
        },
    }
}

/// Course service double. Configure it with the builder methods, then share it
/// as `Arc<dyn CourseService>`.
#[derive(Default)]
pub(crate) struct FakeCourseService {
    courses: Mutex<Vec<Course>>,
    modules: Vec<Module>,
    teachers: Mutex<Vec<Teacher>>,
    failures: HashMap<&'static str, PersistenceError>,
    gates: HashMap<&'static str, Arc<Notify>>,
    search_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<&'static str>>,
    queries: Mutex<Vec<TeacherQuery>>,
    next_id: AtomicU64,
}

impl FakeCourseService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_courses(self, courses: Vec<Course>) -> Self {
        *self.courses.lock().unwrap() = courses;
        self
    }

    pub(crate) fn with_modules(mut self, modules: Vec<Module>) -> Self {
        self.modules = modules;
        self
    }

    pub(crate) fn with_teachers(self, teachers: Vec<Teacher>) -> Self {
        *self.teachers.lock().unwrap() = teachers;
        self
    }

    /// Every call to `op` fails with `error`.
    pub(crate) fn failing(mut self, op: &'static str, error: PersistenceError) -> Self {
        self.failures.insert(op, error);
        self
    }

    /// Calls to `op` wait until the returned handle is notified.
    pub(crate) fn gated(mut self, op: &'static str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gates.insert(op, Arc::clone(&gate));
        (self, gate)
    }

    /// A teacher search for exactly `search` answers only after `delay`.
    pub(crate) fn delay_search(mut self, search: &str, delay: Duration) -> Self {
        self.search_delays.insert(search.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| **called == op)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn teacher_queries(&self) -> Vec<TeacherQuery> {
        self.queries.lock().unwrap().clone()
    }

    async fn enter(&self, op: &'static str) -> Result<(), PersistenceError> {
        self.calls.lock().unwrap().push(op);
        if let Some(gate) = self.gates.get(op) {
            gate.notified().await;
        }
        match self.failures.get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }

    fn find_teacher(&self, id: &TeacherId) -> Result<Teacher, PersistenceError> {
        self.teachers
            .lock()
            .unwrap()
            .iter()
            .find(|teacher| &teacher.id == id)
            .cloned()
            .ok_or_else(|| rejected(404, "Teacher not found"))
    }

    fn store_teacher(&self, updated: Teacher) {
        let mut teachers = self.teachers.lock().unwrap();
        if let Some(existing) = teachers.iter_mut().find(|teacher| teacher.id == updated.id) {
            *existing = updated;
        }
    }
}

#[async_trait]
impl CourseService for FakeCourseService {
    async fn list_courses(&self) -> Result<Vec<Course>, PersistenceError> {
        self.enter("list_courses").await?;
        Ok(self.courses.lock().unwrap().clone())
    }

    async fn create_course(
        &self,
        request: &CreateCourseRequest,
    ) -> Result<Course, PersistenceError> {
        self.enter("create_course").await?;
        let created = Course {
            id: CourseId::new(self.fresh_id("course")),
            title: request.title.clone(),
            category: request.category.clone(),
            description: request.description.clone(),
            image_ref: request.image.clone(),
            teacher_ref: request.teacher_id.clone(),
            created_at: Some(Utc::now()),
        };
        self.courses.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_course(
        &self,
        course_id: &CourseId,
        request: &UpdateCourseRequest,
    ) -> Result<Course, PersistenceError> {
        self.enter("update_course").await?;
        let mut courses = self.courses.lock().unwrap();
        let existing = courses
            .iter_mut()
            .find(|existing| &existing.id == course_id)
            .ok_or_else(|| rejected(404, "Course not found"))?;
        if let Some(title) = &request.title {
            existing.title = title.clone();
        }
        if let Some(category) = &request.category {
            existing.category = category.clone();
        }
        if let Some(description) = &request.description {
            existing.description = description.clone();
        }
        if request.image.is_some() {
            existing.image_ref = request.image.clone();
        }
        Ok(existing.clone())
    }

    async fn delete_course(&self, course_id: &CourseId) -> Result<(), PersistenceError> {
        self.enter("delete_course").await?;
        self.courses
            .lock()
            .unwrap()
            .retain(|existing| &existing.id != course_id);
        Ok(())
    }

    async fn list_modules(&self, course_id: &CourseId) -> Result<Vec<Module>, PersistenceError> {
        self.enter("list_modules").await?;
        Ok(self
            .modules
            .iter()
            .filter(|module| &module.course_ref == course_id)
            .cloned()
            .collect())
    }

    async fn create_module(
        &self,
        request: &CreateModuleRequest,
    ) -> Result<Module, PersistenceError> {
        self.enter("create_module").await?;
        Ok(Module {
            id: ModuleId::new(self.fresh_id("module")),
            title: request.title.clone(),
            description: request.description.clone(),
            start_time: request.start_time.and_utc(),
            end_time: request.end_time.and_utc(),
            course_ref: request.course_id.clone(),
            teacher_ref: request.teacher_id.clone(),
        })
    }

    async fn add_student(&self, request: &AddStudentRequest) -> Result<Student, PersistenceError> {
        self.enter("add_student").await?;
        Ok(Student {
            id: StudentId::new(self.fresh_id("student")),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            enrollments: BTreeSet::new(),
        })
    }

    async fn list_teachers(&self, query: &TeacherQuery) -> Result<Vec<Teacher>, PersistenceError> {
        self.queries.lock().unwrap().push(query.clone());
        self.enter("list_teachers").await?;
        if let Some(delay) = self.search_delays.get(&query.search) {
            tokio::time::sleep(*delay).await;
        }
        let needle = query.search.to_lowercase();
        Ok(self
            .teachers
            .lock()
            .unwrap()
            .iter()
            .filter(|teacher| teacher.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn get_teacher(&self, teacher_id: &TeacherId) -> Result<Teacher, PersistenceError> {
        self.enter("get_teacher").await?;
        self.find_teacher(teacher_id)
    }

    async fn update_teacher(
        &self,
        teacher_id: &TeacherId,
        request: &UpdateTeacherRequest,
    ) -> Result<Teacher, PersistenceError> {
        self.enter("update_teacher").await?;
        let mut updated = self.find_teacher(teacher_id)?;
        if let Some(name) = &request.name {
            updated.name = name.clone();
        }
        if let Some(status) = &request.status {
            updated.status = status.clone();
        }
        if let Some(bio) = &request.bio {
            updated.bio = bio.clone();
        }
        if request.location.is_some() {
            updated.location = request.location.clone();
        }
        if request.rating.is_some() {
            updated.rating = request.rating;
        }
        if let Some(subjects) = &request.subjects {
            updated.subjects = subjects.clone();
        }
        self.store_teacher(updated.clone());
        Ok(updated)
    }

    async fn upload_teacher_image(
        &self,
        teacher_id: &TeacherId,
        upload: ImageUpload,
    ) -> Result<Teacher, PersistenceError> {
        self.enter("upload_teacher_image").await?;
        let mut updated = self.find_teacher(teacher_id)?;
        updated.image_url = Some(format!("/uploads/{}", upload.filename));
        self.store_teacher(updated.clone());
        Ok(updated)
    }

    async fn teacher_courses(
        &self,
        teacher_id: &TeacherId,
    ) -> Result<Vec<Course>, PersistenceError> {
        self.enter("teacher_courses").await?;
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|course| &course.teacher_ref == teacher_id)
            .cloned()
            .collect())
    }
}
