//! User-facing workflows: dialogs, their submissions, and the notifications
//! each outcome produces.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{
    domain::{Course, CourseId, Module, Teacher, TeacherId},
    protocol::{UpdateCourseRequest, UpdateTeacherRequest},
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    command::{Command, CommandOutcome, NewCourse, NewModule, NewStudent},
    error::CoreError,
    gateway::CommandGateway,
    modal::{
        CloseOutcome, DialogKind, DialogSlot, ModalController, ModalState, SettleOutcome,
        Submission,
    },
    notify::{Notification, Notifier},
    persistence::{CourseService, ImageUpload},
    projector::{TeacherDirectory, TeacherFilter},
    session::SessionContext,
    validation::{
        validate_course, validate_module, validate_student, validate_teacher_profile, RawForm,
    },
};

pub const MODULE_CREATED: &str = "A new module has been created!";
pub const MODULE_FAILED: &str = "Error creating module.";

struct Messages {
    success: &'static str,
    failure: &'static str,
}

fn dialog_messages(kind: DialogKind) -> Messages {
    let (success, failure) = match kind {
        DialogKind::AddModule => (MODULE_CREATED, MODULE_FAILED),
        DialogKind::AddStudent => ("Student added to course.", "Error adding student."),
        DialogKind::CreateCourse => ("Course created.", "Error creating course."),
        DialogKind::EditCourse => ("Course updated.", "Error updating course."),
        DialogKind::EditTeacherProfile => ("Profile updated.", "Error updating profile."),
        DialogKind::TeacherCourses => ("", "Error loading teacher courses."),
    };
    Messages { success, failure }
}

/// What the user is told about a failure. Field-level validation errors are
/// shown inline on the dialog, so only form-level ones produce a toast.
fn failure_message(fallback: &str, err: &CoreError) -> Option<String> {
    match err {
        CoreError::Validation(errors) => {
            let form_level: Vec<&str> = errors.form_level().map(|e| e.message.as_str()).collect();
            (!form_level.is_empty()).then(|| form_level.join(" "))
        }
        CoreError::DuplicateTitle { message } => Some(message.clone()),
        CoreError::CommandInFlight { .. } | CoreError::InvalidTransition { .. } => {
            Some(err.to_string())
        }
        CoreError::Attribution { .. }
        | CoreError::NetworkOrService { .. }
        | CoreError::MalformedEntity { .. } => Some(fallback.to_string()),
    }
}

pub struct Dashboard {
    gateway: Arc<CommandGateway>,
    modals: Mutex<ModalController>,
    notifier: Notifier,
    teachers: TeacherDirectory,
}

impl Dashboard {
    pub fn new(
        service: Arc<dyn CourseService>,
        session: SessionContext,
        search_debounce: Duration,
    ) -> Self {
        let gateway = CommandGateway::new(service, session);
        Self {
            teachers: TeacherDirectory::new(Arc::clone(&gateway), search_debounce),
            gateway,
            modals: Mutex::new(ModalController::new()),
            notifier: Notifier::default(),
        }
    }

    pub fn gateway(&self) -> &Arc<CommandGateway> {
        &self.gateway
    }

    pub fn teachers(&self) -> &TeacherDirectory {
        &self.teachers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    fn modals(&self) -> MutexGuard<'_, ModalController> {
        self.modals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn modal(&self, kind: DialogKind) -> ModalState {
        self.modals().state(kind).clone()
    }

    /// Opens a dialog. Edit dialogs start from the stored record; the teacher
    /// courses view loads its list right away.
    pub async fn open_dialog(&self, slot: DialogSlot) -> Result<(), CoreError> {
        let draft = self.prefill(&slot);
        self.modals().open(slot.clone(), draft)?;

        if let DialogSlot::TeacherCourses { teacher } = slot {
            let command = Command::FetchTeacherCourses { teacher };
            let failure = dialog_messages(DialogKind::TeacherCourses).failure;
            if let Err(err) = self.run(command, failure).await {
                // The dialog is still open; keep the failure on it.
                let _ = self.modals().reject(DialogKind::TeacherCourses, err.clone());
                return Err(err);
            }
        }
        Ok(())
    }

    fn prefill(&self, slot: &DialogSlot) -> RawForm {
        match slot {
            DialogSlot::EditCourse { course } => self.gateway.read(|store| {
                store
                    .courses
                    .get(course)
                    .map(|course| {
                        RawForm::new()
                            .with("title", &course.title)
                            .with("category", &course.category)
                            .with("description", &course.description)
                            .with("image", course.image_ref.clone().unwrap_or_default())
                    })
                    .unwrap_or_default()
            }),
            DialogSlot::EditTeacherProfile { teacher } => self.gateway.read(|store| {
                store
                    .teachers
                    .get(teacher)
                    .map(|teacher| {
                        RawForm::new()
                            .with("name", &teacher.name)
                            .with("slug", &teacher.slug)
                            .with("status", &teacher.status)
                            .with("bio", &teacher.bio)
                            .with("location", teacher.location.clone().unwrap_or_default())
                            .with(
                                "rating",
                                teacher.rating.map(|r| r.to_string()).unwrap_or_default(),
                            )
                    })
                    .unwrap_or_default()
            }),
            _ => RawForm::new(),
        }
    }

    pub fn edit_draft(
        &self,
        kind: DialogKind,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.modals().edit(kind, field, value)
    }

    pub fn close_dialog(&self, kind: DialogKind) -> CloseOutcome {
        self.modals().close(kind)
    }

    /// Validates the draft, runs the mapped command and settles the dialog.
    ///
    /// `Completed` closes the dialog; a failure reopens it with the error and
    /// is returned. A dialog closed mid-submit yields `Discarded` and no
    /// notification, although the store still reflects the command.
    pub async fn submit(&self, kind: DialogKind) -> Result<SettleOutcome, CoreError> {
        if kind == DialogKind::TeacherCourses {
            return Err(CoreError::InvalidTransition {
                dialog: kind,
                action: "submit",
                state: "view-only",
            });
        }

        let submission = self.modals().begin_submit(kind)?;
        let result = match command_for(&submission) {
            Ok(command) => self.gateway.dispatch(command).await.map(drop),
            Err(err) => {
                debug!(dialog = %kind, error = %err, "workflow: draft rejected before dispatch");
                Err(err)
            }
        };

        let outcome = self.modals().settle(&submission, result);
        let messages = dialog_messages(kind);
        match outcome {
            SettleOutcome::Completed => {
                self.notifier.success(messages.success);
                Ok(SettleOutcome::Completed)
            }
            SettleOutcome::Reopened(err) => {
                if let Some(message) = failure_message(messages.failure, &err) {
                    self.notifier.error(message);
                }
                Err(err)
            }
            SettleOutcome::Discarded => {
                debug!(dialog = %kind, "workflow: outcome discarded after close");
                Ok(SettleOutcome::Discarded)
            }
        }
    }

    async fn run(&self, command: Command, failure: &str) -> Result<CommandOutcome, CoreError> {
        let kind = command.kind();
        self.gateway.dispatch(command).await.inspect_err(|err| {
            warn!(command = %kind, error = %err, "workflow: command failed");
            if let Some(message) = failure_message(failure, err) {
                self.notifier.error(message);
            }
        })
    }

    pub async fn load_courses(&self) -> Result<Vec<Course>, CoreError> {
        self.run(Command::FetchCourses, "Error loading courses.").await?;
        Ok(self.gateway.read(|store| store.courses.list().into_iter().cloned().collect()))
    }

    pub async fn load_course_modules(&self, course: &CourseId) -> Result<Vec<Module>, CoreError> {
        let command = Command::FetchModules {
            course: course.clone(),
        };
        self.run(command, "Error loading modules.").await?;
        Ok(self.gateway.read(|store| {
            store
                .modules_for_course(course)
                .into_iter()
                .cloned()
                .collect()
        }))
    }

    pub async fn delete_course(&self, course: &CourseId) -> Result<(), CoreError> {
        let command = Command::DeleteCourse {
            course: course.clone(),
        };
        self.run(command, "Error deleting course.").await?;
        self.notifier.success("Course deleted.");
        Ok(())
    }

    pub async fn load_teacher(&self, teacher: &TeacherId) -> Result<Teacher, CoreError> {
        let command = Command::FetchTeacher {
            teacher: teacher.clone(),
        };
        match self.run(command, "Error loading teacher.").await? {
            CommandOutcome::Teacher(teacher) => Ok(teacher),
            other => Err(unexpected("teacher", &other)),
        }
    }

    pub async fn upload_teacher_image(
        &self,
        teacher: &TeacherId,
        upload: ImageUpload,
    ) -> Result<Teacher, CoreError> {
        let command = Command::UpdateTeacherImage {
            teacher: teacher.clone(),
            upload,
        };
        match self.run(command, "Error uploading image.").await? {
            CommandOutcome::Teacher(teacher) => {
                self.notifier.success("Profile image updated.");
                Ok(teacher)
            }
            other => Err(unexpected("teacher", &other)),
        }
    }

    pub fn teacher_courses(&self, teacher: &TeacherId) -> Vec<Course> {
        self.gateway.read(|store| {
            store
                .courses_for_teacher(teacher)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Applies a whole filter and returns the visible teachers in order.
    pub async fn search_teachers(&self, filter: TeacherFilter) -> Result<Vec<Teacher>, CoreError> {
        if let Err(err) = self.teachers.set_filter(filter).await {
            if let Some(message) = failure_message("Error loading teachers.", &err) {
                self.notifier.error(message);
            }
            return Err(err);
        }
        let visible = self.teachers.visible_teachers();
        if visible.is_empty() {
            self.notifier.info("No teachers match the current filters.");
        }
        Ok(visible)
    }
}

fn unexpected(expected: &'static str, outcome: &CommandOutcome) -> CoreError {
    CoreError::MalformedEntity {
        entity: expected,
        reason: format!("unexpected outcome {outcome:?}"),
    }
}

fn command_for(submission: &Submission) -> Result<Command, CoreError> {
    let draft = &submission.draft;
    let command = match &submission.slot {
        DialogSlot::AddModule { course } => {
            let form = validate_module(draft)?;
            Command::AddModule(NewModule {
                course: course.clone(),
                title: form.title,
                description: form.description,
                start_time: form.start_time,
                end_time: form.end_time,
            })
        }
        DialogSlot::AddStudent { course } => {
            let form = validate_student(draft)?;
            Command::AddStudent(NewStudent {
                course: course.clone(),
                name: form.name,
                email: form.email,
                phone: form.phone,
            })
        }
        DialogSlot::CreateCourse => {
            let form = validate_course(draft)?;
            Command::AddCourse(NewCourse {
                title: form.title,
                category: form.category,
                description: form.description,
                image: form.image,
            })
        }
        DialogSlot::EditCourse { course } => {
            let form = validate_course(draft)?;
            Command::UpdateCourse {
                course: course.clone(),
                changes: UpdateCourseRequest {
                    title: Some(form.title),
                    category: Some(form.category),
                    description: Some(form.description),
                    image: form.image,
                },
            }
        }
        DialogSlot::EditTeacherProfile { teacher } => {
            let form = validate_teacher_profile(draft)?;
            Command::UpdateTeacher {
                teacher: teacher.clone(),
                changes: UpdateTeacherRequest {
                    name: Some(form.name),
                    status: form.status,
                    bio: form.bio,
                    location: form.location,
                    rating: form.rating,
                    subjects: None,
                },
            }
        }
        DialogSlot::TeacherCourses { .. } => {
            return Err(CoreError::InvalidTransition {
                dialog: submission.kind,
                action: "submit",
                state: "view-only",
            })
        }
    };
    Ok(command)
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
