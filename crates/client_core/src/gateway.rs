//! Runs typed commands against the course service and settles them into the
//! entity store.
//!
//! Each command is single-flight per `(kind, key)`. A command that has been
//! accepted runs on its own task, so dropping the caller's future (for example
//! because a dialog was closed) does not cancel the remote write. Success
//! applies exactly one store update; failure leaves the collections untouched.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{CourseId, TeacherId},
    protocol::{
        AddStudentRequest, CreateCourseRequest, CreateModuleRequest, TeacherQuery,
        UpdateCourseRequest, UpdateTeacherRequest,
    },
};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    command::{Command, CommandKind, CommandOutcome, FlightKey},
    error::CoreError,
    persistence::{CourseService, ImageUpload, PersistenceError},
    session::SessionContext,
    store::{EntityStore, RequestStatus},
};

/// Wire payload after ids and ownership have been mapped in.
enum Request {
    FetchCourses,
    CreateCourse(CreateCourseRequest),
    UpdateCourse(CourseId, UpdateCourseRequest),
    DeleteCourse(CourseId),
    FetchModules(CourseId),
    CreateModule(CreateModuleRequest),
    AddStudent(AddStudentRequest),
    FetchTeachers(TeacherQuery),
    FetchTeacher(TeacherId),
    UpdateTeacher(TeacherId, UpdateTeacherRequest),
    UploadTeacherImage(TeacherId, ImageUpload),
    FetchTeacherCourses(TeacherId),
}

type InFlight = Arc<Mutex<HashSet<FlightKey>>>;

/// Releases the single-flight reservation when the command task ends, however
/// it ends.
struct FlightGuard {
    in_flight: InFlight,
    key: FlightKey,
}

impl FlightGuard {
    fn reserve(in_flight: &InFlight, key: FlightKey) -> Result<Self, CoreError> {
        let mut reserved = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !reserved.insert(key.clone()) {
            warn!(command = %key.kind, key = %key.key, "rejecting duplicate in-flight command");
            return Err(CoreError::CommandInFlight {
                kind: key.kind,
                key: key.key,
            });
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            key,
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// An accepted command. Awaiting it is optional; the command settles either way.
pub struct PendingCommand {
    kind: CommandKind,
    handle: JoinHandle<Result<CommandOutcome, CoreError>>,
}

impl PendingCommand {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub async fn settled(self) -> Result<CommandOutcome, CoreError> {
        let kind = self.kind;
        self.handle.await.unwrap_or_else(|err| {
            Err(CoreError::NetworkOrService {
                status: None,
                message: format!("{kind} ended unexpectedly: {err}"),
            })
        })
    }
}

pub struct CommandGateway {
    service: Arc<dyn CourseService>,
    session: SessionContext,
    store: Mutex<EntityStore>,
    in_flight: InFlight,
}

impl CommandGateway {
    pub fn new(service: Arc<dyn CourseService>, session: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            service,
            session,
            store: Mutex::new(EntityStore::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn lock_store(&self) -> MutexGuard<'_, EntityStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read access to the store. The closure must not block.
    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        f(&self.lock_store())
    }

    pub fn status(&self, kind: CommandKind) -> RequestStatus {
        self.lock_store().status(kind)
    }

    pub fn is_in_flight(&self, key: &FlightKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub async fn dispatch(self: &Arc<Self>, command: Command) -> Result<CommandOutcome, CoreError> {
        self.submit(command)?.settled().await
    }

    /// Accepts a command and starts it. Duplicate flights and attribution
    /// failures are rejected here, before anything is sent.
    pub fn submit(self: &Arc<Self>, command: Command) -> Result<PendingCommand, CoreError> {
        let flight = command.flight_key();
        let kind = flight.kind;
        let guard = FlightGuard::reserve(&self.in_flight, flight)?;

        let request = match self.prepare(command) {
            Ok(request) => request,
            Err(err) => {
                warn!(command = %kind, error = %err, "command rejected before dispatch");
                self.lock_store().set_status(
                    kind,
                    RequestStatus::Failed {
                        error: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        let ticket = self.lock_store().begin_request(kind);
        let span = info_span!(
            "command",
            id = %Uuid::new_v4(),
            kind = %kind,
            key = %guard.key.key
        );
        let gateway = Arc::clone(self);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                gateway.execute(kind, ticket, request).await
            }
            .instrument(span),
        );

        Ok(PendingCommand { kind, handle })
    }

    fn prepare(&self, command: Command) -> Result<Request, CoreError> {
        let request = match command {
            Command::FetchCourses => Request::FetchCourses,
            Command::AddCourse(course) => Request::CreateCourse(CreateCourseRequest {
                title: course.title,
                category: course.category,
                description: course.description,
                image: course.image,
                teacher_id: self.session.attributed_owner()?,
            }),
            Command::UpdateCourse { course, changes } => Request::UpdateCourse(course, changes),
            Command::DeleteCourse { course } => Request::DeleteCourse(course),
            Command::FetchModules { course } => Request::FetchModules(course),
            Command::AddModule(module) => Request::CreateModule(CreateModuleRequest {
                title: module.title,
                description: module.description,
                start_time: module.start_time,
                end_time: module.end_time,
                course_id: module.course,
                teacher_id: self.session.attributed_owner()?,
            }),
            Command::AddStudent(student) => Request::AddStudent(AddStudentRequest {
                name: student.name,
                email: student.email,
                phone: student.phone,
                course_id: student.course,
                teacher_id: self.session.attributed_owner()?,
            }),
            Command::FetchTeachers(search) => Request::FetchTeachers(search.query),
            Command::FetchTeacher { teacher } => Request::FetchTeacher(teacher),
            Command::UpdateTeacher { teacher, changes } => Request::UpdateTeacher(teacher, changes),
            Command::UpdateTeacherImage { teacher, upload } => {
                Request::UploadTeacherImage(teacher, upload)
            }
            Command::FetchTeacherCourses { teacher } => Request::FetchTeacherCourses(teacher),
        };
        Ok(request)
    }

    async fn call(&self, request: Request) -> Result<CommandOutcome, PersistenceError> {
        let service = &self.service;
        let outcome = match request {
            Request::FetchCourses => CommandOutcome::Courses(service.list_courses().await?),
            Request::CreateCourse(body) => CommandOutcome::Course(service.create_course(&body).await?),
            Request::UpdateCourse(course, body) => {
                CommandOutcome::Course(service.update_course(&course, &body).await?)
            }
            Request::DeleteCourse(course) => {
                service.delete_course(&course).await?;
                CommandOutcome::CourseDeleted(course)
            }
            Request::FetchModules(course) => {
                CommandOutcome::Modules(service.list_modules(&course).await?)
            }
            Request::CreateModule(body) => CommandOutcome::Module(service.create_module(&body).await?),
            Request::AddStudent(body) => {
                let mut student = service.add_student(&body).await?;
                student.enrollments.insert(body.course_id);
                CommandOutcome::Student(student)
            }
            Request::FetchTeachers(query) => {
                CommandOutcome::Teachers(service.list_teachers(&query).await?)
            }
            Request::FetchTeacher(teacher) => {
                CommandOutcome::Teacher(service.get_teacher(&teacher).await?)
            }
            Request::UpdateTeacher(teacher, body) => {
                CommandOutcome::Teacher(service.update_teacher(&teacher, &body).await?)
            }
            Request::UploadTeacherImage(teacher, upload) => {
                CommandOutcome::Teacher(service.upload_teacher_image(&teacher, upload).await?)
            }
            Request::FetchTeacherCourses(teacher) => {
                let courses = service.teacher_courses(&teacher).await?;
                CommandOutcome::TeacherCourses { teacher, courses }
            }
        };
        Ok(outcome)
    }

    async fn execute(
        &self,
        kind: CommandKind,
        ticket: u64,
        request: Request,
    ) -> Result<CommandOutcome, CoreError> {
        let result = self
            .call(request)
            .await
            .map_err(|err| classify_failure(kind, err));

        let mut store = self.lock_store();
        let settled = result.and_then(|outcome| store.apply(&outcome).map(|()| outcome));
        let status = match &settled {
            Ok(_) => {
                info!("command settled");
                RequestStatus::Succeeded
            }
            Err(err) => {
                warn!(error = %err, "command failed");
                RequestStatus::Failed {
                    error: err.to_string(),
                }
            }
        };
        if !store.finish_request(kind, ticket, status) {
            debug!("status left to a newer request of the same kind");
        }
        settled
    }
}

fn classify_failure(kind: CommandKind, err: PersistenceError) -> CoreError {
    if kind == CommandKind::AddModule && err.is_duplicate_title() {
        return CoreError::DuplicateTitle {
            message: err.user_message(),
        };
    }
    CoreError::NetworkOrService {
        status: err.status(),
        message: err.user_message(),
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
