//! Typed commands accepted by the gateway and the outcomes they settle with.

use std::fmt;

use chrono::NaiveDateTime;
use shared::{
    domain::{Course, CourseId, Module, Student, Teacher, TeacherId},
    protocol::{TeacherQuery, UpdateCourseRequest, UpdateTeacherRequest},
};

use crate::persistence::ImageUpload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    FetchCourses,
    AddCourse,
    UpdateCourse,
    DeleteCourse,
    FetchModules,
    AddModule,
    AddStudent,
    FetchTeachers,
    FetchTeacher,
    UpdateTeacher,
    UpdateTeacherImage,
    FetchTeacherCourses,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::FetchCourses => "fetchCourses",
            CommandKind::AddCourse => "addCourse",
            CommandKind::UpdateCourse => "updateCourse",
            CommandKind::DeleteCourse => "deleteCourse",
            CommandKind::FetchModules => "fetchModules",
            CommandKind::AddModule => "addModule",
            CommandKind::AddStudent => "addStudent",
            CommandKind::FetchTeachers => "fetchTeachers",
            CommandKind::FetchTeacher => "fetchTeacher",
            CommandKind::UpdateTeacher => "updateTeacher",
            CommandKind::UpdateTeacherImage => "updateTeacherImage",
            CommandKind::FetchTeacherCourses => "fetchTeacherCourses",
        }
    }

    /// Creation commands carry the signed-in actor as owner.
    pub fn requires_attribution(self) -> bool {
        matches!(
            self,
            CommandKind::AddCourse | CommandKind::AddModule | CommandKind::AddStudent
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub title: String,
    pub category: String,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewModule {
    pub course: CourseId,
    pub title: String,
    pub description: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub course: CourseId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// One filtered teacher listing. `request` is the projector's stamp, so each
/// search is its own flight and never collides with a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherSearch {
    pub query: TeacherQuery,
    pub request: u64,
}

#[derive(Debug, Clone)]
pub enum Command {
    FetchCourses,
    AddCourse(NewCourse),
    UpdateCourse {
        course: CourseId,
        changes: UpdateCourseRequest,
    },
    DeleteCourse {
        course: CourseId,
    },
    FetchModules {
        course: CourseId,
    },
    AddModule(NewModule),
    AddStudent(NewStudent),
    FetchTeachers(TeacherSearch),
    FetchTeacher {
        teacher: TeacherId,
    },
    UpdateTeacher {
        teacher: TeacherId,
        changes: UpdateTeacherRequest,
    },
    UpdateTeacherImage {
        teacher: TeacherId,
        upload: ImageUpload,
    },
    FetchTeacherCourses {
        teacher: TeacherId,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::FetchCourses => CommandKind::FetchCourses,
            Command::AddCourse(_) => CommandKind::AddCourse,
            Command::UpdateCourse { .. } => CommandKind::UpdateCourse,
            Command::DeleteCourse { .. } => CommandKind::DeleteCourse,
            Command::FetchModules { .. } => CommandKind::FetchModules,
            Command::AddModule(_) => CommandKind::AddModule,
            Command::AddStudent(_) => CommandKind::AddStudent,
            Command::FetchTeachers(_) => CommandKind::FetchTeachers,
            Command::FetchTeacher { .. } => CommandKind::FetchTeacher,
            Command::UpdateTeacher { .. } => CommandKind::UpdateTeacher,
            Command::UpdateTeacherImage { .. } => CommandKind::UpdateTeacherImage,
            Command::FetchTeacherCourses { .. } => CommandKind::FetchTeacherCourses,
        }
    }

    /// Logical key within the command kind; at most one command per
    /// `(kind, key)` runs at a time.
    pub fn flight_key(&self) -> FlightKey {
        let key = match self {
            Command::FetchCourses | Command::AddCourse(_) => String::new(),
            Command::UpdateCourse { course, .. }
            | Command::DeleteCourse { course }
            | Command::FetchModules { course } => course.to_string(),
            Command::AddModule(module) => module.course.to_string(),
            Command::AddStudent(student) => student.course.to_string(),
            Command::FetchTeachers(search) => search.request.to_string(),
            Command::FetchTeacher { teacher }
            | Command::UpdateTeacher { teacher, .. }
            | Command::UpdateTeacherImage { teacher, .. }
            | Command::FetchTeacherCourses { teacher } => teacher.to_string(),
        };
        FlightKey {
            kind: self.kind(),
            key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlightKey {
    pub kind: CommandKind,
    pub key: String,
}

/// Canonical records a command settled with, as stored.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Courses(Vec<Course>),
    Course(Course),
    CourseDeleted(CourseId),
    Modules(Vec<Module>),
    Module(Module),
    Student(Student),
    Teachers(Vec<Teacher>),
    Teacher(Teacher),
    TeacherCourses {
        teacher: TeacherId,
        courses: Vec<Course>,
    },
}
