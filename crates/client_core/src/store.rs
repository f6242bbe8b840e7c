//! Normalized in-memory cache of dashboard records.
//!
//! The store never talks to the course service. It is written only when the
//! gateway settles a command, and every write either applies completely or is
//! rejected before touching any collection.

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use shared::domain::{Course, CourseId, Module, ModuleId, Student, StudentId, Teacher, TeacherId};

use crate::{
    command::{CommandKind, CommandOutcome},
    error::CoreError,
};

pub trait Entity: Clone + PartialEq + Debug {
    type Id: Clone + Eq + Hash + Debug;

    const NAME: &'static str;

    fn id(&self) -> &Self::Id;

    fn raw_id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ty, $id:ty, $name:literal) => {
        impl Entity for $ty {
            type Id = $id;

            const NAME: &'static str = $name;

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn raw_id(&self) -> &str {
                self.id.as_str()
            }
        }
    };
}

entity!(Course, CourseId, "course");
entity!(Module, ModuleId, "module");
entity!(Teacher, TeacherId, "teacher");
entity!(Student, StudentId, "student");

/// Records of one kind, listed in the order they were first delivered.
#[derive(Debug, Clone)]
pub struct Collection<T: Entity> {
    records: HashMap<T::Id, T>,
    order: Vec<T::Id>,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Entity> PartialEq for Collection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.records == other.records
    }
}

impl<T: Entity> Collection<T> {
    pub fn list(&self) -> Vec<&T> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts or replaces by id. Returns whether observable state changed.
    pub fn upsert(&mut self, entity: T) -> Result<bool, CoreError> {
        check_id(&entity)?;
        Ok(self.insert_checked(entity))
    }

    /// All-or-nothing: one malformed record rejects the whole batch.
    pub fn upsert_many(&mut self, entities: Vec<T>) -> Result<bool, CoreError> {
        entities.iter().try_for_each(check_id)?;
        let mut changed = false;
        for entity in entities {
            changed |= self.insert_checked(entity);
        }
        Ok(changed)
    }

    /// Replaces the whole collection with an authoritative listing.
    pub fn replace_all(&mut self, entities: Vec<T>) -> Result<(), CoreError> {
        entities.iter().try_for_each(check_id)?;
        self.records.clear();
        self.order.clear();
        for entity in entities {
            self.insert_checked(entity);
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        let removed = self.records.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    fn insert_checked(&mut self, entity: T) -> bool {
        let id = entity.id().clone();
        match self.records.get(&id) {
            Some(existing) if *existing == entity => false,
            Some(_) => {
                self.records.insert(id, entity);
                true
            }
            None => {
                self.order.push(id.clone());
                self.records.insert(id, entity);
                true
            }
        }
    }
}

fn check_id<T: Entity>(entity: &T) -> Result<(), CoreError> {
    if entity.raw_id().trim().is_empty() {
        return Err(CoreError::MalformedEntity {
            entity: T::NAME,
            reason: "record has no id".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed {
        error: String,
    },
}

impl RequestStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RequestStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Status of the most recently started request of one kind.
#[derive(Debug, Clone, Default, PartialEq)]
struct StatusSlot {
    latest: u64,
    status: RequestStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    pub courses: Collection<Course>,
    pub modules: Collection<Module>,
    pub teachers: Collection<Teacher>,
    pub students: Collection<Student>,
    teacher_courses: HashMap<TeacherId, Vec<CourseId>>,
    statuses: HashMap<CommandKind, StatusSlot>,
    next_ticket: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, kind: CommandKind) -> RequestStatus {
        self.statuses
            .get(&kind)
            .map(|slot| slot.status.clone())
            .unwrap_or_default()
    }

    /// Marks a new request of `kind` as pending and returns its ticket.
    pub fn begin_request(&mut self, kind: CommandKind) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.statuses.insert(
            kind,
            StatusSlot {
                latest: ticket,
                status: RequestStatus::Pending,
            },
        );
        ticket
    }

    /// Records how a request ended. Returns `false`, leaving the status alone,
    /// when a newer request of the same kind has started since.
    pub fn finish_request(&mut self, kind: CommandKind, ticket: u64, status: RequestStatus) -> bool {
        match self.statuses.get_mut(&kind) {
            Some(slot) if slot.latest == ticket => {
                slot.status = status;
                true
            }
            _ => false,
        }
    }

    /// Records an outcome that never became a request, such as a command
    /// refused before dispatch.
    pub fn set_status(&mut self, kind: CommandKind, status: RequestStatus) {
        let ticket = self.begin_request(kind);
        self.finish_request(kind, ticket, status);
    }

    pub fn modules_for_course(&self, course: &CourseId) -> Vec<&Module> {
        self.modules
            .list()
            .into_iter()
            .filter(|module| &module.course_ref == course)
            .collect()
    }

    pub fn students_in_course(&self, course: &CourseId) -> Vec<&Student> {
        self.students
            .list()
            .into_iter()
            .filter(|student| student.is_enrolled_in(course))
            .collect()
    }

    /// Courses last reported for a teacher, in delivery order.
    pub fn courses_for_teacher(&self, teacher: &TeacherId) -> Vec<&Course> {
        self.teacher_courses
            .get(teacher)
            .map(|ids| ids.iter().filter_map(|id| self.courses.get(id)).collect())
            .unwrap_or_default()
    }

    /// Writes a settled outcome into the collections as a single unit.
    pub fn apply(&mut self, outcome: &CommandOutcome) -> Result<(), CoreError> {
        match outcome {
            CommandOutcome::Courses(courses) => self.courses.replace_all(courses.clone()),
            CommandOutcome::Course(course) => self.courses.upsert(course.clone()).map(drop),
            CommandOutcome::CourseDeleted(course) => {
                self.courses.remove(course);
                Ok(())
            }
            CommandOutcome::Modules(modules) => {
                self.modules.upsert_many(modules.clone()).map(drop)
            }
            CommandOutcome::Module(module) => self.modules.upsert(module.clone()).map(drop),
            CommandOutcome::Student(student) => self.students.upsert(student.clone()).map(drop),
            CommandOutcome::Teachers(teachers) => {
                self.teachers.upsert_many(teachers.clone()).map(drop)
            }
            CommandOutcome::Teacher(teacher) => self.teachers.upsert(teacher.clone()).map(drop),
            CommandOutcome::TeacherCourses { teacher, courses } => {
                self.courses.upsert_many(courses.clone())?;
                let ids = courses.iter().map(|course| course.id.clone()).collect();
                self.teacher_courses.insert(teacher.clone(), ids);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
