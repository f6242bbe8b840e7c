//! One finite-state machine per dialog kind.
//!
//! `Closed -> Open -> Submitting -> (Closed | Open with error)`. A dialog kind
//! has at most one live instance, and a second submit while one is settling is
//! rejected instead of queued.

use std::{collections::HashMap, fmt};

use shared::domain::{CourseId, TeacherId};
use tracing::debug;

use crate::{
    command::CommandKind,
    error::CoreError,
    validation::{FormKind, RawForm},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogKind {
    AddModule,
    AddStudent,
    CreateCourse,
    EditCourse,
    EditTeacherProfile,
    TeacherCourses,
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialogKind::AddModule => "add-module",
            DialogKind::AddStudent => "add-student",
            DialogKind::CreateCourse => "create-course",
            DialogKind::EditCourse => "edit-course",
            DialogKind::EditTeacherProfile => "edit-teacher-profile",
            DialogKind::TeacherCourses => "teacher-courses",
        };
        f.write_str(name)
    }
}

/// A dialog kind bound to the record it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogSlot {
    AddModule { course: CourseId },
    AddStudent { course: CourseId },
    CreateCourse,
    EditCourse { course: CourseId },
    EditTeacherProfile { teacher: TeacherId },
    TeacherCourses { teacher: TeacherId },
}

impl DialogSlot {
    pub fn kind(&self) -> DialogKind {
        match self {
            DialogSlot::AddModule { .. } => DialogKind::AddModule,
            DialogSlot::AddStudent { .. } => DialogKind::AddStudent,
            DialogSlot::CreateCourse => DialogKind::CreateCourse,
            DialogSlot::EditCourse { .. } => DialogKind::EditCourse,
            DialogSlot::EditTeacherProfile { .. } => DialogKind::EditTeacherProfile,
            DialogSlot::TeacherCourses { .. } => DialogKind::TeacherCourses,
        }
    }

    /// `None` for view-only dialogs.
    pub fn form_kind(&self) -> Option<FormKind> {
        match self {
            DialogSlot::AddModule { .. } => Some(FormKind::Module),
            DialogSlot::AddStudent { .. } => Some(FormKind::Student),
            DialogSlot::CreateCourse | DialogSlot::EditCourse { .. } => Some(FormKind::Course),
            DialogSlot::EditTeacherProfile { .. } => Some(FormKind::TeacherProfile),
            DialogSlot::TeacherCourses { .. } => None,
        }
    }

    pub fn command_kind(&self) -> CommandKind {
        match self {
            DialogSlot::AddModule { .. } => CommandKind::AddModule,
            DialogSlot::AddStudent { .. } => CommandKind::AddStudent,
            DialogSlot::CreateCourse => CommandKind::AddCourse,
            DialogSlot::EditCourse { .. } => CommandKind::UpdateCourse,
            DialogSlot::EditTeacherProfile { .. } => CommandKind::UpdateTeacher,
            DialogSlot::TeacherCourses { .. } => CommandKind::FetchTeacherCourses,
        }
    }

    fn target(&self) -> String {
        match self {
            DialogSlot::AddModule { course }
            | DialogSlot::AddStudent { course }
            | DialogSlot::EditCourse { course } => course.to_string(),
            DialogSlot::EditTeacherProfile { teacher } | DialogSlot::TeacherCourses { teacher } => {
                teacher.to_string()
            }
            DialogSlot::CreateCourse => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModalState {
    #[default]
    Closed,
    Open {
        slot: DialogSlot,
        draft: RawForm,
        error: Option<CoreError>,
    },
    Submitting {
        slot: DialogSlot,
        draft: RawForm,
        submission: u64,
    },
}

impl ModalState {
    fn name(&self) -> &'static str {
        match self {
            ModalState::Closed => "closed",
            ModalState::Open { .. } => "open",
            ModalState::Submitting { .. } => "submitting",
        }
    }

    pub fn slot(&self) -> Option<&DialogSlot> {
        match self {
            ModalState::Closed => None,
            ModalState::Open { slot, .. } | ModalState::Submitting { slot, .. } => Some(slot),
        }
    }

    pub fn draft(&self) -> Option<&RawForm> {
        match self {
            ModalState::Closed => None,
            ModalState::Open { draft, .. } | ModalState::Submitting { draft, .. } => Some(draft),
        }
    }

    pub fn error(&self) -> Option<&CoreError> {
        match self {
            ModalState::Open { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, ModalState::Closed)
    }
}

/// Handed out by [`ModalController::begin_submit`] and returned on settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub kind: DialogKind,
    pub id: u64,
    pub slot: DialogSlot,
    pub draft: RawForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
    /// Closed while submitting. The slot is reset now; the command still
    /// settles into the store but its outcome no longer reaches the dialog.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Completed,
    Reopened(CoreError),
    /// The dialog was closed or replaced before the command settled.
    Discarded,
}

#[derive(Debug, Default)]
pub struct ModalController {
    dialogs: HashMap<DialogKind, ModalState>,
    next_submission: u64,
}

static CLOSED: ModalState = ModalState::Closed;

impl ModalController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: DialogKind) -> &ModalState {
        self.dialogs.get(&kind).unwrap_or(&CLOSED)
    }

    fn invalid(kind: DialogKind, action: &'static str, state: &ModalState) -> CoreError {
        CoreError::InvalidTransition {
            dialog: kind,
            action,
            state: state.name(),
        }
    }

    pub fn open(&mut self, slot: DialogSlot, draft: RawForm) -> Result<(), CoreError> {
        let kind = slot.kind();
        let current = self.state(kind);
        if !matches!(current, ModalState::Closed) {
            return Err(Self::invalid(kind, "open", current));
        }
        debug!(dialog = %kind, target = %slot.target(), "modal: open");
        self.dialogs.insert(
            kind,
            ModalState::Open {
                slot,
                draft,
                error: None,
            },
        );
        Ok(())
    }

    pub fn edit(
        &mut self,
        kind: DialogKind,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        if let Some(ModalState::Open { draft, .. }) = self.dialogs.get_mut(&kind) {
            draft.set(field, value);
            return Ok(());
        }
        Err(Self::invalid(kind, "edit", self.state(kind)))
    }

    /// Keeps the dialog open and records an error found before dispatch.
    pub fn reject(&mut self, kind: DialogKind, rejection: CoreError) -> Result<(), CoreError> {
        if let Some(ModalState::Open { error, .. }) = self.dialogs.get_mut(&kind) {
            *error = Some(rejection);
            return Ok(());
        }
        Err(Self::invalid(kind, "reject", self.state(kind)))
    }

    pub fn begin_submit(&mut self, kind: DialogKind) -> Result<Submission, CoreError> {
        let id = self.next_submission + 1;
        let state = self.dialogs.remove(&kind).unwrap_or_default();
        match state {
            ModalState::Open { slot, draft, .. } => {
                self.next_submission = id;
                debug!(dialog = %kind, submission = id, "modal: submitting");
                self.dialogs.insert(
                    kind,
                    ModalState::Submitting {
                        slot: slot.clone(),
                        draft: draft.clone(),
                        submission: id,
                    },
                );
                Ok(Submission {
                    kind,
                    id,
                    slot,
                    draft,
                })
            }
            submitting @ ModalState::Submitting { .. } => {
                let err = match submitting.slot() {
                    Some(slot) => CoreError::CommandInFlight {
                        kind: slot.command_kind(),
                        key: slot.target(),
                    },
                    None => Self::invalid(kind, "submit", &submitting),
                };
                self.dialogs.insert(kind, submitting);
                Err(err)
            }
            ModalState::Closed => Err(Self::invalid(kind, "submit", &CLOSED)),
        }
    }

    pub fn settle(
        &mut self,
        submission: &Submission,
        result: Result<(), CoreError>,
    ) -> SettleOutcome {
        let kind = submission.kind;
        // A close or a newer submission since `begin_submit` makes this one stale.
        let current = match self.dialogs.get(&kind) {
            Some(ModalState::Submitting { submission, .. }) => Some(*submission),
            _ => None,
        };
        if current != Some(submission.id) {
            debug!(dialog = %kind, submission = submission.id, "modal: stale submission settled");
            return SettleOutcome::Discarded;
        }

        match result {
            Ok(()) => {
                debug!(dialog = %kind, submission = submission.id, "modal: completed");
                self.dialogs.insert(kind, ModalState::Closed);
                SettleOutcome::Completed
            }
            Err(err) => {
                debug!(dialog = %kind, submission = submission.id, error = %err, "modal: reopened with error");
                self.dialogs.insert(
                    kind,
                    ModalState::Open {
                        slot: submission.slot.clone(),
                        draft: submission.draft.clone(),
                        error: Some(err.clone()),
                    },
                );
                SettleOutcome::Reopened(err)
            }
        }
    }

    pub fn close(&mut self, kind: DialogKind) -> CloseOutcome {
        match self.dialogs.get_mut(&kind) {
            None | Some(ModalState::Closed) => CloseOutcome::AlreadyClosed,
            Some(ModalState::Submitting { .. }) => {
                debug!(dialog = %kind, "modal: closed while submitting");
                self.dialogs.insert(kind, ModalState::Closed);
                CloseOutcome::Abandoned
            }
            Some(ModalState::Open { .. }) => {
                debug!(dialog = %kind, "modal: closed");
                self.dialogs.insert(kind, ModalState::Closed);
                CloseOutcome::Closed
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/modal_tests.rs"]
mod tests;
