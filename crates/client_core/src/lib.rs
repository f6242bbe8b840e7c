//! Client-side state orchestration for the course dashboard: a normalized
//! entity store, a single-flight command gateway over the course service,
//! form validation, dialog state machines and teacher list projection.

pub mod command;
pub mod error;
pub mod gateway;
pub mod modal;
pub mod notify;
pub mod persistence;
pub mod projector;
pub mod session;
pub mod settings;
pub mod store;
pub mod validation;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use command::{Command, CommandKind, CommandOutcome, NewCourse, NewModule, NewStudent};
pub use error::CoreError;
pub use gateway::{CommandGateway, PendingCommand};
pub use modal::{CloseOutcome, DialogKind, DialogSlot, ModalState, SettleOutcome};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use persistence::{CourseService, HttpCourseService, ImageUpload, PersistenceError};
pub use projector::{CourseCountBucket, SortField, TeacherDirectory, TeacherFilter};
pub use session::{SessionContext, SessionIdentity};
pub use settings::{load_settings, ClientSettings};
pub use store::{EntityStore, RequestStatus};
pub use validation::{FormKind, RawForm, ValidationErrors};
pub use workflow::Dashboard;
