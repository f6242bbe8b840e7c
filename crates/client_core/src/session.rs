//! Read-only view of the signed-in actor, injected into the command gateway.

use shared::{
    domain::{Role, TeacherId, UserId},
    protocol::UserInfoRecord,
};
use storage::SessionStore;
use tracing::warn;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub role: Role,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    identity: Option<SessionIdentity>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// Builds the context from the raw persisted `userInfo` record. A missing,
    /// unparsable or id-less record yields an anonymous context.
    pub fn from_user_info(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::anonymous();
        };

        let record = match serde_json::from_str::<UserInfoRecord>(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "session: ignoring corrupt user info record");
                return Self::anonymous();
            }
        };

        if record.data.id.is_blank() {
            warn!("session: user info record has no id");
            return Self::anonymous();
        }

        Self::new(SessionIdentity {
            user_id: record.data.id,
            role: record.data.role,
            token: record.data.token,
        })
    }

    pub async fn from_store(store: &SessionStore) -> Self {
        match store.load_user_info().await {
            Ok(raw) => Self::from_user_info(raw.as_deref()),
            Err(err) => {
                warn!(error = %err, "session: failed to read persisted user info");
                Self::anonymous()
            }
        }
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.identity.as_ref()?.token.as_deref()
    }

    /// Owner recorded on courses, modules and enrollments created by this actor.
    pub fn attributed_owner(&self) -> Result<TeacherId, CoreError> {
        match &self.identity {
            Some(identity) => Ok(TeacherId::new(identity.user_id.as_str())),
            None => Err(CoreError::Attribution {
                reason: "no signed-in user is stored for this dashboard".to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
