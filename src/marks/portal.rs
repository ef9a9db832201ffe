//! Collaborator seams of the reconciliation engine.
//!
//! The engine never talks HTTP directly. The BRS client, the Google Sheets
//! client and the test fakes all plug in through these traits.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::brs::models::{
    CardType, ControlAction, Discipline, DisciplineQuery, FailureWrite, MarkType, MarkWrite,
    PortalStudent,
};

/// How the caller should react to a collaborator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Re-authenticate before trying again.
    SessionExpired,
    /// Network or server trouble; retry later.
    NetworkUnavailable,
    Generic,
}

/// Error returned by every collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("session is invalid or expired: {0}")]
    SessionExpired(String),
    #[error("service unavailable, try again later")]
    Unavailable(#[source] anyhow::Error),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionExpired(_) => ErrorKind::SessionExpired,
            Self::Unavailable(_) => ErrorKind::NetworkUnavailable,
            Self::Failed(_) => ErrorKind::Generic,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind() == ErrorKind::SessionExpired
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Lists the disciplines visible to the authenticated teacher.
#[async_trait]
pub trait DisciplineDirectory: Send + Sync {
    async fn fetch_disciplines(&self, query: &DisciplineQuery) -> ServiceResult<Vec<Discipline>>;
}

/// Read and write access to one discipline's mark sheets.
#[async_trait]
pub trait Portal: Send + Sync {
    async fn fetch_control_actions(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<ControlAction>>;

    /// Partial roster: only the students and marks of one card/mark sheet.
    async fn fetch_student_marks(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<PortalStudent>>;

    async fn put_mark(&self, write: &MarkWrite) -> ServiceResult<()>;

    async fn put_failure(&self, write: &FailureWrite) -> ServiceResult<()>;
}

/// Source of raw spreadsheet cells.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Read an A1 range as ragged rows of display strings.
    async fn read_range(&self, spreadsheet_id: &str, a1_range: &str)
    -> ServiceResult<Vec<Vec<String>>>;
}

// Shared handles let one client serve as both directory and portal.

#[async_trait]
impl<T: DisciplineDirectory + ?Sized> DisciplineDirectory for Arc<T> {
    async fn fetch_disciplines(&self, query: &DisciplineQuery) -> ServiceResult<Vec<Discipline>> {
        (**self).fetch_disciplines(query).await
    }
}

#[async_trait]
impl<T: Portal + ?Sized> Portal for Arc<T> {
    async fn fetch_control_actions(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<ControlAction>> {
        (**self)
            .fetch_control_actions(discipline, card_type, mark_type)
            .await
    }

    async fn fetch_student_marks(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<PortalStudent>> {
        (**self)
            .fetch_student_marks(discipline, card_type, mark_type)
            .await
    }

    async fn put_mark(&self, write: &MarkWrite) -> ServiceResult<()> {
        (**self).put_mark(write).await
    }

    async fn put_failure(&self, write: &FailureWrite) -> ServiceResult<()> {
        (**self).put_failure(write).await
    }
}

#[async_trait]
impl<T: SheetSource + ?Sized> SheetSource for Arc<T> {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        a1_range: &str,
    ) -> ServiceResult<Vec<Vec<String>>> {
        (**self).read_range(spreadsheet_id, a1_range).await
    }
}
