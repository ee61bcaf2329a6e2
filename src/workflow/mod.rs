// Workflow orchestration - reducer store plus the controllers that drive it
pub mod production;
pub mod regeneration;
pub mod stages;
pub mod state;

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};
use crate::gateway::{ArtifactFetcher, CredentialProbe, GenerationGateway};
use crate::models::BinaryRef;

pub use production::{ProductionReport, ProductionRun, SegmentOrchestrator, TaskOutcome};
pub use regeneration::RegenerationController;
pub use stages::StageController;
pub use state::{reduce, TaskTarget, WorkflowStore, WorkflowUpdate};

/// How the user picks the Production anchor image.
#[derive(Debug, Clone)]
pub enum ReferenceChoice {
    Candidate(String),
    Upload(BinaryRef),
}

/// Handles shared by every controller of one studio.
pub struct StudioContext {
    pub store: WorkflowStore,
    pub gateway: Arc<dyn GenerationGateway>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub credentials: Arc<dyn CredentialProbe>,
    pub config: StudioConfig,
    /// Cancelled and replaced on restart.
    session_token: Mutex<CancellationToken>,
}

impl StudioContext {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        fetcher: Arc<dyn ArtifactFetcher>,
        credentials: Arc<dyn CredentialProbe>,
        config: StudioConfig,
    ) -> Self {
        Self {
            store: WorkflowStore::new(),
            gateway,
            fetcher,
            credentials,
            config,
            session_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Token observed by all work started in the current session.
    pub fn session_token(&self) -> CancellationToken {
        self.session_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn renew_session_token(&self) {
        let mut token = self
            .session_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Dispatch an update that must apply. A rejection caused by a restart is
    /// reported as `Cancelled`, anything else as a precondition failure.
    pub(crate) fn commit(&self, session: u64, update: WorkflowUpdate, what: &str) -> StudioResult<()> {
        if self.store.dispatch(update) {
            return Ok(());
        }
        if self.store.snapshot().session != session {
            return Err(StudioError::Cancelled(format!("{} was superseded by a restart", what)));
        }
        Err(StudioError::PreconditionError(format!("{} no longer applies", what)))
    }
}
