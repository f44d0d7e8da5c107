use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::dispatch::{DeliveryChannel, DispatchScheduler};
use crate::error::AppServicesError;
use crate::mastery_service::MasteryEstimator;
use crate::planner::RepetitionPlanner;
use crate::rng::SharedRng;
use crate::selection::SelectionEngine;
use crate::sessions::SessionLoopService;
use crate::settings_service::SettingsService;

/// Assembles the quiz services over one storage backend.
#[derive(Clone)]
pub struct QuizServices {
    clock: Clock,
    storage: Storage,
    rng: SharedRng,
    settings: Arc<SettingsService>,
    mastery: Arc<MasteryEstimator>,
    selection: Arc<SelectionEngine>,
    planner: Arc<RepetitionPlanner>,
    session_loop: Arc<SessionLoopService>,
}

impl QuizServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or no
    /// schedule settings are stored.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock, SharedRng::from_os()).await
    }

    /// Build services over an existing storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Settings` if no schedule settings are stored.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        rng: SharedRng,
    ) -> Result<Self, AppServicesError> {
        let settings = Arc::new(SettingsService::load(Arc::clone(&storage.settings)).await?);
        let mastery = Arc::new(MasteryEstimator::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.ledger),
            Arc::clone(&storage.learners),
        ));
        let selection = Arc::new(SelectionEngine::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.ledger),
            Arc::clone(&storage.learners),
            rng.clone(),
        ));
        let planner = Arc::new(RepetitionPlanner::new(
            Arc::clone(&storage.questions),
            Arc::clone(&storage.ledger),
            Arc::clone(&storage.learners),
            rng.clone(),
        ));
        let session_loop = Arc::new(SessionLoopService::new(
            clock,
            Arc::clone(&selection),
            Arc::clone(&storage.questions),
            Arc::clone(&storage.ledger),
            Arc::clone(&settings),
        ));

        Ok(Self {
            clock,
            storage,
            rng,
            settings,
            mastery,
            selection,
            planner,
            session_loop,
        })
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings)
    }

    #[must_use]
    pub fn mastery(&self) -> Arc<MasteryEstimator> {
        Arc::clone(&self.mastery)
    }

    #[must_use]
    pub fn selection(&self) -> Arc<SelectionEngine> {
        Arc::clone(&self.selection)
    }

    #[must_use]
    pub fn planner(&self) -> Arc<RepetitionPlanner> {
        Arc::clone(&self.planner)
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }

    /// Dispatch scheduler wired to these services, subscribed to settings
    /// updates and delivering through `delivery`.
    #[must_use]
    pub fn dispatcher(&self, delivery: Arc<dyn DeliveryChannel>) -> DispatchScheduler {
        DispatchScheduler::new(
            self.planner.as_ref().clone(),
            Arc::clone(&self.storage.questions),
            Arc::clone(&self.storage.ledger),
            Arc::clone(&self.storage.learners),
            delivery,
            self.settings.subscribe(),
            self.rng.clone(),
            self.clock,
        )
    }
}
