use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{ScheduleSettings, ScheduleSettingsDraft};
use storage::repository::SettingsRepository;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::SettingsServiceError;

/// Owns the live schedule settings and broadcasts changes to subscribers.
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    tx: watch::Sender<ScheduleSettings>,
}

impl SettingsService {
    /// Load persisted settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::NotConfigured` when nothing is stored,
    /// or a storage error.
    pub async fn load(repo: Arc<dyn SettingsRepository>) -> Result<Self, SettingsServiceError> {
        let settings = repo
            .get_settings()
            .await?
            .ok_or(SettingsServiceError::NotConfigured)?;
        tracing::info!(
            every_secs = settings.every().num_seconds(),
            order = settings.order().as_str(),
            "schedule settings loaded"
        );
        let (tx, _rx) = watch::channel(settings);
        Ok(Self { repo, tx })
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn current(&self) -> ScheduleSettings {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every future update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScheduleSettings> {
        self.tx.subscribe()
    }

    /// Re-read settings from storage and publish them if they differ from
    /// the current ones.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::NotConfigured` if the row disappeared,
    /// or a storage error. The published settings stay unchanged on error.
    pub async fn reload(&self) -> Result<ScheduleSettings, SettingsServiceError> {
        let settings = self
            .repo
            .get_settings()
            .await?
            .ok_or(SettingsServiceError::NotConfigured)?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == settings {
                return false;
            }
            *current = settings.clone();
            true
        });
        if changed {
            tracing::info!(
                every_secs = settings.every().num_seconds(),
                order = settings.order().as_str(),
                "schedule settings reloaded"
            );
        }
        Ok(settings)
    }

    /// Reload from storage once per `period` until `shutdown` turns true.
    ///
    /// A failed reload is logged and the current settings stay in effect.
    pub async fn reload_every(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately and the settings were just loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.reload().await {
                        tracing::warn!(%error, "settings reload failed, keeping current settings");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Validate, persist and publish new settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` if validation fails or persistence fails.
    pub async fn save(
        &self,
        draft: ScheduleSettingsDraft,
    ) -> Result<ScheduleSettings, SettingsServiceError> {
        let settings = draft.validate()?;
        self.repo.save_settings(&settings).await?;
        self.tx.send_replace(settings.clone());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::DispatchOrder;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn missing_settings_are_fatal() {
        let repo: Arc<dyn SettingsRepository> = Arc::new(InMemoryRepository::new());
        let err = SettingsService::load(repo).await.err().expect("should fail");
        assert!(matches!(err, SettingsServiceError::NotConfigured));
    }

    #[tokio::test]
    async fn save_publishes_to_subscribers() {
        let repo = InMemoryRepository::new();
        repo.save_settings(&ScheduleSettingsDraft::recommended().validate().unwrap())
            .await
            .unwrap();
        let service = SettingsService::load(Arc::new(repo.clone())).await.unwrap();
        let mut rx = service.subscribe();

        let mut draft = service.current().to_draft();
        draft.order = Some(DispatchOrder::ActionFirst);
        service.save(draft).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().order(), DispatchOrder::ActionFirst);
        assert_eq!(
            repo.get_settings().await.unwrap().unwrap().order(),
            DispatchOrder::ActionFirst
        );
    }

    #[tokio::test]
    async fn invalid_draft_leaves_settings_untouched() {
        let repo = InMemoryRepository::new();
        let original = ScheduleSettingsDraft::recommended().validate().unwrap();
        repo.save_settings(&original).await.unwrap();
        let service = SettingsService::load(Arc::new(repo)).await.unwrap();

        let mut draft = original.to_draft();
        draft.time_period_secs = Some(0);
        let err = service.save(draft).await.unwrap_err();
        assert!(matches!(err, SettingsServiceError::Invalid(_)));
        assert_eq!(service.current(), original);
    }

    #[tokio::test]
    async fn reload_picks_up_external_writes() {
        let repo = InMemoryRepository::new();
        repo.save_settings(&ScheduleSettingsDraft::recommended().validate().unwrap())
            .await
            .unwrap();
        let service = SettingsService::load(Arc::new(repo.clone())).await.unwrap();

        let mut draft = ScheduleSettingsDraft::recommended();
        draft.time_period_secs = Some(120);
        repo.save_settings(&draft.validate().unwrap()).await.unwrap();

        let reloaded = service.reload().await.unwrap();
        assert_eq!(reloaded.every().num_seconds(), 120);
        assert_eq!(service.current().every().num_seconds(), 120);
    }

    #[tokio::test]
    async fn reload_without_changes_does_not_notify() {
        let repo = InMemoryRepository::new();
        repo.save_settings(&ScheduleSettingsDraft::recommended().validate().unwrap())
            .await
            .unwrap();
        let service = SettingsService::load(Arc::new(repo)).await.unwrap();
        let rx = service.subscribe();

        service.reload().await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_reload_publishes_external_writes() {
        let repo = InMemoryRepository::new();
        repo.save_settings(&ScheduleSettingsDraft::recommended().validate().unwrap())
            .await
            .unwrap();
        let service = Arc::new(SettingsService::load(Arc::new(repo.clone())).await.unwrap());
        let mut rx = service.subscribe();

        let (stop_tx, stop_rx) = watch::channel(false);
        let reloader = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.reload_every(Duration::from_secs(60), stop_rx).await }
        });

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!rx.has_changed().unwrap());

        let mut draft = ScheduleSettingsDraft::recommended();
        draft.time_period_secs = Some(120);
        repo.save_settings(&draft.validate().unwrap()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().every().num_seconds(), 120);

        stop_tx.send(true).unwrap();
        reloader.await.unwrap();
    }
}
