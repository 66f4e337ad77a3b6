use std::sync::{Arc, Mutex};

use admin_ipc::{AdminRequest, AdminResponse, AdminStatus};
use anyhow::anyhow;
use notifier::OrderWatch;
use orders::ShopId;
use prefs::SoundSetting;
use storage::Store;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AdminContext {
    pub run_id: String,
    pub watch: Arc<Mutex<OrderWatch>>,
    pub sound: SoundSetting,
    pub store: Store,
}

impl AdminContext {
    pub fn handle(&self, req: AdminRequest) -> anyhow::Result<AdminResponse> {
        match req {
            AdminRequest::Status => Ok(AdminResponse::Status(self.status()?)),
            AdminRequest::Watch { shop_id } => {
                let shop_id = ShopId::new(shop_id)?;
                info!(shop_id = %shop_id, "admin requested watch");
                self.lock_watch()?.set_shop(Some(shop_id));
                Ok(AdminResponse::Ack)
            }
            AdminRequest::Unwatch => {
                info!("admin requested unwatch");
                self.lock_watch()?.set_shop(None);
                Ok(AdminResponse::Ack)
            }
            AdminRequest::SetSound { enabled } => {
                self.sound.set(enabled);
                info!(enabled, "notification sound toggled");
                let store = self.store.clone();
                tokio::spawn(async move {
                    if let Err(err) = store.save_sound_enabled(enabled).await {
                        warn!(error = ?err, "failed to persist sound preference");
                    }
                });
                Ok(AdminResponse::Ack)
            }
        }
    }

    fn lock_watch(&self) -> anyhow::Result<std::sync::MutexGuard<'_, OrderWatch>> {
        self.watch.lock().map_err(|_| anyhow!("order watch poisoned"))
    }

    fn status(&self) -> anyhow::Result<AdminStatus> {
        let status = self.lock_watch()?.status();
        Ok(AdminStatus {
            run_id: self.run_id.clone(),
            shop_id: status.as_ref().map(|s| s.shop_id.to_string()),
            subscription_id: status.as_ref().map(|s| s.subscription_id.to_string()),
            seen_orders: status.as_ref().map(|s| s.seen_orders).unwrap_or(0),
            first_load: status.as_ref().map(|s| s.first_load).unwrap_or(false),
            sound_enabled: self.sound.enabled(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed::FeedHub;
    use notifier::{Collaborators, NotifierOptions};
    use orders::{ChangeKind, ChangeRecord, FeedSnapshot};
    use serde_json::json;
    use std::time::Duration;

    use crate::sinks::{InvalidationCounter, JournalSink};

    async fn context(dir: &tempfile::TempDir, hub: &FeedHub) -> AdminContext {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("orderd.db").display());
        let store = storage::init_sqlite(&url).await.expect("store");
        let metrics = metrics::MetricsHandle::new().expect("metrics");
        let sound = SoundSetting::new(true);
        let (sink, _rx) = JournalSink::new(metrics.clone());
        let collaborators = Collaborators::new(
            Arc::new(InvalidationCounter::new(metrics)),
            Arc::new(sink),
            Arc::new(sound.clone()),
        );
        let watch = OrderWatch::new(
            Arc::new(hub.clone()),
            collaborators,
            NotifierOptions::default(),
        );
        AdminContext {
            run_id: "run-1".into(),
            watch: Arc::new(Mutex::new(watch)),
            sound,
            store,
        }
    }

    fn status(ctx: &AdminContext) -> AdminStatus {
        match ctx.handle(AdminRequest::Status).expect("status") {
            AdminResponse::Status(status) => status,
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn watch_status_and_unwatch() {
        let dir = tempfile::tempdir().expect("temp dir");
        let hub = FeedHub::new();
        let ctx = context(&dir, &hub).await;

        assert_eq!(status(&ctx).shop_id, None);
        ctx.handle(AdminRequest::Watch {
            shop_id: "shop-a".into(),
        })
        .expect("watch");
        let watching = status(&ctx);
        assert_eq!(watching.shop_id.as_deref(), Some("shop-a"));
        assert!(watching.first_load);

        hub.publish_snapshot(FeedSnapshot {
            shop_id: ShopId::new("shop-a").expect("shop"),
            changes: vec![ChangeRecord::new(
                ChangeKind::Added,
                "o1",
                json!({"totalAmount": 5}),
            )],
        });
        for _ in 0..200 {
            if !status(&ctx).first_load {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let loaded = status(&ctx);
        assert!(!loaded.first_load);
        assert_eq!(loaded.seen_orders, 1);

        ctx.handle(AdminRequest::Unwatch).expect("unwatch");
        assert_eq!(status(&ctx).shop_id, None);

        assert!(ctx
            .handle(AdminRequest::Watch {
                shop_id: " ".into()
            })
            .is_err());
    }

    #[tokio::test]
    async fn sound_toggle_is_persisted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let ctx = context(&dir, &FeedHub::new()).await;

        ctx.handle(AdminRequest::SetSound { enabled: false })
            .expect("set sound");
        assert!(!status(&ctx).sound_enabled);

        for _ in 0..200 {
            if !ctx.store.load_sound_enabled().await.expect("load") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sound preference was not persisted");
    }
}
