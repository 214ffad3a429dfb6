use std::future::Future;
use std::sync::Arc;

use derive_new::new;
use tokio::sync::watch;

use crate::{
    config::Config,
    database::Database,
    notify::NotificationBus,
    recorder::ViewRecorder,
    store::CounterStore,
    youtube::YouTube,
};

#[derive(Debug, Clone, new)]
pub struct App {
    pub recorder: ViewRecorder,
    pub youtube: YouTube,
    #[new(value = "Arc::new(watch::channel(false).0)")]
    closing: Arc<watch::Sender<bool>>,
}

impl App {
    pub fn recorder(&self) -> &ViewRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &CounterStore {
        self.recorder.store()
    }

    pub fn bus(&self) -> &NotificationBus {
        self.recorder.bus()
    }

    /// Ends every open event stream so that graceful shutdown does not wait on them.
    pub fn close(&self) {
        self.closing.send_replace(true);
    }

    /// Resolves once [App::close] has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closing = self.closing.subscribe();
        async move {
            let _ = closing.wait_for(|closing| *closing).await;
        }
    }
}

pub fn create_app(database: Database, youtube: YouTube, config: &Config) -> App {
    let store = CounterStore::new(database, config.transaction_timeout());
    let bus = NotificationBus::new(config.broadcast_capacity);
    let recorder = ViewRecorder::new(store, bus);

    App::new(recorder, youtube)
}
