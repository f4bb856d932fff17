use chrono_tz::Tz;
use std::sync::Arc;
use tally_ai::Summarizer;
use tally_channels::Notifier;
use tally_store::{LogStore, UserStore};

use crate::command_dispatch::CommandDispatcher;
use crate::system_health::SystemMetrics;
use crate::update_reconciler::ReconcilerHealth;

/// Collaborators built once at startup and shared by every service.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn LogStore>,
    pub users: UserStore,
    pub notifier: Notifier,
    pub summarizer: Arc<dyn Summarizer>,
    pub metrics: Arc<dyn SystemMetrics>,
    pub timezone: Tz,
    pub dispatcher: Arc<CommandDispatcher>,
    pub reconciler_health: Arc<ReconcilerHealth>,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn LogStore>,
        users: UserStore,
        notifier: Notifier,
        summarizer: Arc<dyn Summarizer>,
        metrics: Arc<dyn SystemMetrics>,
        timezone: Tz,
    ) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&metrics),
            timezone,
        ));
        Self {
            store,
            users,
            notifier,
            summarizer,
            metrics,
            timezone,
            dispatcher,
            reconciler_health: Arc::new(ReconcilerHealth::default()),
        }
    }
}
