//! Wires configuration, sources, agents and the hub together.

use crate::config::CoordinatorConfig;
use crate::hub::CoordinationHub;
use crate::router::build_router;
use nimbus_agents::{AlertAgent, IntelligenceAgent, TravelAgent, WeatherAgent};
use nimbus_alerts::{
    AlertEvaluator, AlertMonitor, ConditionsProvider, InMemorySubscriptionStore, NotificationSink,
    SubscriptionStore,
};
use nimbus_fusion::{ConsensusFuser, SourceSet};
use nimbus_llm::{build_llm_client, LlmClient};
use std::sync::Arc;
use tracing::info;

/// A fully assembled coordinator.
pub struct Nimbus {
    config: CoordinatorConfig,
    hub: CoordinationHub,
    evaluator: Arc<AlertEvaluator>,
}

impl Nimbus {
    /// Build every component from `config` over the given sources.
    ///
    /// Subscriptions live in a fresh in-memory store; alert events go to `sink`.
    pub fn build(
        config: CoordinatorConfig,
        sources: SourceSet,
        sink: Arc<dyn NotificationSink>,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn SubscriptionStore> = Arc::new(InMemorySubscriptionStore::new());
        Self::build_with_store(config, sources, store, sink)
    }

    pub fn build_with_store(
        config: CoordinatorConfig,
        sources: SourceSet,
        store: Arc<dyn SubscriptionStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let llm: Option<Arc<dyn LlmClient>> = config.llm.as_ref().map(build_llm_client).transpose()?;
        let fuser = ConsensusFuser::new(config.fusion.clone());

        let intelligence = Arc::new(IntelligenceAgent::with_default_config(
            sources.clone(),
            fuser.clone(),
        ));
        let conditions: Arc<dyn ConditionsProvider> = intelligence.clone();
        let evaluator = Arc::new(AlertEvaluator::new(
            store,
            conditions.clone(),
            sink,
            config.alerts.cooldown(),
        ));

        let alerts = AlertAgent::with_default_config(evaluator.clone(), conditions, config.alerts.clone());

        let mut travel = TravelAgent::with_default_config(sources.clone(), fuser)
            .enabled(config.hub.travel_enabled);
        if let (Some(client), Some(llm_config)) = (&llm, &config.llm) {
            travel = travel.with_llm(client.clone(), llm_config.timeout());
        }

        let weather = WeatherAgent::with_default_config(sources);
        let router = build_router(&config.router, llm)?;

        info!(
            router = %router.name(),
            travel_enabled = config.hub.travel_enabled,
            request_timeout_ms = config.hub.request_timeout_ms,
            "Coordinator assembled"
        );

        let hub = CoordinationHub::new(router, config.hub.request_timeout())
            .add_agent(Arc::new(weather))
            .add_agent(intelligence)
            .add_agent(Arc::new(alerts))
            .add_agent(Arc::new(travel));

        Ok(Self {
            config,
            hub,
            evaluator,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn hub(&self) -> &CoordinationHub {
        &self.hub
    }

    pub fn evaluator(&self) -> &Arc<AlertEvaluator> {
        &self.evaluator
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        self.evaluator.store()
    }

    /// The periodic monitor over this coordinator's subscriptions.
    pub fn monitor(&self) -> AlertMonitor {
        AlertMonitor::new(
            self.evaluator.clone(),
            self.config.alerts.check_interval(),
            self.config.alerts.error_backoff(),
        )
    }
}
