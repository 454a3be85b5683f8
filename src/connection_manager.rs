use crate::adapter::{ConnectionAdapter, FactoryParams};
use crate::adapter_registry::AdapterRegistry;
use crate::config::DaemonConfig;
use crate::error::{CoreError, Result};
use crate::event_hub::{ConnectionState, EventHub, EventPayload};
use anyhow::Context;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Bounded probe applied to an existing handle before reusing it.
const HEALTH_PROBE_TIMEOUT_MS: u64 = 250;
/// Overall bound on one background connect attempt (construct + connect + ping).
const CONNECT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// A live session: one adapter instance bound to a named target.
///
/// Owned by the manager; other subsystems only borrow it for the duration of
/// an operation. `connected_at` doubles as the generation stamp the schema
/// cache uses to detect a replaced connection.
pub struct ConnectionHandle {
    pub target: String,
    pub adapter: Arc<dyn ConnectionAdapter>,
    pub connected_at: DateTime<Utc>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("target", &self.target)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Connected,
    Connecting,
    Failed,
}

/// What a `connect` call tells its caller immediately; the rest of the story
/// arrives via the event hub.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub result: ConnectResult,
    pub message: String,
}

/// Per-target session state machine: `absent -> connecting -> {connected,
/// failed}`, with a failed probe sending `connected` back through
/// `connecting`. Absence of a handle is the implicit initial/failed state.
///
/// Concurrent `connect` calls for one target may each spawn a background
/// attempt; the last successful install wins and the replaced handle is
/// closed. Unlike node hydration there is deliberately no de-duplication
/// here: losing the race only costs a redundant connect.
pub struct ConnectionManager {
    config: Arc<DaemonConfig>,
    registry: Arc<AdapterRegistry>,
    handles: DashMap<String, Arc<ConnectionHandle>>,
    hub: Arc<EventHub>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<DaemonConfig>,
        registry: Arc<AdapterRegistry>,
        hub: Arc<EventHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            handles: DashMap::new(),
            hub,
        })
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Non-blocking read of the current handle for a target.
    pub fn connection(&self, target: &str) -> Option<Arc<ConnectionHandle>> {
        self.handles.get(target).map(|entry| entry.value().clone())
    }

    pub fn connected_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .handles
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        targets.sort();
        targets
    }

    /// Ensure a target is connected.
    ///
    /// With a live handle this returns `Connected` after a short probe; the
    /// slow path publishes `connecting`, spawns a detached bounded attempt,
    /// and returns `Connecting` immediately.
    pub async fn connect(self: &Arc<Self>, target: &str) -> ConnectOutcome {
        if let Some(handle) = self.connection(target) {
            let probe = timeout(
                Duration::from_millis(HEALTH_PROBE_TIMEOUT_MS),
                handle.adapter.ping(),
            )
            .await;
            match probe {
                Ok(Ok(())) => {
                    debug!("Target '{}' passed health probe, reusing handle", target);
                    self.publish_state(target, ConnectionState::Connected, None, None);
                    return ConnectOutcome {
                        result: ConnectResult::Connected,
                        message: format!("already connected to '{target}'"),
                    };
                }
                Ok(Err(e)) => {
                    warn!("Health probe for '{}' failed: {:#}", target, e);
                }
                Err(_) => {
                    warn!(
                        "Health probe for '{}' timed out after {}ms",
                        target, HEALTH_PROBE_TIMEOUT_MS
                    );
                }
            }
            // Stale handle: discard and reconnect from scratch.
            if let Some((_, stale)) = self.handles.remove(target) {
                tokio::spawn(async move {
                    if let Err(e) = stale.adapter.close().await {
                        debug!("Closing stale handle for '{}': {:#}", stale.target, e);
                    }
                });
            }
        }

        self.publish_state(
            target,
            ConnectionState::Connecting,
            Some(format!("connecting to '{target}'")),
            None,
        );

        let manager = Arc::clone(self);
        let target_name = target.to_string();
        tokio::spawn(async move {
            manager.run_connect_attempt(target_name).await;
        });

        ConnectOutcome {
            result: ConnectResult::Connecting,
            message: format!("connection to '{target}' in progress"),
        }
    }

    /// Detached connect attempt: resolve config and factory, construct the
    /// adapter, connect, ping, then install. Failures are published, never
    /// fatal to the manager.
    async fn run_connect_attempt(self: Arc<Self>, target: String) {
        let attempt = timeout(
            Duration::from_secs(CONNECT_ATTEMPT_TIMEOUT_SECS),
            self.try_connect(&target),
        )
        .await;

        match attempt {
            Ok(Ok(handle)) => {
                info!("Target '{}' connected", target);
                if let Some(previous) = self.handles.insert(target.clone(), handle) {
                    debug!("Replacing previous handle for '{}'", target);
                    tokio::spawn(async move {
                        if let Err(e) = previous.adapter.close().await {
                            debug!("Closing replaced handle for '{}': {:#}", previous.target, e);
                        }
                    });
                }
                self.publish_state(&target, ConnectionState::Connected, None, None);
            }
            Ok(Err(e)) => {
                warn!("Connect attempt for '{}' failed: {:#}", target, e);
                self.publish_state(
                    &target,
                    ConnectionState::Failed,
                    Some(format!("connection to '{target}' failed")),
                    Some(format!("{e:#}")),
                );
            }
            Err(_) => {
                warn!(
                    "Connect attempt for '{}' timed out after {}s",
                    target, CONNECT_ATTEMPT_TIMEOUT_SECS
                );
                self.publish_state(
                    &target,
                    ConnectionState::Failed,
                    Some(format!("connection to '{target}' timed out")),
                    Some(format!(
                        "attempt exceeded {CONNECT_ATTEMPT_TIMEOUT_SECS}s timeout"
                    )),
                );
            }
        }
    }

    async fn try_connect(&self, target: &str) -> Result<Arc<ConnectionHandle>> {
        let target_config = self
            .config
            .target(target)
            .ok_or_else(|| CoreError::UnknownTarget {
                target: target.to_string(),
            })?
            .clone();

        let factory = self
            .registry
            .resolve(&target_config.engine)
            .ok_or_else(|| CoreError::UnsupportedEngine {
                engine: target_config.engine.clone(),
            })?;

        let base_dir = target_config.base_dir.clone();
        let adapter = factory(FactoryParams {
            target_name: target.to_string(),
            target_config,
            base_dir,
        })
        .with_context(|| format!("constructing adapter for target '{target}'"))?;

        adapter
            .connect()
            .await
            .with_context(|| format!("connecting to target '{target}'"))?;
        adapter
            .ping()
            .await
            .with_context(|| format!("pinging target '{target}' after connect"))?;

        Ok(Arc::new(ConnectionHandle {
            target: target.to_string(),
            adapter,
            connected_at: Utc::now(),
        }))
    }

    /// Close every live handle. Shutdown path; errors are logged, not raised.
    pub async fn disconnect_all(&self) {
        let targets: Vec<String> = self
            .handles
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for target in targets {
            if let Some((_, handle)) = self.handles.remove(&target) {
                if let Err(e) = handle.adapter.close().await {
                    warn!("Closing handle for '{}': {:#}", target, e);
                } else {
                    debug!("Closed handle for '{}'", target);
                }
            }
        }
    }

    fn publish_state(
        &self,
        target: &str,
        state: ConnectionState,
        message: Option<String>,
        error: Option<String>,
    ) {
        self.hub.publish(EventPayload::ConnectionState {
            target: target.to_string(),
            state,
            message,
            error,
        });
    }
}
