//! Server setup and lifecycle management

use crate::api::rest::{create_router, AppState};
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    Collaborators, CravingCoach, DisabledCoach, InMemoryDirectory, LogPush, OpenAiCoach,
    PgDirectory, PushDelivery, WebhookPush,
};
use crate::config::{DaemonConfig, LlmConfig, PushConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::rescue::RescueEngine;
use crate::scheduler::EscalationSweeper;
use crate::storage::{InMemorySosStore, PostgresSosStore, SosStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// PARC daemon server
pub struct Server {
    config: DaemonConfig,
    engine: Arc<RescueEngine>,
    sweeper: Arc<EscalationSweeper>,
}

impl Server {
    /// Build storage, collaborators, and the rescue core from `config`
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (store, collaborators) = match &config.storage {
            StorageConfig::Memory => {
                tracing::warn!("Using in-memory storage; flares are lost on restart");
                if config.directory.is_empty() {
                    tracing::warn!("Directory seed is empty; every flare will be rejected with NO_ACTIVE_FAST");
                }
                let directory = Arc::new(InMemoryDirectory::from_seed(&config.directory).await);
                let store: Arc<dyn SosStore> = Arc::new(InMemorySosStore::new());
                let collaborators = Collaborators {
                    fasts: directory.clone(),
                    tribes: directory,
                    push: build_push(&config.push)?,
                    coach: build_coach(&config.llm)?,
                };
                (store, collaborators)
            }
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                if !config.directory.is_empty() {
                    tracing::warn!("Ignoring directory seed; PostgreSQL directory reads the app tables");
                }
                let postgres =
                    PostgresSosStore::new(url, *max_connections, *connect_timeout_secs).await?;
                let directory = Arc::new(PgDirectory::new(postgres.pool().clone()));
                let store: Arc<dyn SosStore> = Arc::new(postgres);
                let collaborators = Collaborators {
                    fasts: directory.clone(),
                    tribes: directory,
                    push: build_push(&config.push)?,
                    coach: build_coach(&config.llm)?,
                };
                (store, collaborators)
            }
        };

        let engine = Arc::new(RescueEngine::new(
            store.clone(),
            collaborators.clone(),
            clock.clone(),
            &config.rescue,
        ));
        let sweeper = Arc::new(EscalationSweeper::new(
            store,
            collaborators.push,
            clock,
            &config.rescue,
        ));

        Ok(Self {
            config,
            engine,
            sweeper,
        })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);

        let app = create_router(AppState::new(self.engine.clone()), &self.config.server);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("PARC daemon listening on {}", addr);
        tracing::info!(
            storage = self.engine.store().backend(),
            sweep_interval = ?self.config.rescue.sweep_interval(),
            "Rescue core ready"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper_handle = tokio::spawn(self.sweeper.clone().run(shutdown_rx.clone()));

        let signal_tx = shutdown_tx.clone();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signal_tx.send(true);
        });
        let mut server_task = tokio::spawn(async move { serve.await });

        let mut stop_rx = shutdown_rx;
        let served = tokio::select! {
            result = &mut server_task => result,
            stopped = stop_rx.wait_for(|stop| *stop) => {
                drop(stopped);
                match tokio::time::timeout(grace, &mut server_task).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(grace = ?grace, "In-flight requests did not drain, aborting");
                        server_task.abort();
                        Ok(Ok(()))
                    }
                }
            }
        };

        tracing::info!("PARC daemon shutting down");

        let _ = shutdown_tx.send(true);
        if let Err(e) = sweeper_handle.await {
            tracing::error!(error = %e, "Sweeper task failed");
        }

        let drained = self.engine.tasks().drain(grace).await;
        tracing::info!(drained, "Background tasks drained");

        served
            .map_err(|e| DaemonError::Server(e.to_string()))?
            .map_err(|e| DaemonError::Server(e.to_string()))
    }
}

fn build_push(config: &PushConfig) -> DaemonResult<Arc<dyn PushDelivery>> {
    let push: Arc<dyn PushDelivery> = match config {
        PushConfig::Log => Arc::new(LogPush),
        PushConfig::Webhook { endpoint, api_key } => {
            tracing::info!(endpoint = %endpoint, "Push delivery via webhook");
            Arc::new(WebhookPush::new(endpoint.clone(), api_key.clone())?)
        }
    };
    Ok(push)
}

fn build_coach(config: &LlmConfig) -> DaemonResult<Arc<dyn CravingCoach>> {
    let coach: Arc<dyn CravingCoach> = match config {
        LlmConfig::Disabled => Arc::new(DisabledCoach),
        LlmConfig::OpenAi {
            endpoint,
            api_key,
            model,
            max_tokens,
            temperature,
        } => {
            if api_key.trim().is_empty() {
                return Err(DaemonError::Config("llm.api_key must not be empty".to_string()));
            }
            tracing::info!(model = %model, "Craving coach via OpenAI-compatible API");
            Arc::new(OpenAiCoach::new(
                endpoint.clone(),
                api_key.clone(),
                model.clone(),
                *max_tokens,
                *temperature,
            )?)
        }
    };
    Ok(coach)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_with_memory_backend() {
        let server = Server::new(DaemonConfig::default()).await.unwrap();
        assert_eq!(server.engine.store().backend(), "memory");
    }

    #[tokio::test]
    async fn test_memory_backend_raises_for_seeded_fast() {
        use crate::config::{FastSeed, TribeSeed};
        use crate::rescue::Caller;
        use parc_types::UserId;

        let mut config = DaemonConfig::default();
        config.directory.tribes.push(TribeSeed {
            id: "t".to_string(),
            members: vec!["ana".to_string(), "ben".to_string()],
        });
        config.directory.fasts.push(FastSeed {
            user_id: "ana".to_string(),
            fast_id: "fast-1".to_string(),
            started_at: chrono::Utc::now() - chrono::Duration::hours(6),
        });

        let server = Server::new(config).await.unwrap();
        let ana = Caller::new(UserId::new("ana"), Some("Ana".to_string()));
        let outcome = server.engine.raise_flare(&ana, "").await.unwrap();
        assert_eq!(outcome.flare.whole_hours_fasted(), 6);
        assert!(outcome.ai_reply.is_none());

        let ben = Caller::new(UserId::new("ben"), None);
        let err = server.engine.raise_flare(&ben, "").await.unwrap_err();
        assert_eq!(err.kind(), "NO_ACTIVE_FAST");
    }

    #[test]
    fn test_coach_requires_api_key() {
        let config = LlmConfig::OpenAi {
            endpoint: None,
            api_key: "  ".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
            temperature: None,
        };
        assert!(matches!(build_coach(&config), Err(DaemonError::Config(_))));
    }
}
