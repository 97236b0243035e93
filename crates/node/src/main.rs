//! Participant node entry point.

use std::sync::Arc;

use node::{AppState, NodeConfig};
use participant::{EXIT_PROTOCOL_VIOLATION, InMemoryLedger, Participant, ParticipantServer};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Exit status for configuration and startup failures.
const EXIT_STARTUP_FAILURE: i32 = 78;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn startup_failure(what: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!(%error, "{what}");
    std::process::exit(EXIT_STARTUP_FAILURE);
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env()
        .unwrap_or_else(|e| startup_failure("invalid configuration", e));

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .unwrap_or_else(|e| startup_failure("failed to install Prometheus recorder", e));

    // 3. Build the participant and its callers
    let (reporter, mut supervisor) = participant::supervisor();
    let participant = Participant::from_config(&config.participant, reporter);

    let ledger = InMemoryLedger::new();
    for (account, balance) in &config.accounts {
        ledger.open_account(account, *balance);
    }
    let debit = participant.register_caller("debit", Arc::new(ledger.debit_caller()));
    let credit = participant.register_caller("credit", Arc::new(ledger.credit_caller()));
    if let Err(e) = debit.and(credit) {
        startup_failure("failed to register callers", e);
    }

    // 4. Start the RPC listener
    let server = ParticipantServer::bind(&config.participant.service_endpoint, participant)
        .await
        .unwrap_or_else(|e| startup_failure("failed to bind participant endpoint", e));
    server.set_unreliable(config.unreliable);
    tracing::info!(
        endpoint = %server.local_endpoint(),
        coordinator = %config.participant.coordinator_endpoint,
        unreliable = config.unreliable,
        "participant started"
    );

    // 5. Serve the admin API until shutdown or a protocol violation
    let state = Arc::new(AppState::new(server));
    let app = node::create_app(Arc::clone(&state), metrics_handle);

    let addr = config.admin_addr();
    tracing::info!(%addr, "starting admin server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| startup_failure("failed to bind admin address", e));
    let admin = async {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = admin => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin server error");
            }
        }
        Some(violation) = supervisor.next_violation() => {
            tracing::error!(%violation, "stopping after protocol violation");
            std::process::exit(EXIT_PROTOCOL_VIOLATION);
        }
    }

    state.server.kill();
    tracing::info!("participant shut down gracefully");
}
