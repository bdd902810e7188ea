//! Process bootstrap: reads configuration, wires every singleton, spawns
//! the lifecycle monitors and the monitor server, then drains the RTP
//! transport's event stream until told to shut down.

use std::sync::Arc;

use bridge_core::{BridgeConfig, ConnectionManager, ManagerConfig};
use bridge_types::FunctionSpec;
use function_executor::{FunctionExecutor, SearchKnowledgeHandler, TransferToAgentHandler};
use mgmt_client::MgmtClient;
use observability::MonitorSink;
use rtp_transport::RtpTransport;
use side_channel::SideChannelClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn transfer_to_agent_spec() -> FunctionSpec {
    serde_json::from_value(serde_json::json!({
        "name": "transfer_to_agent",
        "description": "Transfer the caller to a human agent queue.",
        "parameters": {
            "type": "object",
            "properties": {
                "queueName": {"type": "string", "description": "Name of the destination queue."},
                "reason": {"type": "string", "description": "Why the caller is being transferred."}
            },
            "required": ["queueName"]
        },
        "handlerType": "inline",
    }))
    .expect("static spec literal")
}

fn search_knowledge_spec() -> FunctionSpec {
    serde_json::from_value(serde_json::json!({
        "name": "search_knowledge",
        "description": "Search the agent's knowledge base for an answer.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "topK": {"type": "integer", "minimum": 1, "maximum": 10}
            },
            "required": ["query"]
        },
        "handlerType": "inline",
        "timeoutMs": 15000,
        "retries": 0,
    }))
    .expect("static spec literal")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration, aborting startup");
            return;
        }
    };

    let (rtp, events) = match RtpTransport::bind(config.rtp_bind, rtp_transport::DEFAULT_INACTIVITY).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(error = %err, addr = %config.rtp_bind, "failed to bind rtp transport");
            return;
        }
    };

    let side_channel = match SideChannelClient::connect(&config.side_channel_url).await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to side channel");
            return;
        }
    };

    let mgmt = match MgmtClient::new(
        config.mgmt_api_url.clone(),
        &config.mgmt_api_key,
        config.agent_cache_ttl(),
    ) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build mgmt client");
            return;
        }
    };

    let functions = Arc::new(FunctionExecutor::new());
    functions.register_builtin(
        transfer_to_agent_spec(),
        Arc::new(TransferToAgentHandler::new(side_channel.clone())),
    );
    functions.register_builtin(
        search_knowledge_spec(),
        Arc::new(SearchKnowledgeHandler::new(mgmt.clone())),
    );

    let prices = Arc::new(config.provider_prices.clone());
    let sink = Arc::new(MonitorSink::new());

    let monitor_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.monitor_port));
    let monitor_sink = sink.clone();
    let monitor_secret = config.monitor_shared_secret.clone();
    tokio::spawn(async move {
        if let Err(err) = observability::serve(monitor_addr, monitor_sink, monitor_secret).await {
            tracing::error!(error = %err, "monitor server exited with error");
        }
    });

    let manager = ConnectionManager::new(
        rtp,
        side_channel,
        mgmt,
        functions,
        prices,
        sink,
        ManagerConfig {
            min_credit_balance: config.default_min_credit_usd,
            cost_margin: config.cost_margin(),
            max_idle: config.stale_idle(),
            metadata_debounce: config.session_start_debounce(),
        },
    );

    let monitors = bridge_core::monitors::spawn(
        manager.clone(),
        bridge_core::monitors::MonitorIntervals {
            hangup_poll: config.hangup_poll_interval(),
            agent_cache_sweep: config.agent_cache_sweep_interval(),
        },
    );

    tracing::info!(rtp_bind = %config.rtp_bind, monitor_port = config.monitor_port, "bridge starting");

    tokio::select! {
        _ = manager.clone().run(events) => {
            tracing::warn!("rtp transport event stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    monitors.cancel_all();
    manager.close_all();
}
