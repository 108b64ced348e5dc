use std::{fs, io::ErrorKind, os::unix::fs::FileTypeExt, path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};

use crate::{
    config::Config,
    deliberator::backend::build_backend,
    orchestrator::{AgentBlueprint, AgentNetwork},
    protocol::{ClientMessage, ReportBody, ServerMessage, parse_client_message},
    types::AgentId,
};

enum ExitReason {
    SocketMessage,
    Signal(&'static str),
}

/// Builds the agent network described by `config` and seeds its shared patterns.
pub async fn build_network(config: &Config) -> Result<AgentNetwork> {
    let backend = build_backend(&config.backend).map_err(|err| anyhow!("backend: {err}"))?;
    let blueprint = AgentBlueprint {
        settings: config.pipeline.agent_settings()?,
        validator: config.validator.clone(),
        deliberator: config.deliberator.clone(),
        backend,
    };

    let network = AgentNetwork::in_memory();
    for seed in &config.patterns {
        network
            .seed_pattern(&seed.name, &seed.predicate, &seed.category, seed.confidence)
            .await
            .map_err(|err| anyhow!("pattern '{}': {err}", seed.name))?;
    }
    for agent_id in &config.agents {
        network
            .spawn_agent(agent_id, &blueprint)
            .map_err(|err| anyhow!("agent '{agent_id}': {err}"))?;
    }

    Ok(network)
}

/// Routes decoded client messages to agents. Messages without an `agent`
/// field go to the default agent.
pub struct Dispatcher {
    network: Arc<AgentNetwork>,
    default_agent: AgentId,
}

impl Dispatcher {
    pub fn new(network: Arc<AgentNetwork>, default_agent: impl Into<AgentId>) -> Self {
        Self {
            network,
            default_agent: default_agent.into(),
        }
    }

    pub async fn dispatch(&self, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Process { agent, request } => {
                let agent_id = agent.unwrap_or_else(|| self.default_agent.clone());
                let Some(agent) = self.network.agent(&agent_id) else {
                    return ServerMessage::error(format!("unknown agent '{agent_id}'"));
                };
                let decision = agent.process(&request).await;
                ServerMessage::Decision {
                    agent: agent_id,
                    decision,
                }
            }
            ClientMessage::AddPattern {
                agent,
                name,
                predicate,
                category,
                confidence,
            } => {
                let agent_id = agent.unwrap_or_else(|| self.default_agent.clone());
                let Some(agent) = self.network.agent(&agent_id) else {
                    return ServerMessage::error(format!("unknown agent '{agent_id}'"));
                };
                match agent
                    .add_pattern(&name, &predicate, &category, confidence)
                    .await
                {
                    Ok(registration) => ServerMessage::PatternAdded {
                        agent: agent_id,
                        name: registration.pattern.name.clone(),
                        status: registration.status,
                    },
                    Err(err) => ServerMessage::error(err.to_string()),
                }
            }
            ClientMessage::RemovePattern { agent, name } => {
                let agent_id = agent.unwrap_or_else(|| self.default_agent.clone());
                let Some(agent) = self.network.agent(&agent_id) else {
                    return ServerMessage::error(format!("unknown agent '{agent_id}'"));
                };
                match agent.remove_pattern(&name).await {
                    Ok(removed) => ServerMessage::PatternRemoved {
                        agent: agent_id,
                        name,
                        removed,
                    },
                    Err(err) => ServerMessage::error(err.to_string()),
                }
            }
            ClientMessage::Report { agent: Some(agent_id) } => match self.network.agent(&agent_id) {
                Some(agent) => ServerMessage::Report {
                    report: ReportBody::Agent(Box::new(agent.report().await)),
                },
                None => ServerMessage::error(format!("unknown agent '{agent_id}'")),
            },
            ClientMessage::Report { agent: None } => match self.network.report().await {
                Ok(report) => ServerMessage::Report {
                    report: ReportBody::Network(report),
                },
                Err(err) => ServerMessage::error(err.to_string()),
            },
            ClientMessage::Exit => ServerMessage::error("exit is handled by the connection"),
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    let network = Arc::new(build_network(&config).await?);
    let default_agent = config
        .agents
        .first()
        .cloned()
        .context("config lists no agents")?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&network), default_agent));

    prepare_socket_path(&config.socket_path)?;
    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("unable to bind socket {}", config.socket_path.display()))?;

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<()>();

    tracing::info!(
        target: "server",
        socket = %config.socket_path.display(),
        agents = config.agents.len(),
        patterns = config.patterns.len(),
        "server_listening"
    );

    let exit_reason = loop {
        tokio::select! {
            _ = sigint.recv() => break ExitReason::Signal("SIGINT"),
            _ = sigterm.recv() => break ExitReason::Signal("SIGTERM"),
            Some(()) = exit_rx.recv() => break ExitReason::SocketMessage,
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let sender = exit_tx.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_client(stream, dispatcher, sender).await {
                                tracing::warn!(target: "server", error = %format!("{err:#}"), "client_handling_failed");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(target: "server", error = %err, "accept_failed");
                    }
                }
            }
        }
    };

    network.shutdown();
    cleanup_socket_path(&config.socket_path)?;

    match network.report().await {
        Ok(report) => tracing::info!(
            target: "server",
            total_requests = report.totals.total_requests,
            total_cost = %report.totals.total_cost,
            savings = %report.totals.savings,
            suppression_rate = report.totals.suppression_rate,
            "final_report"
        ),
        Err(err) => tracing::warn!(target: "server", error = %err, "final_report_failed"),
    }
    match exit_reason {
        ExitReason::SocketMessage => {
            tracing::info!(target: "server", reason = "exit_message", "server_stopped")
        }
        ExitReason::Signal(signal_name) => {
            tracing::info!(target: "server", reason = signal_name, "server_stopped")
        }
    }

    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    dispatcher: Arc<Dispatcher>,
    exit_tx: mpsc::UnboundedSender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_client_message(line) {
            Ok(ClientMessage::Exit) => {
                let _ = exit_tx.send(());
                break;
            }
            Ok(message) => dispatcher.dispatch(message).await,
            Err(err) => {
                tracing::warn!(target: "server", error = %err, "invalid_protocol_message");
                ServerMessage::error(format!("invalid message: {err}"))
            }
        };
        writer
            .write_all(response.to_line()?.as_bytes())
            .await
            .context("failed to write response")?;
    }

    Ok(())
}

fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }

    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() || metadata.is_file() => {
            fs::remove_file(path)
                .with_context(|| format!("unable to remove stale socket {}", path.display()))?;
        }
        Ok(_) => bail!(
            "socket path exists but is not a file or socket: {}",
            path.display()
        ),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("unable to inspect {}", path.display()));
        }
    }

    Ok(())
}

fn cleanup_socket_path(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("unable to remove {}", path.display())),
    }
}
