use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    matcher::RegistrationStatus,
    orchestrator::{AgentReport, NetworkReport},
    types::{AgentId, Decision, Request},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Process {
        agent: Option<AgentId>,
        request: Request,
    },
    AddPattern {
        agent: Option<AgentId>,
        name: String,
        predicate: String,
        category: String,
        confidence: f64,
    },
    RemovePattern {
        agent: Option<AgentId>,
        name: String,
    },
    /// Without an agent the whole network is reported.
    Report {
        agent: Option<AgentId>,
    },
    Exit,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
enum WireMessage {
    Process {
        #[serde(default)]
        agent: Option<AgentId>,
        #[serde(default)]
        request_id: Option<String>,
        requester: String,
        content: String,
        #[serde(default)]
        context: BTreeMap<String, String>,
    },
    AddPattern {
        #[serde(default)]
        agent: Option<AgentId>,
        name: String,
        predicate: String,
        category: String,
        confidence: f64,
    },
    RemovePattern {
        #[serde(default)]
        agent: Option<AgentId>,
        name: String,
    },
    Report {
        #[serde(default)]
        agent: Option<AgentId>,
    },
    Exit {},
}

pub fn parse_client_message(line: &str) -> Result<ClientMessage, serde_json::Error> {
    let wire: WireMessage = serde_json::from_str(line)?;
    let message = match wire {
        WireMessage::Process {
            agent,
            request_id,
            requester,
            content,
            context,
        } => {
            let mut request = Request::new(requester, content);
            if let Some(request_id) = request_id {
                request.request_id = request_id;
            }
            request.context = context;
            ClientMessage::Process { agent, request }
        }
        WireMessage::AddPattern {
            agent,
            name,
            predicate,
            category,
            confidence,
        } => ClientMessage::AddPattern {
            agent,
            name,
            predicate,
            category,
            confidence,
        },
        WireMessage::RemovePattern { agent, name } => ClientMessage::RemovePattern { agent, name },
        WireMessage::Report { agent } => ClientMessage::Report { agent },
        WireMessage::Exit {} => ClientMessage::Exit,
    };
    Ok(message)
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportBody {
    Agent(Box<AgentReport>),
    Network(NetworkReport),
}

/// One response line per request line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Decision {
        agent: AgentId,
        decision: Decision,
    },
    PatternAdded {
        agent: AgentId,
        name: String,
        status: RegistrationStatus,
    },
    PatternRemoved {
        agent: AgentId,
        name: String,
        removed: bool,
    },
    Report {
        report: ReportBody,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
