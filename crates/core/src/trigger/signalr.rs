//! Minimal SignalR client over the server-sent-events transport.
//!
//! Only what the notification hub needs: negotiate (following one
//! redirect), open the event stream, send the JSON protocol handshake and
//! read `\x1e`-terminated records. Client-to-server invocations are not
//! supported.

use std::collections::VecDeque;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::host::{AccessToken, HostError};
use crate::pipeline::Module;

/// Terminates every record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub method the host invokes for job notifications.
pub const NOTIFICATION_TARGET: &str = "MessageReceived";

const HUB_PATH: &str = "MessageHub";
const SSE_TRANSPORT: &str = "ServerSentEvents";
const MAX_REDIRECTS: usize = 1;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Hub closed the connection: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),
}

/// One decoded hub record.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    HandshakeAck,
    HandshakeError(String),
    Invocation { target: String, arguments: Vec<Value> },
    Ping,
    Close { error: Option<String> },
    Other(u64),
}

/// Split an event payload into records and decode each one.
pub fn parse_records(data: &str) -> Vec<Result<HubFrame, HubError>> {
    data.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(parse_record)
        .collect()
}

/// Decode a single record (without its separator).
pub fn parse_record(record: &str) -> Result<HubFrame, HubError> {
    let value: Value = serde_json::from_str(record)
        .map_err(|e| HubError::Protocol(format!("malformed record: {}", e)))?;

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);

    let frame = match value.get("type").and_then(Value::as_u64) {
        None => match error {
            Some(error) => HubFrame::HandshakeError(error),
            None => HubFrame::HandshakeAck,
        },
        Some(1) => HubFrame::Invocation {
            target: value
                .get("target")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            arguments: value
                .get("arguments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        Some(6) => HubFrame::Ping,
        Some(7) => HubFrame::Close { error },
        Some(other) => HubFrame::Other(other),
    };
    Ok(frame)
}

/// A job notification pushed by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub module: Option<Module>,
    pub job_id: Option<String>,
    pub progress_message: Option<String>,
}

impl Notification {
    /// Decode the first invocation argument. Field names match
    /// case-insensitively; unknown modules are kept as `None`.
    pub fn from_value(value: &Value) -> Self {
        let Some(fields) = value.as_object() else {
            return Self::default();
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        };

        let module = field("module").and_then(|v| Module::deserialize(v).ok());
        let job_id = field("jobId").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        let progress_message = field("jobProgressStatusMessage")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            module,
            job_id,
            progress_message,
        }
    }

    /// Notifications without a progress message signal a job state change.
    pub fn requests_reconciliation(&self) -> bool {
        self.progress_message.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_token: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    available_transports: Vec<TransportInfo>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportInfo {
    #[serde(deserialize_with = "lenient_string")]
    transport: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of a successful negotiation.
#[derive(Debug, Clone)]
struct Negotiation {
    endpoint: Url,
    token: AccessToken,
    connection_token: String,
}

/// Opens sessions against the hub of one project.
#[derive(Clone)]
pub struct HubConnector {
    client: Client,
    hub_url: Url,
    token: AccessToken,
}

impl HubConnector {
    /// `hub_base` is the application base URL; the hub lives at
    /// `<hub_base>/MessageHub?projectId=<id>`.
    pub fn new(hub_base: &str, project_id: Uuid, token: AccessToken) -> Result<Self, HubError> {
        let hub_url = hub_url(hub_base, project_id)?;
        let client = Client::builder()
            .build()
            .map_err(HostError::from_reqwest)?;
        Ok(Self {
            client,
            hub_url,
            token,
        })
    }

    pub fn hub_url(&self) -> &Url {
        &self.hub_url
    }

    /// Negotiate and open a fresh session. Connection tokens are single-use,
    /// so every reconnect goes through here.
    pub async fn connect(&self) -> Result<HubSession, HubError> {
        let negotiation = self.negotiate().await?;

        let mut stream_url = negotiation.endpoint.clone();
        stream_url
            .query_pairs_mut()
            .append_pair("id", &negotiation.connection_token);

        let mut request = self
            .client
            .get(stream_url.clone())
            .header(ACCEPT, "text/event-stream");
        if !negotiation.token.as_str().is_empty() {
            request = request.bearer_auth(negotiation.token.as_str());
        }
        let events = EventSource::new(request)
            .map_err(|e| HubError::Stream(e.to_string()))?;

        debug!("Opened hub event stream at {}", negotiation.endpoint);
        Ok(HubSession {
            client: self.client.clone(),
            events,
            send_url: stream_url,
            token: negotiation.token,
            handshake_done: false,
            pending: VecDeque::new(),
        })
    }

    async fn negotiate(&self) -> Result<Negotiation, HubError> {
        let mut endpoint = self.hub_url.clone();
        let mut token = self.token.clone();

        for _ in 0..=MAX_REDIRECTS {
            let url = negotiate_url(&endpoint)?;
            let mut request = self.client.post(url);
            if !token.as_str().is_empty() {
                request = request.bearer_auth(token.as_str());
            }
            let response = request.send().await.map_err(HostError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(HostError::Status {
                    status: status.as_u16(),
                    endpoint: format!("{}/negotiate", HUB_PATH),
                }
                .into());
            }

            let body: NegotiateResponse = response
                .json()
                .await
                .map_err(|e| HubError::Negotiation(e.to_string()))?;

            if let Some(error) = body.error {
                return Err(HubError::Negotiation(error));
            }

            if let Some(redirect) = body.url {
                debug!("Hub negotiation redirected to {}", redirect);
                endpoint = Url::parse(&redirect)
                    .map_err(|e| HubError::InvalidUrl(format!("{}: {}", redirect, e)))?;
                if let Some(access_token) = body.access_token {
                    token = AccessToken::new(access_token);
                }
                continue;
            }

            if !body.available_transports.is_empty()
                && !body
                    .available_transports
                    .iter()
                    .any(|t| t.transport == SSE_TRANSPORT)
            {
                return Err(HubError::Negotiation(
                    "hub does not offer the server-sent-events transport".into(),
                ));
            }

            let connection_token = body
                .connection_token
                .or(body.connection_id)
                .ok_or_else(|| HubError::Negotiation("no connection token".into()))?;

            return Ok(Negotiation {
                endpoint,
                token,
                connection_token,
            });
        }

        Err(HubError::Negotiation("too many redirects".into()))
    }
}

/// An open hub session.
pub struct HubSession {
    client: Client,
    events: EventSource,
    send_url: Url,
    token: AccessToken,
    handshake_done: bool,
    pending: VecDeque<HubFrame>,
}

impl HubSession {
    /// Wait for the next `MessageReceived` notification.
    ///
    /// Returns an error when the stream ends, the hub sends a close record
    /// or the handshake is rejected.
    pub async fn next_notification(&mut self) -> Result<Notification, HubError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                match frame {
                    HubFrame::HandshakeAck => {
                        debug!("Hub handshake accepted");
                        self.handshake_done = true;
                    }
                    HubFrame::HandshakeError(error) => {
                        return Err(HubError::Protocol(format!("handshake rejected: {}", error)));
                    }
                    HubFrame::Invocation { target, arguments } => {
                        if target.eq_ignore_ascii_case(NOTIFICATION_TARGET) {
                            let argument = arguments.first().cloned().unwrap_or(Value::Null);
                            return Ok(Notification::from_value(&argument));
                        }
                        debug!("Ignoring hub invocation of {}", target);
                    }
                    HubFrame::Ping => trace!("Hub ping"),
                    HubFrame::Close { error } => return Err(HubError::Closed(error)),
                    HubFrame::Other(kind) => trace!("Ignoring hub record type {}", kind),
                }
                continue;
            }

            match self.events.next().await {
                None => return Err(HubError::Closed(None)),
                Some(Ok(Event::Open)) => self.send_handshake().await?,
                Some(Ok(Event::Message(message))) => {
                    for frame in parse_records(&message.data) {
                        match frame {
                            Ok(frame) => self.pending.push_back(frame),
                            Err(e) => warn!("Skipping hub record: {}", e),
                        }
                    }
                }
                Some(Err(e)) => {
                    self.events.close();
                    return Err(HubError::Stream(e.to_string()));
                }
            }
        }
    }

    pub fn handshake_done(&self) -> bool {
        self.handshake_done
    }

    pub fn close(&mut self) {
        self.events.close();
    }

    async fn send_handshake(&mut self) -> Result<(), HubError> {
        let body = format!(r#"{{"protocol":"json","version":1}}{}"#, RECORD_SEPARATOR);
        let mut request = self
            .client
            .post(self.send_url.clone())
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body);
        if !self.token.as_str().is_empty() {
            request = request.bearer_auth(self.token.as_str());
        }
        let response = request.send().await.map_err(HostError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                endpoint: HUB_PATH.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn hub_url(hub_base: &str, project_id: Uuid) -> Result<Url, HubError> {
    let raw = format!(
        "{}/{}?projectId={}",
        hub_base.trim_end_matches('/'),
        HUB_PATH,
        project_id
    );
    Url::parse(&raw).map_err(|e| HubError::InvalidUrl(format!("{}: {}", raw, e)))
}

fn negotiate_url(endpoint: &Url) -> Result<Url, HubError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| HubError::InvalidUrl(endpoint.to_string()))?
        .pop_if_empty()
        .push("negotiate");
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hub_and_negotiate_urls() {
        let id = Uuid::nil();
        let hub = hub_url("https://app.example.net/", id).unwrap();
        assert_eq!(
            hub.as_str(),
            "https://app.example.net/MessageHub?projectId=00000000-0000-0000-0000-000000000000"
        );
        let negotiate = negotiate_url(&hub).unwrap();
        assert_eq!(
            negotiate.as_str(),
            "https://app.example.net/MessageHub/negotiate?projectId=00000000-0000-0000-0000-000000000000&negotiateVersion=1"
        );
    }

    #[test]
    fn test_parse_records() {
        let data = "{}\u{1e}{\"type\":6}\u{1e}{\"type\":1,\"target\":\"MessageReceived\",\"arguments\":[{\"module\":\"Terrain\"}]}\u{1e}";
        let frames: Vec<HubFrame> = parse_records(data).into_iter().map(Result::unwrap).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], HubFrame::HandshakeAck);
        assert_eq!(frames[1], HubFrame::Ping);
        assert!(matches!(
            &frames[2],
            HubFrame::Invocation { target, arguments } if target == NOTIFICATION_TARGET && arguments.len() == 1
        ));
    }

    #[test]
    fn test_parse_handshake_error_and_close() {
        assert_eq!(
            parse_record(r#"{"error":"unsupported protocol"}"#).unwrap(),
            HubFrame::HandshakeError("unsupported protocol".into())
        );
        assert_eq!(
            parse_record(r#"{"type":7,"error":"server shutting down"}"#).unwrap(),
            HubFrame::Close {
                error: Some("server shutting down".into())
            }
        );
        assert_eq!(parse_record(r#"{"type":3}"#).unwrap(), HubFrame::Other(3));
        assert!(parse_record("not json").is_err());
    }

    #[test]
    fn test_notification_decoding() {
        let n = Notification::from_value(&json!({
            "Module": 1,
            "JobId": "job-7",
            "JobProgressStatusMessage": null
        }));
        assert_eq!(n.module, Some(Module::Windfields));
        assert_eq!(n.job_id.as_deref(), Some("job-7"));
        assert!(n.requests_reconciliation());

        let n = Notification::from_value(&json!({
            "module": "objects",
            "jobId": 42,
            "jobProgressStatusMessage": "meshing 40%"
        }));
        assert_eq!(n.module, Some(Module::Objects));
        assert_eq!(n.job_id.as_deref(), Some("42"));
        assert!(!n.requests_reconciliation());

        let n = Notification::from_value(&json!({ "jobProgressStatusMessage": "" }));
        assert!(n.requests_reconciliation());

        let n = Notification::from_value(&json!("not an object"));
        assert_eq!(n, Notification::default());
    }
}
