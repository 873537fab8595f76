use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// Browser-side proctoring signals reported during an attempt. Telemetry
/// only: events never feed the scoring state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorEventKind {
    FullscreenExit,
    TabSwitch,
    VisibilityHidden,
}

impl ProctorEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProctorEventKind::FullscreenExit => "fullscreen_exit",
            ProctorEventKind::TabSwitch => "tab_switch",
            ProctorEventKind::VisibilityHidden => "visibility_hidden",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProctorEvent {
    pub id: i64,
    pub attempt_id: Uuid,
    pub event_type: String,
    pub detail: Option<JsonValue>,
    pub ip_address: Option<sqlx::types::ipnetwork::IpNetwork>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
