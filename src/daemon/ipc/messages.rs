use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{daemon::focus::session::FocusUpdate, remote::responses::string_or_number};

/// Anything that can arrive on the message channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Request {
    Focus(FocusCommand),
    Internal(InternalRequest),
    Legacy(LegacyRequest),
}

/// Focus commands sent by the dashboard when the user starts or ends a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FocusCommand {
    Start {
        #[serde(default)]
        data: StartData,
    },
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartData {
    #[serde(default)]
    pub categorias: Vec<String>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub session_id: Option<String>,
}

impl From<FocusCommand> for FocusUpdate {
    fn from(command: FocusCommand) -> Self {
        match command {
            FocusCommand::Start { data } => FocusUpdate::Activate {
                categories: data.categorias,
                strict: data.strict,
                session_id: data.session_id,
            },
            FocusCommand::End { .. } => FocusUpdate::Deactivate,
        }
    }
}

/// Requests from the browser bridge, the blocked page and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InternalRequest {
    TabActivated {
        url: Option<String>,
    },
    /// `url` is the active tab of the newly focused window, absent when focus left the browser.
    WindowFocusChanged {
        url: Option<String>,
    },
    TabUpdated {
        url: Option<String>,
        status: Option<String>,
    },
    Suspend,
    #[serde(alias = "omitir_dominio")]
    SkipDomain {
        domain: String,
    },
    ResetStorage,
    #[serde(alias = "verificar_alerta")]
    CheckAlert {
        #[serde(alias = "dominio")]
        domain: String,
    },
    SetUser {
        user_id: Option<u64>,
    },
    Status,
}

/// The bare string `"resetStorage"` older bridges send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyRequest {
    #[serde(rename = "resetStorage")]
    ResetStorage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// What `status` answers with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tracking: Option<String>,
    pub pending_seconds: u64,
    pub focus_active: bool,
    pub strict_mode: bool,
    pub session_id: Option<String>,
    /// Time left in the session as last reported by the server.
    pub remaining_minutes: Option<f64>,
    pub blocked_categories: Vec<String>,
    pub skipped_domains: Vec<String>,
    pub rule_count: usize,
    pub categorised_domains: usize,
    pub user_id: Option<u64>,
    pub totals: Vec<DomainTotal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTotal {
    pub domain: String,
    pub seconds: u64,
}
