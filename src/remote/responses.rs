use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::daemon::focus::session::FocusUpdate;

/// Body of `GET /api/categorias/con-dominios`.
#[derive(Debug, Deserialize)]
pub struct CategoryMapResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "mapeo", default)]
    pub mapping: Option<HashMap<String, String>>,
    #[serde(rename = "total_dominios", default)]
    pub total_domains: Option<u64>,
}

/// Body of `GET /api/focus/status`, the server's authoritative view of the focus session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FocusStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "categorias_bloqueadas", default, deserialize_with = "null_as_default")]
    pub blocked_categories: Vec<String>,
    #[serde(rename = "modo_estricto", default, deserialize_with = "null_as_default")]
    pub strict_mode: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub session_id: Option<String>,
    #[serde(rename = "tiempo_restante_minutos", default)]
    pub remaining_minutes: Option<f64>,
}

impl From<FocusStatus> for FocusUpdate {
    fn from(status: FocusStatus) -> Self {
        if status.success && status.active {
            FocusUpdate::Activate {
                categories: status.blocked_categories,
                strict: status.strict_mode,
                session_id: status.session_id,
            }
        } else {
            FocusUpdate::Deactivate
        }
    }
}

/// One entry of `GET /api/categorias`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// Body of `POST /api/alerta_dominio`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlertResponse {
    #[serde(rename = "alerta", default)]
    pub alert: bool,
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Session ids come back as numbers from some server versions and as strings from others.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(v)) if !v.is_empty() => Some(v),
        Some(Id::Number(v)) => Some(v.to_string()),
        _ => None,
    })
}
