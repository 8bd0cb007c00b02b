use serde::{Deserialize, Serialize};

use crate::domain::pipeline::Provider;

/// Inbound optimization request. Every hotel field is optional free text;
/// the router decides whether what arrived is enough to work with. Unknown
/// providers are rejected here, at deserialization, never downstream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub hotel_name: String,
    #[serde(default)]
    pub hotel_location: String,
    #[serde(default)]
    pub current_adr: String,
    #[serde(default)]
    pub historical_occupancy: String,
    #[serde(default)]
    pub target_revpar: String,
    #[serde(default)]
    pub additional_context: String,
    #[serde(default)]
    pub provider: Provider,
}
