use serde::{Deserialize, Serialize};

/// Body of a successful `POST /predict`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictResponse {
    #[serde(rename = "predClass")]
    pub pred_class: String,
    #[serde(rename = "predConf")]
    pub pred_conf: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub classes: usize,
}
