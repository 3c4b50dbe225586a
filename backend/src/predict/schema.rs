use ndarray::ArrayViewD;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::PredictError;
use crate::preprocess::ImageTensor;

/// `{"instances": [...]}` with one nested-array instance per image.
#[derive(Serialize)]
pub struct PredictRequest<'a> {
    pub instances: Vec<NestedArray<'a>>,
}

impl<'a> PredictRequest<'a> {
    pub fn single(tensor: &'a ImageTensor) -> Self {
        Self {
            instances: vec![NestedArray(tensor.instance().into_dyn())],
        }
    }
}

/// Serializes an n-dimensional view as nested JSON arrays, outermost axis first.
pub struct NestedArray<'a>(pub ArrayViewD<'a, f32>);

impl Serialize for NestedArray<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.ndim() {
            0 => match self.0.first() {
                Some(value) => value.serialize(serializer),
                None => serializer.serialize_none(),
            },
            1 => serializer.collect_seq(self.0.iter()),
            _ => serializer.collect_seq(self.0.outer_iter().map(NestedArray)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictResponseBody {
    #[serde(default)]
    pub predictions: Option<Vec<Prediction>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of `predictions`: either the raw score vector or a map with a
/// single named output.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Prediction {
    Scores(Vec<f32>),
    Named(BTreeMap<String, Vec<f32>>),
}

impl Prediction {
    pub fn into_scores(self) -> Result<Vec<f32>, PredictError> {
        match self {
            Prediction::Scores(scores) => Ok(scores),
            Prediction::Named(outputs) => {
                if outputs.len() != 1 {
                    return Err(PredictError::Remote(format!(
                        "prediction has {} named outputs, expected one",
                        outputs.len()
                    )));
                }
                outputs
                    .into_values()
                    .next()
                    .ok_or_else(|| PredictError::Remote("prediction has no outputs".to_string()))
            }
        }
    }
}

impl PredictResponseBody {
    pub fn parse(raw: &[u8]) -> Result<Self, PredictError> {
        serde_json::from_slice(raw)
            .map_err(|e| PredictError::Remote(format!("malformed response body: {}", e)))
    }

    /// The score vector for the single submitted instance.
    pub fn single_scores(self) -> Result<Vec<f32>, PredictError> {
        if let Some(error) = self.error {
            return Err(PredictError::Remote(error));
        }
        let mut predictions = self
            .predictions
            .ok_or_else(|| PredictError::Remote("response has no predictions".to_string()))?;

        match predictions.len() {
            1 => predictions.remove(0).into_scores(),
            0 => Err(PredictError::Remote("predictions array is empty".to_string())),
            n => Err(PredictError::Remote(format!(
                "expected one prediction, got {}",
                n
            ))),
        }
    }
}
