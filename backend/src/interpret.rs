use std::sync::Arc;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("score vector is empty")]
    EmptyScores,
    #[error("score vector has {scores} entries but the class list has {classes}")]
    LengthMismatch { scores: usize, classes: usize },
    #[error("score at index {0} is not a finite number")]
    NotFinite(usize),
}

/// Ordered class names; position `i` labels output `i` of the model.
#[derive(Debug, Clone)]
pub struct ClassList {
    names: Arc<[String]>,
}

impl ClassList {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: names.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub predicted_class: String,
    pub confidence: f32,
}

impl From<ClassificationResult> for shared::PredictResponse {
    fn from(result: ClassificationResult) -> Self {
        Self {
            pred_class: result.predicted_class,
            pred_conf: result.confidence,
        }
    }
}

/// Picks the highest score and its label. The first index wins on ties.
pub fn classify(scores: &[f32], classes: &ClassList) -> Result<ClassificationResult, SchemaError> {
    if scores.is_empty() {
        return Err(SchemaError::EmptyScores);
    }
    if scores.len() != classes.len() {
        return Err(SchemaError::LengthMismatch {
            scores: scores.len(),
            classes: classes.len(),
        });
    }
    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(SchemaError::NotFinite(index));
    }

    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }

    let predicted_class = classes
        .get(best)
        .ok_or(SchemaError::LengthMismatch {
            scores: scores.len(),
            classes: classes.len(),
        })?
        .to_string();

    Ok(ClassificationResult {
        predicted_class,
        confidence: scores[best],
    })
}
