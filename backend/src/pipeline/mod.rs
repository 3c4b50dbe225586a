pub mod error;

pub use error::PipelineError;

use actix_multipart::Multipart;
use actix_web::{web, ResponseError};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::ingest;
use crate::interpret::{self, ClassList, ClassificationResult};
use crate::predict::PredictionClient;
use crate::preprocess;

/// Where a request currently is. Stages only move forward; any failure ends
/// the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingesting,
    Preprocessing,
    Invoking,
    Interpreting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingesting => "ingesting",
            Stage::Preprocessing => "preprocessing",
            Stage::Invoking => "invoking",
            Stage::Interpreting => "interpreting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs upload → tensor → remote scores → label for one request at a time.
/// Holds only immutable state, so one instance serves all workers.
#[derive(Clone)]
pub struct Pipeline {
    client: PredictionClient,
    classes: ClassList,
    max_upload_bytes: usize,
}

impl Pipeline {
    pub fn new(client: PredictionClient, classes: ClassList, max_upload_bytes: usize) -> Self {
        Self {
            client,
            classes,
            max_upload_bytes,
        }
    }

    pub fn model_resource(&self) -> &str {
        self.client.resource()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Classifies the single file in a multipart upload.
    pub async fn run(&self, payload: Multipart) -> Result<ClassificationResult, PipelineError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut stage = Stage::Ingesting;

        let result = self.execute(request_id, payload, &mut stage).await;
        self.log_outcome(request_id, stage, started, &result);
        result
    }

    async fn execute(
        &self,
        request_id: Uuid,
        payload: Multipart,
        stage: &mut Stage,
    ) -> Result<ClassificationResult, PipelineError> {
        let upload = ingest::single_file(payload, self.max_upload_bytes).await?;
        log::debug!("[{}] received {} bytes", request_id, upload.len());

        advance(request_id, stage, Stage::Preprocessing);
        let tensor = web::block(move || preprocess::to_tensor(&upload))
            .await
            .map_err(|e| PipelineError::Internal(format!("preprocessing worker failed: {}", e)))??;
        log::debug!("[{}] tensor shape {:?}", request_id, tensor.shape());

        advance(request_id, stage, Stage::Invoking);
        let scores = self.client.predict(&tensor).await?;

        advance(request_id, stage, Stage::Interpreting);
        let result = interpret::classify(&scores, &self.classes)?;

        advance(request_id, stage, Stage::Done);
        Ok(result)
    }

    fn log_outcome(
        &self,
        request_id: Uuid,
        stage: Stage,
        started: Instant,
        result: &Result<ClassificationResult, PipelineError>,
    ) {
        let elapsed = started.elapsed().as_millis();
        match result {
            Ok(r) => log::info!(
                "[{}] predicted {} ({:.4}) in {}ms",
                request_id,
                r.predicted_class,
                r.confidence,
                elapsed
            ),
            Err(e) if e.status_code().is_client_error() => log::warn!(
                "[{}] {} while {}: {} ({}ms)",
                request_id,
                e.kind(),
                stage,
                e,
                elapsed
            ),
            Err(e) => log::error!(
                "[{}] {} while {}: {} ({}ms)",
                request_id,
                e.kind(),
                stage,
                e,
                elapsed
            ),
        }
    }
}

fn advance(request_id: Uuid, stage: &mut Stage, next: Stage) {
    log::debug!("[{}] {} -> {}", request_id, stage, next);
    *stage = next;
}
