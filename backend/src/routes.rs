use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use shared::{HealthResponse, PredictResponse};

use crate::pipeline::{Pipeline, PipelineError};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// `POST /predict`: one image in a multipart body, `{predClass, predConf}` out.
async fn predict(
    pipeline: web::Data<Pipeline>,
    payload: Multipart,
) -> Result<HttpResponse, PipelineError> {
    let result = pipeline.run(payload).await?;
    Ok(HttpResponse::Ok().json(PredictResponse::from(result)))
}

async fn health(pipeline: web::Data<Pipeline>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        model: pipeline.model_resource().to_string(),
        classes: pipeline.class_count(),
    })
}
