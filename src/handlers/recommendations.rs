use crate::{
    error::ApiError,
    models::{RecommendationRequest, RecommendationResponse},
    services::RecommendationService,
};
use actix_web::{
    web::{self, Json},
    HttpResponse,
};

pub fn recommendations_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/recommendations").route(web::post().to(get_recommendations)));
}

/// Recommend fragrances for a free-text description
pub async fn get_recommendations(
    request: Json<RecommendationRequest>,
    recommendation_service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::InvalidInput("Query cannot be empty".to_string()));
    }

    let recommendations = recommendation_service
        .recommend(&request.query, request.top_k, request.mode)
        .await?;

    Ok(HttpResponse::Ok().json(RecommendationResponse {
        query: request.query.clone(),
        mode: request.mode,
        recommendations,
    }))
}
