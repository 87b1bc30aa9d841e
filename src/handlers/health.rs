use crate::{models::HealthResponse, services::RecommendationService};
use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health_check(
    recommendation_service: web::Data<RecommendationService>,
) -> HttpResponse {
    let store = recommendation_service.store();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        fragrances: store.fragrances().len(),
        reviews: store.reviews().len(),
    })
}
