use actix_web::{web, Scope};

use crate::handlers::{
    health_check, index_page, recommendations_config, submit_description,
};

/// Configure all routes for the JSON API
pub fn api_routes() -> Scope {
    web::scope("/api")
        .service(health_check)
        .configure(recommendations_config)
}

/// The HTML form served at the site root
pub fn page_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index_page).service(submit_description);
}
