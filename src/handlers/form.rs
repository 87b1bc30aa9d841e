//! The HTML form: describe a fragrance, get a table of recommendations back.

use crate::{
    config::Config,
    error::{ApiError, Result},
    models::{Recommendation, RecommendationMode},
    services::RecommendationService,
};
use actix_web::{get, http::header, post, web, HttpResponse};
use handlebars::Handlebars;
use log::error;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

const INDEX_TEMPLATE: &str = "index";

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FragranceForm {
    pub frag: String,
}

#[derive(Serialize)]
struct IndexPage<'a> {
    query: &'a str,
    searched: bool,
    recommendations: &'a [Recommendation],
    error: Option<&'a str>,
}

/// Register the page templates. Handlebars escapes every interpolated value.
pub fn page_templates() -> Result<Handlebars<'static>> {
    let mut templates = Handlebars::new();
    templates
        .register_template_string(INDEX_TEMPLATE, include_str!("templates/index.hbs"))
        .map_err(|e| ApiError::InternalError(format!("Invalid page template: {}", e)))?;
    Ok(templates)
}

#[get("/")]
pub async fn index_page(
    params: web::Query<IndexQuery>,
    recommendation_service: web::Data<RecommendationService>,
    templates: web::Data<Handlebars<'static>>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let result = match query {
        Some(query) => Some(
            recommendation_service
                .recommend(
                    query,
                    config.default_recommendations,
                    RecommendationMode::Fragrance,
                )
                .await
                .map_err(|e| {
                    error!("Failed to recommend for '{}': {}", query, e);
                    e.to_string()
                }),
        ),
        None => None,
    };

    let page = render_page(&templates, query, result.as_ref())?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page))
}

#[post("/")]
pub async fn submit_description(form: web::Form<FragranceForm>) -> HttpResponse {
    let location = format!(
        "/?query={}",
        utf8_percent_encode(form.frag.trim(), NON_ALPHANUMERIC)
    );
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn render_page(
    templates: &Handlebars<'_>,
    query: Option<&str>,
    result: Option<&std::result::Result<Vec<Recommendation>, String>>,
) -> Result<String> {
    let page = IndexPage {
        query: query.unwrap_or_default(),
        searched: result.is_some(),
        recommendations: match result {
            Some(Ok(recommendations)) => recommendations.as_slice(),
            _ => &[],
        },
        error: match result {
            Some(Err(message)) => Some(message.as_str()),
            _ => None,
        },
    };

    templates
        .render(INDEX_TEMPLATE, &page)
        .map_err(|e| ApiError::InternalError(format!("Failed to render page: {}", e)))
}
