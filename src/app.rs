use crate::{
    config::Config,
    error::Result,
    handlers::page_templates,
    ml::OpenAiEmbedder,
    routes::{api_routes, page_routes},
    services::{EmbeddingCache, EmbeddingService, RecommendationService, ReviewStore},
};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{info, warn};
use std::{net::TcpListener, sync::Arc};

/// Open the embedding cache and connect it to the embeddings endpoint.
pub fn embedding_service(config: &Config) -> Result<EmbeddingService> {
    let cache = EmbeddingCache::open(
        &config.embedding_query_cache_path,
        &config.embedding_train_cache_path,
    )?;
    let embedder = OpenAiEmbedder::new(config)?;

    Ok(EmbeddingService::new(
        Arc::new(embedder),
        Arc::new(cache),
        &config.embedding_engine,
    ))
}

/// Everything a recommendation needs: embeddings plus the review dataset.
pub fn recommendation_service(config: &Config) -> Result<RecommendationService> {
    let embeddings = embedding_service(config)?;

    let path = config.reviews_and_embeddings_path();
    let store = if path.exists() {
        ReviewStore::load(&path)?
    } else {
        warn!(
            "{} not found; run the embed command to build it. Serving an empty dataset",
            path.display()
        );
        ReviewStore::default()
    };

    Ok(RecommendationService::new(embeddings, Arc::new(store)))
}

pub struct Application {
    port: u16,
    host: String,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            config: config.clone(),
        }
    }

    /// Build and run the server
    pub async fn run(&self) -> Result<()> {
        let bind_address = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&bind_address)?;
        info!("Starting server at http://{}", bind_address);

        self.run_with_listener(listener).await
    }

    /// Run the server with a specific TCP listener
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let recommendation_service = web::Data::new(recommendation_service(&self.config)?);
        let config = web::Data::new(self.config.clone());
        let templates = web::Data::new(page_templates()?);

        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();

            App::new()
                .wrap(cors)
                .wrap(Logger::default())
                .app_data(recommendation_service.clone())
                .app_data(config.clone())
                .app_data(templates.clone())
                .service(api_routes())
                .configure(page_routes)
        })
        .listen(listener)?
        .run()
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ml::embedder::testing::StubEmbedder, models::RecommendationResponse,
        services::review_store::review,
    };
    use actix_web::{http::StatusCode, test};
    use uuid::Uuid;

    fn test_service(dir: &std::path::Path) -> RecommendationService {
        let cache = EmbeddingCache::open(dir.join("q.json"), dir.join("t.json")).unwrap();
        let embedder = StubEmbedder::new(2).with("fresh lemon", vec![1.0, 0.0]);
        let store = ReviewStore::from_reviews(vec![
            review("Acqua di Parma", "Colonia", "bright citrus", vec![0.9, 0.1]),
            review("Serge Lutens", "Ambre Sultan", "resinous <amber>", vec![0.0, 1.0]),
        ])
        .unwrap();
        RecommendationService::new(
            EmbeddingService::new(Arc::new(embedder), Arc::new(cache), "babbage"),
            Arc::new(store),
        )
    }

    macro_rules! test_app {
        () => {{
            let dir = std::env::temp_dir().join(format!("app-{}", Uuid::new_v4()));
            let config = Config::for_tests(&dir);
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_service(&dir)))
                    .app_data(web::Data::new(config))
                    .app_data(web::Data::new(page_templates().unwrap()))
                    .service(api_routes())
                    .configure(page_routes),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["fragrances"], 2);
        assert_eq!(body["reviews"], 2);
    }

    #[actix_web::test]
    async fn test_recommendations_endpoint() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/recommendations")
            .set_json(serde_json::json!({"query": "fresh   lemon", "top_k": 1}))
            .to_request();
        let body: RecommendationResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.recommendations.len(), 1);
        assert_eq!(body.recommendations[0].fragrance, "Acqua di Parma: Colonia");
        assert_eq!(body.recommendations[0].relevant_review, "bright citrus");
    }

    #[actix_web::test]
    async fn test_empty_query_is_rejected() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/recommendations")
            .set_json(serde_json::json!({"query": "  "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_form_redirects_to_results_page() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/")
            .set_form([("frag", "fresh lemon")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get("location").unwrap(),
            "/?query=fresh%20lemon"
        );

        let req = test::TestRequest::get()
            .uri("/?query=fresh%20lemon")
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("<td>Acqua di Parma: Colonia</td>"));
        assert!(page.contains("resinous &lt;amber&gt;"));
    }
}
