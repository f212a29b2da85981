use actix_web::{HttpResponse, Responder, web};

use crate::rag::pipeline::Response;
use crate::server::AppState;
use crate::sql::validate;

#[derive(serde::Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub k: Option<i64>,
    #[serde(default)]
    pub explain: bool,
}

#[derive(serde::Deserialize)]
pub struct ValidateRequest {
    pub sql: String,
}

#[derive(serde::Serialize)]
struct AskResponse {
    #[serde(flatten)]
    response: Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
}

pub async fn retrieve_handler(
    state: web::Data<AppState>,
    body: web::Json<QueryRequest>,
) -> impl Responder {
    let k = body.k.unwrap_or(state.default_k);
    match state.pipeline.retriever().retrieve(&body.query, k).await {
        Ok(results) => HttpResponse::Ok().json(results),
        Err(e) => {
            tracing::error!("retrieve failed: {e}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

pub async fn ask_handler(
    state: web::Data<AppState>,
    body: web::Json<QueryRequest>,
) -> impl Responder {
    let k = body.k.unwrap_or(state.default_k);
    let response = state.pipeline.respond(&body.query, k).await;
    let answer = if body.explain && !response.contexts.is_empty() {
        Some(state.pipeline.explain(&body.query, &response.contexts).await)
    } else {
        None
    };
    HttpResponse::Ok().json(AskResponse { response, answer })
}

pub async fn validate_handler(body: web::Json<ValidateRequest>) -> impl Responder {
    HttpResponse::Ok().json(validate(&body.sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::rag::generator::Generator;
    use crate::rag::generator::tests::ScriptedLlm;
    use crate::rag::pipeline::Pipeline;
    use crate::rag::retriever::Retriever;
    use crate::rag::retriever::tests::two_chunk_fixture;
    use actix_web::{App, test};
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let (corpus, embedder) = two_chunk_fixture();
        let pipeline = Pipeline::new(
            Retriever::new(corpus, embedder, Duration::from_secs(5)),
            Generator::new(
                Arc::new(ScriptedLlm::failing(|| LlmError::Http("offline".into()))),
                0.2,
                Duration::from_secs(5),
                3000,
            ),
        );
        AppState {
            pipeline: Arc::new(pipeline),
            default_k: 3,
        }
    }

    #[actix_web::test]
    async fn retrieve_uses_default_k() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .route("/retrieve", web::post().to(retrieve_handler)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/retrieve")
            .set_json(serde_json::json!({"query": "unknown text"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["rank"], 1);
    }

    #[actix_web::test]
    async fn ask_reports_fallback() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .route("/ask", web::post().to(ask_handler)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/ask")
            .set_json(serde_json::json!({"query": "unknown text", "k": 1}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["origin"], "fallback");
        assert_eq!(body["valid"], true);
        assert_eq!(body["contexts"].as_array().unwrap().len(), 1);
        assert!(body.get("answer").is_none());
    }

    #[actix_web::test]
    async fn validate_rejects_destructive_sql() {
        let app = test::init_service(App::new().route("/validate", web::post().to(validate_handler))).await;
        let req = test::TestRequest::post()
            .uri("/validate")
            .set_json(serde_json::json!({"sql": "drop table head"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["is_valid"], false);
        assert_eq!(body["formatted_sql"], "");
    }
}
