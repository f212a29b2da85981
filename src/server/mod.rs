pub mod handlers;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use crate::cli::ServeArgs;
use crate::rag::pipeline::Pipeline;

/// Shared by every worker. The pipeline and its corpus are read-only.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub default_k: i64,
}

pub async fn run_server(args: ServeArgs, pipeline: Pipeline, default_k: i64) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting server on {bind_addr}");

    let state = AppState {
        pipeline: Arc::new(pipeline),
        default_k,
    };

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/retrieve", web::post().to(handlers::retrieve_handler))
            .route("/ask", web::post().to(handlers::ask_handler))
            .route("/validate", web::post().to(handlers::validate_handler))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
