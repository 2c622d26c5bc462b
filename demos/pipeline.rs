//! Full-chain demo: a toy post-serving handler behind the standard pipeline.
//!
//! ```sh
//! cargo run --example pipeline
//! curl -H 'Authorization: Bearer demo-secret' http://127.0.0.1:8080/posts/1
//! ```

use std::sync::Arc;

use gantry::config::PipelineConfig;
use gantry::http::{Method, Request, Response, StatusCode};
use gantry::server::Server;
use gantry::stages::StaticTokenValidator;

async fn serve_post(request: Request) -> Response {
    match (request.method(), request.path()) {
        (Method::Get, "/posts/1") => Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "title": "Hello",
                "body": "First post",
                "author": "admin",
                "published": true,
                "tags": ["intro"],
            }),
        ),
        _ => Response::error(StatusCode::NotFound, "No such post"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=debug".into()),
        )
        .init();

    let config = PipelineConfig {
        notify_url: std::env::var("NOTIFY_URL").ok(),
        monitoring_url: std::env::var("MONITORING_URL").ok(),
        ..PipelineConfig::default()
    };

    let pipeline = gantry::standard_pipeline(
        &config,
        Arc::new(StaticTokenValidator::new("demo-secret")),
        serve_post,
    );

    let server = Server::bind("127.0.0.1:8080").await?.tls_terminated(true);
    println!("Listening on http://127.0.0.1:8080");
    server.serve(pipeline).await?;
    Ok(())
}
