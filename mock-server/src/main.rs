use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt::init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let app = match std::env::var("MOCK_QUOTA").ok().and_then(|q| q.parse::<u64>().ok()) {
        Some(quota) => {
            tracing::info!(quota, "request quota enabled");
            mock_server::app_with_quota(quota)
        }
        None => mock_server::app(),
    };

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");
    mock_server::serve(listener, app).await
}
