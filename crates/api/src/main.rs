use rdpstore_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rdpstore_observability::init();

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr;
    let app = rdpstore_api::app::build_app(&config);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
