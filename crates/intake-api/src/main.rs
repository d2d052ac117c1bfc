use intake_core::IntakeConfig;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = IntakeConfig::from_env()?;

    // Initialize the application (telemetry, database, storage, pipeline, routes)
    let (state, router) = intake_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    intake_api::setup::server::start_server(&config, router, state.shutdown.clone()).await?;

    Ok(())
}
