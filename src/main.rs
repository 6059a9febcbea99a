use anyhow::{Error, Result};
use llm_breaker::{api::run_api_server, config::Config, utils::init_tracing};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_json);

    run_api_server(config).await
}
