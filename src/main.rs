use anyhow::Context;
use cas_bridge::config::CasConfig;
use cas_bridge::{build, telemetry, Collaborators};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let config: CasConfig = rocket::Config::figment()
        .extract_inner("cas")
        .context("cannot read the `cas` configuration")?;

    telemetry::setup_tracing(&config.log)?;
    config.validate()?;

    let collaborators = Collaborators::from_config(&config)?;
    let _rocket = build(config, collaborators).launch().await?;
    Ok(())
}
