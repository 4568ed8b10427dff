use anyhow::Context;
use lending_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load lending settings")?;
    lending_telemetry::init(&settings.telemetry);

    lending_app::run(settings).await
}
