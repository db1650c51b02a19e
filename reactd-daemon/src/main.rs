use anyhow::Result;
use clap::Parser;
use tracing::instrument::WithSubscriber;

use reactd_daemon::cli::DaemonCli;
use reactd_daemon::logging;
use reactd_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (파일 -> 환경변수 -> CLI 순으로 덮어씀)
    let bootstrap =
        logging::bootstrap_dispatch(cli.log_level.as_deref(), cli.log_format.as_deref());
    let config = cli.load_config().with_subscriber(bootstrap).await?;

    logging::init_tracing(&config.general)?;

    // 검증 경고는 여기서부터 설정된 형식으로 기록됨
    if cli.validate {
        let rules = orchestrator::check_config(&config)?;
        println!("{}: OK ({} rules)", cli.config.display(), rules);
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "reactd starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await?;

    tracing::info!("reactd shut down");
    Ok(())
}
