use anyhow::Result;
use clap::Parser;

use flowgate_core::config::FlowgateConfig;
use flowgate_core::error::{ConfigError, FlowgateError};
use flowgate_core::pipeline::Pipeline;
use flowgate_flow_pipeline::{FlowPipelineBuilder, PipelineConfig};

use flowgate_daemon::cli::DaemonCli;
use flowgate_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로딩: 파일 없음은 --validate가 아닌 한 기본값으로 동작
    let mut config = match FlowgateConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(FlowgateError::Config(ConfigError::FileNotFound { path })) if !cli.validate => {
            eprintln!("config file {path} not found, using defaults");
            FlowgateConfig::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to load config {}: {}",
                cli.config.display(),
                e
            ));
        }
    };

    // CLI 인자가 설정 파일/환경변수보다 우선
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration {} is valid", cli.config.display());
        return Ok(());
    }

    // 로깅 초기화
    logging::init_tracing(&config.general)?;
    tracing::info!("flowgate-daemon starting");

    // 메트릭 레코더 설치 (파이프라인보다 먼저)
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
    }

    if !config.pipeline.enabled {
        return Err(anyhow::anyhow!(
            "pipeline is disabled in config, nothing to run"
        ));
    }

    // 파이프라인 빌드 (기본 협력자: 설정의 디코더, JSON 포매터, stdout 트랜스포트)
    let mut pipeline = FlowPipelineBuilder::new()
        .config(PipelineConfig::from_core(&config.pipeline))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build flow pipeline: {}", e))?;

    tracing::info!(
        listen_addr = %config.pipeline.listen_addr,
        workers = config.pipeline.workers,
        decoder = %config.pipeline.decoder,
        "flow pipeline initialized"
    );

    // 파이프라인 시작
    pipeline
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start flow pipeline: {}", e))?;

    // 종료 시그널 대기
    tracing::info!("flowgate-daemon running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // 우아한 종료: 워커들이 진행 중인 처리를 마칠 때까지 대기
    if let Err(e) = pipeline.stop().await {
        tracing::error!(error = %e, "failed to stop flow pipeline");
    }

    tracing::info!("flowgate-daemon shut down");
    Ok(())
}
