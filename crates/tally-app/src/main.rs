//! # tally-app
//!
//! Tally 에이전트 바이너리 진입점.
//! 의존성 조립, 세션 라이프사이클, 표준 입력 명령 처리.

mod commands;
mod device_id;
mod lifecycle;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::config::AgentConfig;
use tally_core::config_manager::ConfigManager;
use tally_core::models::device::DeviceIdentity;
use tally_core::ports::clock::SystemClock;
use tally_network::http_client::HttpCollector;
use tally_network::uploader::{DrainOutcome, Uploader};
use tally_session::heartbeat::HeartbeatScheduler;
use tally_session::orchestrator::{SessionOptions, SessionOrchestrator};
use tally_storage::sqlite::SqliteStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::lifecycle::AgentLifecycle;

/// Tally 텔레메트리 에이전트
///
/// 오프라인 우선 이벤트/세션 수집기
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 수집 서버 URL (설정 파일 값을 덮어씀)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 앱 키 (설정 파일 값을 덮어씀)
    #[arg(long, short = 'k')]
    app_key: Option<String>,

    /// 데이터 저장 경로
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 설정 파일 경로
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "tally", "agent")
}

/// 설정 파일 경로 결정 (CLI 인자 → 플랫폼 설정 경로 → 데이터 경로)
fn resolve_config_path(args: &Args) -> PathBuf {
    args.config
        .clone()
        .or_else(|| project_dirs().map(|p| p.config_dir().join("config.json")))
        .unwrap_or_else(|| {
            args.data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("config.json")
        })
}

/// 데이터베이스 경로 결정
///
/// 우선순위: `--data-dir` → 설정의 `storage.db_path` → 플랫폼 기본 경로
/// - macOS: `~/Library/Application Support/com.tally.agent/tally.db`
/// - Linux: `~/.local/share/agent/tally.db`
fn resolve_db_path(data_dir: Option<&Path>, configured: Option<&Path>) -> PathBuf {
    data_dir
        .map(|d| d.join("tally.db"))
        .or_else(|| configured.map(Path::to_path_buf))
        .or_else(|| project_dirs().map(|p| p.data_dir().join("tally.db")))
        .unwrap_or_else(|| PathBuf::from("./tally.db"))
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let path = resolve_config_path(args);
    let manager = ConfigManager::with_path(path).context("설정 로드 실패")?;
    info!("설정 파일: {}", manager.config_path().display());

    // CLI 값은 이번 실행에만 적용하고 파일에는 쓰지 않는다
    let mut config = manager.get();
    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
    }
    if let Some(app_key) = &args.app_key {
        config.server.app_key = app_key.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(log_level: &str) {
    let log_filter = format!(
        "tally={log_level},tally_app={log_level},tally_core={log_level},tally_storage={log_level},tally_network={log_level},tally_session={log_level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// 표준 입력 명령 루프. `quit`, EOF, 시그널 중 하나로 끝난다.
async fn run_command_loop(orchestrator: &SessionOrchestrator, lifecycle: &AgentLifecycle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let signal = lifecycle::wait_for_signal();
    tokio::pin!(signal);

    while !lifecycle.is_shutting_down() {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("표준 입력 종료");
                        break;
                    }
                    Err(e) => {
                        error!("표준 입력 읽기 실패: {e}");
                        break;
                    }
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => match command.apply(orchestrator) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!("명령 처리 실패: {e}"),
                    },
                    Ok(None) => {}
                    Err(e) => warn!("{e}"),
                }
            }
            _ = &mut signal => break,
        }
    }
    lifecycle.request_shutdown();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args)?;

    let db_path = resolve_db_path(args.data_dir.as_deref(), config.storage.db_path.as_deref());
    let storage = Arc::new(SqliteStorage::open(&db_path)?);

    let collector = Arc::new(HttpCollector::new(
        &config.server.base_url,
        config.request_timeout(),
    )?);
    let device = Arc::new(DeviceIdentity::new());
    let uploader = Uploader::new(storage.clone(), collector, device.clone())?;

    let metrics = metrics::detect_device_metrics();
    let options = SessionOptions::from_config(&config, &metrics)?;
    let orchestrator = Arc::new(SessionOrchestrator::new(
        storage.clone(),
        uploader,
        device,
        Arc::new(SystemClock),
        options,
    )?);

    let mut lifecycle = AgentLifecycle::new();
    lifecycle.track(
        "device-id",
        device_id::spawn_resolution(storage.clone(), orchestrator.clone()),
    );

    orchestrator.on_start()?;
    match orchestrator.replay_cached_push_token() {
        Ok(true) => info!("캐시된 푸시 토큰 재등록"),
        Ok(false) => {}
        Err(e) => warn!("푸시 토큰 재등록 실패: {e}"),
    }

    let heartbeat = HeartbeatScheduler::new(orchestrator.clone(), config.heartbeat_interval())
        .spawn(lifecycle.subscribe());
    lifecycle.track("heartbeat", heartbeat);

    info!("Tally 에이전트 시작: {}", config.server.base_url);

    run_command_loop(&orchestrator, &lifecycle).await;

    match lifecycle.shutdown(&orchestrator).await? {
        Some(DrainOutcome::Exhausted { sent }) => info!("종료 전 전송 완료: {sent}건"),
        Some(outcome) => warn!("미전송 요청이 남은 채 종료: {outcome:?}"),
        None => {}
    }

    info!("Tally 에이전트 종료");
    Ok(())
}
