use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};

use dlmanager::common::logger::{self, PrettyLogger};
use dlmanager::common::utils;
use dlmanager::downloader::progress::DownloadProgress;
use dlmanager::{Config, DownloadError, DownloadManager, PartialOutput};
use dlmanager::{log_error, log_info, log_success, log_warning};

mod cli;

/// 读取配置文件并应用命令行覆盖
async fn load_config(args: &cli::Cli) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .await
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => Config::default(),
    };
    if args.remove_partial {
        config.partial_output = PartialOutput::Remove;
    }
    debug!("配置: {:?}", config);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logger::init_tracing(args.verbose);

    let config = load_config(&args).await?;
    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("创建输出目录失败: {}", args.output_dir.display()))?;

    let manager = DownloadManager::from_config(&config).context("创建HTTP客户端失败")?;
    let progress = DownloadProgress::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let mut taken = Vec::new();
    let mut pending = 0usize;
    let mut failed = 0usize;

    for url in &args.urls {
        let path = utils::output_path_for(&args.output_dir, url, &taken);
        let bar = progress.add(utils::file_name_from_url(url));
        let mut progress_bar = bar.clone();
        let finish_bar = bar.clone();
        let done_tx = done_tx.clone();
        let reported_url = url.clone();

        let started = manager
            .start(
                url,
                path.clone(),
                move |downloaded, expected| progress_bar.update(downloaded, expected),
                move |result| {
                    match &result {
                        Ok(()) => finish_bar.finish("完成"),
                        Err(e) => finish_bar.abandon(e.to_string()),
                    }
                    let _ = done_tx.send((reported_url, result));
                },
            )
            .await;

        match started {
            Ok(_) => {
                PrettyLogger::file_info("保存到", path.display().to_string());
                taken.push(path);
                pending += 1;
            }
            Err(DownloadError::DuplicateRequest(url)) => {
                bar.abandon("重复，已忽略");
                log_warning!("重复的下载请求，已忽略: {}", url);
            }
            Err(e) => {
                bar.abandon(e.to_string());
                log_error!("无法开始下载: {}", e);
                failed += 1;
            }
        }
    }
    drop(done_tx);
    if pending > 0 {
        log_info!("已开始 {} 个下载，按 Ctrl-C 取消", pending);
    }

    let mut succeeded = 0usize;
    let mut cancelled = 0usize;
    while pending > 0 {
        tokio::select! {
            finished = done_rx.recv() => {
                let Some((url, result)) = finished else {
                    break;
                };
                pending -= 1;
                match result {
                    Ok(()) => succeeded += 1,
                    Err(e) if e.is_cancelled() => cancelled += 1,
                    Err(e) => {
                        log_error!("下载失败: {}, 错误: {}", url, e);
                        failed += 1;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log_warning!("收到中断信号，正在取消所有下载...");
                let count = manager.cancel_all().await;
                info!("已发出 {} 个取消请求", count);
            }
        }
    }

    PrettyLogger::summary(succeeded, cancelled, failed);
    if failed > 0 {
        anyhow::bail!("{} 个下载失败", failed);
    }
    log_success!("全部下载结束");
    Ok(())
}
