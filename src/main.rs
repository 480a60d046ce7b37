use anyhow::Result;
use log::info;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::thread;

mod core;
mod player;

use crate::core::PlayerConfig;
use crate::player::renderer::{HeadlessSurface, SurfaceHost};
use crate::player::Player;

fn print_usage() {
    eprintln!("用法: hezi_player [--config <配置文件.json>] <媒体文件...>");
    eprintln!();
    eprintln!("交互命令:");
    eprintln!("  play <路径>   播放指定媒体");
    eprintln!("  resume        从暂停恢复");
    eprintln!("  pause         暂停");
    eprintln!("  stop          停止");
    eprintln!("  seek <±N>     章节跳转（越界时切换播放列表条目）");
    eprintln!("  status        查看状态");
    eprintln!("  refresh       重绘最后一帧");
    eprintln!("  quit          退出");
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("📺 盒子播放器启动");

    // 解析参数
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = PlayerConfig::default();
    if args.first().map(|a| a == "--config").unwrap_or(false) {
        if args.len() < 2 {
            print_usage();
            anyhow::bail!("--config 缺少参数");
        }
        config = PlayerConfig::load(Path::new(&args[1]))
            .map_err(|e| anyhow::anyhow!("加载配置失败: {}", e))?;
        args.drain(0..2);
    }

    // 渲染表面属主线程：无窗口环境用 Headless 表面
    let (delegate, host) = SurfaceHost::new(Box::new(HeadlessSurface::new(1280, 720)));
    let surface_thread = thread::Builder::new()
        .name("surface_host".to_string())
        .spawn(move || host.run())?;

    let player = Player::new(config, delegate);

    // 状态通知订阅
    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    player.subscribe(status_tx);
    let notifier = thread::Builder::new()
        .name("status_notify".to_string())
        .spawn(move || {
            while let Ok(change) = status_rx.recv() {
                info!("🔔 状态: {:?} → {:?}", change.old, change.new);
            }
        })?;

    // 命令行给出的文件作为播放列表
    if !args.is_empty() {
        if let Err(e) = player.play_playlist(&args, 0) {
            log::error!("播放失败: {}", e);
        }
    } else {
        print_usage();
    }

    // ========== 交互命令循环 ==========
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("play") => match parts.next() {
                Some(path) => {
                    if let Err(e) = player.play(Some(path)) {
                        log::error!("播放失败: {}", e);
                    }
                }
                None => eprintln!("play 需要一个路径"),
            },
            Some("resume") => {
                if let Err(e) = player.play(None) {
                    log::error!("恢复失败: {}", e);
                }
            }
            Some("pause") => {
                if let Err(e) = player.pause() {
                    log::error!("暂停失败: {}", e);
                }
            }
            Some("stop") => {
                if let Err(e) = player.stop() {
                    log::error!("停止失败: {}", e);
                }
            }
            Some("seek") => match parts.next().and_then(|n| n.parse::<i64>().ok()) {
                Some(incr) => {
                    if let Err(e) = player.seek_chapter(incr) {
                        log::error!("章节跳转失败: {}", e);
                    }
                }
                None => eprintln!("seek 需要一个整数（如 +1 / -2）"),
            },
            Some("status") => {
                println!(
                    "状态: {:?}  缓冲: {}%  位置: {:.1}s / {:.1}s",
                    player.status(),
                    player.buffer_percent(),
                    player.position_us() as f64 / 1e6,
                    player.duration_us() as f64 / 1e6,
                );
                if let Some(title) = player.title() {
                    println!("标题: {}", title);
                }
                if let Some(overlay) = player.overlay_text() {
                    println!("浮层: {}", overlay);
                }
            }
            Some("refresh") => player.refresh(),
            Some("quit") | Some("exit") => break,
            Some(other) => eprintln!("未知命令: {}", other),
            None => {}
        }
        print!("> ");
        io::stdout().flush()?;
    }

    info!("退出中...");
    drop(player);
    let _ = surface_thread.join();
    let _ = notifier.join();

    Ok(())
}
