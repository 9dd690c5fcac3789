// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 缓存代理服务器入口
//!
//! 启动流程：
//! - 初始化 log4rs 日志
//! - 读取 TOML 配置（路径为第一个命令行参数，默认 `config/development.toml`）
//! - 载入过滤文件，创建固定大小的工作线程池
//! - 在 Tokio 运行时中接受连接，每个连接作为一个任务提交给线程池
//!
//! 接受满 `max_requests` 个连接或收到 Ctrl-C 后停止监听，等待队列中的连接全部处理完毕再退出。

use caching_proxy::{Config, Exception, FilterSet, ProxyHandler, ThreadPool};

use log::{debug, error, info};
use tokio::{net::TcpListener, runtime::Builder};

use std::{
    env,
    net::{Ipv4Addr, SocketAddrV4},
    process,
    sync::Arc,
};

const DEFAULT_CONFIG: &str = "config/development.toml";
const LOG_CONFIG: &str = "config/log4rs.yaml";

fn main() {
    // 1. 日志
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        eprintln!("无法初始化日志系统（{}）：{}", LOG_CONFIG, e);
        process::exit(1);
    }

    if let Err(e) = run() {
        error!("服务端启动失败：{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Exception> {
    // 2. 配置
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::from_toml(&config_path)?;
    info!("配置文件{}已载入", config_path);
    info!("缓存根目录：{}", config.cache_root());

    // 3. 过滤集合在启动时载入一次，之后只读共享
    let filters = Arc::new(FilterSet::load(config.filter())?);
    info!(
        "过滤文件{}已载入：{}个主机名，{}个网段",
        config.filter(),
        filters.hosts().len(),
        filters.prefixes().len()
    );

    // 4. 工作线程池
    let pool = ThreadPool::new(config.pool_size())?;
    info!("工作线程池已创建，线程数：{}", pool.size());

    let handler = Arc::new(ProxyHandler::from_config(&config, filters));

    // 5. 只用于监听的运行时，请求处理全部在线程池中进行
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Exception::ConfigError(format!("无法创建Tokio运行时：{}", e)))?;
    let result = runtime.block_on(accept_loop(&config, &pool, &handler));

    // 6. 停止接受新任务，等待队列清空后回收所有线程
    info!("正在等待剩余的{}个连接处理完毕...", pool.queued());
    pool.shutdown();
    info!("服务端已关闭");
    result
}

async fn accept_loop(
    config: &Config,
    pool: &ThreadPool,
    handler: &Arc<ProxyHandler>,
) -> Result<(), Exception> {
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddrV4::new(address, port);
    let listener = TcpListener::bind(socket)
        .await
        .map_err(|e| Exception::ConfigError(format!("无法绑定{}：{}", socket, e)))?;
    info!("服务端将在{}上监听Socket连接", socket);

    let max_requests = config.max_requests();
    let mut id: u128 = 0;

    // 只创建一次，两次 accept 之间到达的信号也不会丢失
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while (id as u64) < max_requests {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    // 例如文件描述符耗尽，继续 accept 只会空转
                    error!("接受连接失败：{}，停止监听", e);
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("收到Ctrl-C，停止接受新连接");
                break;
            }
        };
        debug!("[ID{}]新的连接：{}", id, addr);

        // 工作线程使用阻塞I/O
        let stream = match stream
            .into_std()
            .and_then(|s| s.set_nonblocking(false).map(|_| s))
        {
            Ok(s) => s,
            Err(e) => {
                error!("[ID{}]无法转换为阻塞连接：{}", id, e);
                id += 1;
                continue;
            }
        };

        let handler = Arc::clone(handler);
        let conn_id = id;
        pool.execute(move || handler.handle_connection(stream, conn_id));
        id += 1;
    }

    if (id as u64) >= max_requests {
        info!("已接受{}个连接，达到上限", id);
    }
    Ok(())
}
