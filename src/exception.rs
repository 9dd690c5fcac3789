// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了代理服务器在启动阶段与单个连接的处理流程中可能出现的各类异常。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了请求解析错误、域名解析与过滤错误、源站错误、缓存错误以及线程池错误。
//! - **语义映射**：每个面向客户端的变体都能通过 [`Exception::status_code`] 转化为对应的 HTTP 状态码。
//! - **启动错误**：线程池、过滤文件和配置相关的变体只会出现在启动阶段，对进程而言是致命的。

use std::fmt;

/// 代理服务器运行过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求行缺少方法、目标或版本，或缺少合法的 `Host` 头。对应 `400 Bad Request`。
    MalformedRequest,
    /// 请求方法不是 `GET`。对应 `501 Not Implemented`。
    UnsupportedMethod,
    /// 协议版本既不是 `HTTP/1.0` 也不是 `HTTP/1.1`。对应 `400 Bad Request`。
    UnsupportedProtocol,
    /// 目标主机无法解析为任何 IPv4 地址。对应 `404 Not Found`。
    UnresolvableHost,
    /// 目标主机命中了过滤列表。对应 `403 Forbidden`。
    Filtered,
    /// 无法与源站建立 TCP 连接。对应 `404 Not Found`。
    OriginConnectFailed,
    /// 源站没有返回任何数据，或读取响应头出错。对应 `500`。
    OriginProtocolError,
    /// 写入缓存文件失败。该错误只会让本次响应不被缓存，不会传给客户端。
    CacheWriteFailed,
    /// 由主机名和路径构造出的缓存路径非法（越界、过长等），该请求不会被缓存。
    InvalidCachePath,
    /// 线程池中的某个工作线程无法创建。
    PoolCreationFailed,
    /// 线程池大小超出了 `[0, MAX_POOL_SIZE]`。
    InvalidPoolSize,
    /// 过滤文件中的某一行无法解析为 `ip/prefix`。
    InvalidFilterEntry { line: usize, entry: String },
    /// 配置文件无法读取或解析。
    ConfigError(String),
}

use Exception::*;

impl Exception {
    /// 将连接级异常映射为返回给客户端的 HTTP 状态码。
    ///
    /// 启动阶段的异常不会发送给客户端，统一映射为 500。
    pub fn status_code(&self) -> u16 {
        match self {
            MalformedRequest | UnsupportedProtocol => 400,
            UnsupportedMethod => 501,
            UnresolvableHost | OriginConnectFailed => 404,
            Filtered => 403,
            _ => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed request"),
            UnsupportedMethod => write!(f, "Unsupported request method"),
            UnsupportedProtocol => write!(f, "Unsupported HTTP version"),
            UnresolvableHost => write!(f, "Host can't be resolved"),
            Filtered => write!(f, "Host is filtered"),
            OriginConnectFailed => write!(f, "Couldn't connect to origin server"),
            OriginProtocolError => write!(f, "Origin server sent an invalid reply"),
            CacheWriteFailed => write!(f, "Couldn't write cache file"),
            InvalidCachePath => write!(f, "Invalid cache path"),
            PoolCreationFailed => write!(f, "Couldn't create worker thread"),
            InvalidPoolSize => write!(f, "Invalid pool size"),
            InvalidFilterEntry { line, entry } => {
                write!(f, "Invalid filter entry at line {}: {}", line, entry)
            }
            ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Exception {}
