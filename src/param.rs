// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 代理协议参数与常量模块
//!
//! 该模块定义了代理服务器遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 代理实际会返回的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 线程池、报文头、缓存路径的上限。
//! - HTTP 方法与协议版本的强类型枚举。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 报文头结束标志：一个空行
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// 单个请求头（以及源站响应头）允许读取的默认最大字节数
pub const MAX_HEAD_SIZE: usize = 4 * 1024;

/// 线程池允许的最大工作线程数
pub const MAX_POOL_SIZE: usize = 200;

/// 源站端口。无论请求中写了什么端口，代理始终连接 80 端口
pub const ORIGIN_PORT: u16 = 80;

/// 根路径请求在缓存中对应的文件名
pub const INDEX_FILE: &str = "index.html";

/// 单个路径分量的最大字节数（常见文件系统的 NAME_MAX）
pub const MAX_PATH_COMPONENT: usize = 255;

/// 缓存文件完整路径的最大字节数（PATH_MAX）
pub const MAX_CACHE_PATH: usize = 4096;

/// 中继数据时使用的缓冲区大小
pub const RELAY_CHUNK_SIZE: usize = 8 * 1024;

lazy_static! {
    /// 代理会产生的 HTTP 状态码与其标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");

        // 5xx: 服务端错误 (Server Error)
        // 与错误页面正文一致，而不是 RFC 中的 "Internal Server Error"
        map.insert(500, "Some server side error");
        map.insert(501, "Not Implemented");
        map
    };
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 代理接受的 HTTP 请求方法。目前只转发 GET。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
        }
    }
}
