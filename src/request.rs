// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体。它涵盖了：
//! 1. 报文头的读取：一直读到空行（`\r\n\r\n`）、读满上限或连接关闭为止。
//! 2. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 3. 目标主机与路径的提取，区分 origin-form（`/path`）与 absolute-form（`http://host/path`）。

use crate::{exception::Exception, param::*};
use bytes::Bytes;
use log::error;

use std::io::{self, BufRead, Read};

/// 从连接上读取的原始报文头。
#[derive(Debug, Clone)]
pub struct RequestHead {
    bytes: Bytes,
    /// 是否在读满上限或连接关闭前读到了空行
    complete: bool,
}

impl RequestHead {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// 从带缓冲的读取器中读取报文头。
///
/// 逐行读取直到缓冲区以 `\r\n\r\n` 结尾、达到 `max_bytes` 或对端关闭连接（读到 0 字节）。
/// 未读完的数据（例如响应体）保留在 `reader` 的缓冲区中，可以继续读取。
pub fn read_head<R: BufRead>(reader: &mut R, max_bytes: usize) -> io::Result<RequestHead> {
    let mut buffer = Vec::with_capacity(max_bytes.min(MAX_HEAD_SIZE));
    let mut complete = false;

    while buffer.len() < max_bytes {
        let remaining = (max_bytes - buffer.len()) as u64;
        let n = reader.by_ref().take(remaining).read_until(b'\n', &mut buffer)?;
        if n == 0 {
            break;
        }
        if buffer.ends_with(HEAD_TERMINATOR) {
            complete = true;
            break;
        }
    }

    Ok(RequestHead {
        bytes: Bytes::from(buffer),
        complete,
    })
}

/// 表示一个经过校验、可以被代理的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法，目前只可能是 GET
    method: HttpRequestMethod,
    /// 请求行中的原始目标
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 目标主机名（已去除端口）
    host: String,
    /// 转发给源站的路径（含查询字符串）
    path: String,
}

impl Request {
    /// 从原始报文头构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：报文头必须是合法的 UTF-8。
    /// 2. 解析请求行：提取方法、目标和协议版本，三者缺一不可。
    /// 3. 校验方法（仅 `GET`）与版本（`HTTP/1.0` 或 `HTTP/1.1`）。
    /// 4. 根据目标的形式提取主机与路径。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]HTTP请求不是合法的UTF-8", id);
                return Err(Exception::MalformedRequest);
            }
        };

        let request_line = request_string.split(CRLF).next().unwrap_or("");
        let mut parts = request_line.split(' ').filter(|s| !s.is_empty());
        let (method_str, target, version_str) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) => (m, t, v),
            _ => {
                error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
                return Err(Exception::MalformedRequest);
            }
        };

        let method = match method_str {
            "GET" => HttpRequestMethod::Get,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, method_str);
                return Err(Exception::UnsupportedMethod);
            }
        };

        let version = match version_str {
            "HTTP/1.0" => HttpVersion::V1_0,
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, version_str);
                return Err(Exception::UnsupportedProtocol);
            }
        };

        let (host, path) = if target.starts_with('/') {
            let host = match find_host_header(request_string) {
                Some(h) => h,
                None => {
                    error!("[ID{}]origin-form请求缺少合法的Host头", id);
                    return Err(Exception::MalformedRequest);
                }
            };
            (strip_port(host), target.to_string())
        } else {
            split_absolute_target(target)
        };

        if host.is_empty() {
            error!("[ID{}]无法从请求中提取主机名：{}", id, target);
            return Err(Exception::MalformedRequest);
        }

        Ok(Self {
            method,
            target: target.to_string(),
            version,
            host,
            path,
        })
    }
}

/// 查找 `Host: ` 头的值。只考虑以 CRLF 结尾的完整行。
fn find_host_header(request: &str) -> Option<&str> {
    let (terminated, _) = request.rsplit_once(CRLF)?;
    terminated
        .split(CRLF)
        .skip(1)
        .find_map(|line| line.strip_prefix("Host: "))
        .map(str::trim)
}

/// 拆分 absolute-form 目标：`http://host[:port]/path`。
///
/// 目标中没有 `/` 时，整个目标都被视为主机，路径取 `/`。
fn split_absolute_target(target: &str) -> (String, String) {
    let rest = target.strip_prefix("http://").unwrap_or(target);
    match rest.find('/') {
        Some(index) => (strip_port(&rest[..index]), rest[index..].to_string()),
        None => (strip_port(rest), "/".to_string()),
    }
}

fn strip_port(host: &str) -> String {
    match host.find(':') {
        Some(index) => host[..index].to_string(),
        None => host.to_string(),
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取请求行中的原始目标
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取目标主机
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 获取请求路径（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }
}
