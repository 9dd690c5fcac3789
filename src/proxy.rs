// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接处理器
//!
//! 每个被接受的连接只处理一个请求，各阶段严格按顺序执行，任一阶段失败即向客户端发送错误页面并关闭连接：
//! 1. 读取请求头（失败返回 400）
//! 2. 解析请求（格式或协议错误返回 400，方法错误返回 501）
//! 3. 检查主机能否解析（失败返回 404）
//! 4. 检查过滤列表（命中返回 403）
//! 5. 缓存命中则直接返回缓存文件；否则请求源站，将响应原样中继给客户端，同时写入缓存
//!
//! 无论从哪条路径退出，客户端连接的两个方向都会被关闭。

use std::{
    fs::File,
    io::{self, BufReader, Write},
    net::{Shutdown, TcpStream},
    sync::{Arc, MutexGuard},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{
    cache::CacheStore,
    config::Config,
    exception::Exception,
    filter::{DnsResolver, FilterSet, Resolver},
    origin::{self, Connector, TcpConnector},
    param::MAX_HEAD_SIZE,
    request::{read_head, Request},
    response::Response,
    util::{format_file_size, tee},
};

/// 所有工作线程共享的请求处理器。内部状态全部只读。
pub struct ProxyHandler {
    filters: Arc<FilterSet>,
    cache: Arc<CacheStore>,
    resolver: Arc<dyn Resolver>,
    connector: Arc<dyn Connector>,
    max_head_size: usize,
    io_timeout: Option<Duration>,
}

impl ProxyHandler {
    pub fn new(
        filters: Arc<FilterSet>,
        cache: Arc<CacheStore>,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            filters,
            cache,
            resolver,
            connector,
            max_head_size: MAX_HEAD_SIZE,
            io_timeout: None,
        }
    }

    /// 按配置组装处理器：系统 DNS 解析、80 端口的源站连接、磁盘缓存
    pub fn from_config(config: &Config, filters: Arc<FilterSet>) -> Self {
        let resolver: Arc<dyn Resolver> = Arc::new(DnsResolver);
        let connector =
            TcpConnector::new(Arc::clone(&resolver)).with_timeout(config.io_timeout());
        let mut cache = CacheStore::new(config.cache_root());
        if config.write_lock() {
            cache = cache.with_write_lock();
        }
        Self::new(filters, Arc::new(cache), resolver, Arc::new(connector))
            .with_max_head_size(config.max_head_size())
            .with_io_timeout(config.io_timeout())
    }

    pub fn with_max_head_size(mut self, max_head_size: usize) -> Self {
        self.max_head_size = max_head_size;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// 处理一个客户端连接，返回时连接已关闭
    pub fn handle_connection(&self, stream: TcpStream, id: u128) {
        let start_time = Instant::now();
        if let Err(e) = stream
            .set_read_timeout(self.io_timeout)
            .and_then(|_| stream.set_write_timeout(self.io_timeout))
        {
            warn!("[ID{}]无法为客户端连接设置超时：{}", id, e);
        }

        if let Err(e) = self.process(&stream, id) {
            let response = Response::from_status_code(e.status_code());
            warn!(
                "[ID{}]{}，返回{} {}",
                id,
                e,
                response.status_code(),
                response.information()
            );
            let mut writer = &stream;
            if let Err(e) = writer.write_all(&response.as_bytes()) {
                error!("[ID{}]发送错误响应失败：{}", id, e);
            }
            let _ = writer.flush();
        }

        let _ = stream.shutdown(Shutdown::Both);
        debug!(
            "[ID{}]连接已关闭，用时{}ms",
            id,
            start_time.elapsed().as_millis()
        );
    }

    /// 执行处理流程。返回 `Err` 表示需要向客户端发送错误页面。
    fn process(&self, stream: &TcpStream, id: u128) -> Result<(), Exception> {
        // 1. 读取请求头
        let mut reader = BufReader::new(stream);
        let head = match read_head(&mut reader, self.max_head_size) {
            Ok(head) => head,
            Err(e) => {
                error!("[ID{}]读取请求头失败：{}", id, e);
                return Err(Exception::MalformedRequest);
            }
        };
        if !head.is_complete() {
            error!("[ID{}]请求头不完整或超过{}字节", id, self.max_head_size);
            return Err(Exception::MalformedRequest);
        }
        debug!("[ID{}]HTTP请求接收完毕，长度：{}", id, head.len());

        // 2. 解析
        let request = Request::try_from(head.as_bytes(), id)?;
        let host = request.host();
        let path = request.path();

        // 3. 主机必须能够解析
        if let Err(e) = self.resolver.resolve(host) {
            error!("[ID{}]无法解析主机：{}", id, host);
            return Err(e);
        }

        // 4. 过滤。上一步已经解析成功，这里的解析失败视为未过滤
        match self.filters.is_filtered(host, self.resolver.as_ref()) {
            Ok(true) => {
                warn!("[ID{}]主机{}命中过滤列表", id, host);
                return Err(Exception::Filtered);
            }
            Ok(false) => {}
            Err(e) => warn!("[ID{}]过滤检查时{}：{}，按未过滤处理", id, e, host),
        }

        info!(
            "[ID{}] {}, {}, {}, {}",
            id,
            request.method(),
            host,
            path,
            request.version()
        );

        // 5. 缓存或源站。启用写锁时，同一个键上正在写入的连接完成前，其它连接在此等待
        let lock = self.cache.write_lock(host, path);
        let guard: Option<MutexGuard<'_, ()>> = lock
            .as_ref()
            .map(|l| l.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));

        if let Some((file, size)) = self.lookup_cache(host, path, id) {
            drop(guard);
            self.send_cached(stream, file, size, id);
            return Ok(());
        }

        let result = self.serve_from_origin(stream, host, path, id);
        drop(guard);
        result
    }

    fn lookup_cache(&self, host: &str, path: &str, id: u128) -> Option<(File, u64)> {
        match self.cache.read(host, path) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("[ID{}]读取缓存{}{}失败：{}，改为请求源站", id, host, path, e);
                None
            }
        }
    }

    fn send_cached(&self, stream: &TcpStream, mut file: File, size: u64, id: u128) {
        info!("[ID{}]缓存命中，文件大小：{}", id, format_file_size(size));

        let mut writer = stream;
        if let Err(e) = writer.write_all(&Response::cache_hit(size).head_bytes()) {
            error!("[ID{}]发送响应头失败：{}", id, e);
            return;
        }
        match send_file(&mut file, &mut writer) {
            Ok(sent) => info!("[ID{}]缓存响应发送完毕，共{}字节", id, sent),
            Err(e) => error!("[ID{}]发送缓存文件失败：{}", id, e),
        }
    }

    fn serve_from_origin(
        &self,
        stream: &TcpStream,
        host: &str,
        path: &str,
        id: u128,
    ) -> Result<(), Exception> {
        let mut reply = origin::fetch(self.connector.as_ref(), host, path, self.max_head_size, id)?;

        let mut writer = stream;
        if let Err(e) = writer.write_all(reply.head().as_bytes()) {
            // 客户端已经不可写，不再发送错误页面
            error!("[ID{}]向客户端中继响应头失败：{}", id, e);
            reply.close();
            return Ok(());
        }

        // 响应头被截断时其余部分混在响应体里，只做透传
        let cacheable = reply.head().is_complete() && reply.status_code() == Some(200);
        let mut cache_file = if cacheable {
            match self.cache.create_for_write(host, path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("[ID{}]无法创建缓存文件{}{}：{}", id, host, path, e);
                    None
                }
            }
        } else {
            debug!(
                "[ID{}]源站状态码为{:?}，响应头完整：{}，不缓存",
                id,
                reply.status_code(),
                reply.head().is_complete()
            );
            None
        };

        let head_len = reply.head().len() as u64;
        let outcome = tee(reply.body(), &mut writer, cache_file.as_mut());
        reply.close();

        if cache_file.is_some() && !(outcome.cache_ok && outcome.source_ok) {
            warn!("[ID{}]{}：{}{}，已丢弃不完整的缓存", id, Exception::CacheWriteFailed, host, path);
            drop(cache_file);
            self.cache.remove(host, path);
        }
        if !outcome.client_ok {
            warn!("[ID{}]客户端在中继过程中断开", id);
        }

        info!(
            "[ID{}]源站响应发送完毕，共{}字节",
            id,
            head_len + outcome.read
        );
        Ok(())
    }
}

fn send_file(file: &mut File, writer: &mut &TcpStream) -> io::Result<u64> {
    let sent = io::copy(file, writer)?;
    writer.flush()?;
    Ok(sent)
}
