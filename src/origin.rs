// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 源站客户端
//!
//! 连接目标主机的 80 端口，发送只包含 `Host` 头的最小 `GET` 请求，并读取响应头。
//! 客户端原始请求中的其它头（Cookie、认证等）永远不会被转发。

use std::{
    io::{BufReader, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, warn};

use crate::{
    exception::Exception,
    filter::Resolver,
    param::*,
    request::{read_head, RequestHead},
};

/// 建立到源站的连接
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str) -> Result<TcpStream, Exception>;
}

/// 通过 [`Resolver`] 解析主机并依次尝试每个地址
pub struct TcpConnector {
    resolver: Arc<dyn Resolver>,
    port: u16,
    timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            port: ORIGIN_PORT,
            timeout: None,
        }
    }

    /// 连接、读、写超时；不设置时一直阻塞
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 覆盖源站端口，只在测试中连接本地的模拟源站时使用
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Connector for TcpConnector {
    fn connect(&self, host: &str) -> Result<TcpStream, Exception> {
        let addrs = self.resolver.resolve(host)?;
        for ip in addrs {
            let addr = SocketAddr::from((ip, self.port));
            let result = match self.timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match result {
                Ok(stream) => {
                    if let Err(e) = stream
                        .set_read_timeout(self.timeout)
                        .and_then(|_| stream.set_write_timeout(self.timeout))
                    {
                        warn!("无法为源站连接{}设置超时：{}", addr, e);
                    }
                    return Ok(stream);
                }
                Err(e) => debug!("连接{}失败：{}", addr, e),
            }
        }
        Err(Exception::OriginConnectFailed)
    }
}

/// 源站的响应：已读取的响应头，以及可以继续读取响应体的连接
pub struct OriginReply {
    head: RequestHead,
    reader: BufReader<TcpStream>,
}

impl OriginReply {
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// 从状态行中提取状态码
    pub fn status_code(&self) -> Option<u16> {
        let text = std::str::from_utf8(self.head.as_bytes()).ok()?;
        let status_line = text.split(CRLF).next()?;
        let mut parts = status_line.split(' ');
        let version = parts.next()?;
        if !version.starts_with("HTTP/") {
            return None;
        }
        parts.next()?.parse().ok()
    }

    /// 响应体读取器。其中可能已经缓冲了部分响应体。
    pub fn body(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.reader
    }

    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

/// 构造发送给源站的请求
pub fn build_request(host: &str, path: &str) -> String {
    format!("GET {} HTTP/1.0{crlf}Host: {}{crlf}{crlf}", path, host, crlf = CRLF)
}

/// 向源站发起请求并读取响应头。
///
/// 连接失败返回 `OriginConnectFailed`；发送失败、读取出错或源站没有返回任何数据时返回 `OriginProtocolError`。
/// 响应头不完整时仍然返回 [`OriginReply`]，由调用方决定是否缓存。
pub fn fetch(
    connector: &dyn Connector,
    host: &str,
    path: &str,
    max_head_size: usize,
    id: u128,
) -> Result<OriginReply, Exception> {
    let mut stream = match connector.connect(host) {
        Ok(s) => s,
        Err(e) => {
            error!("[ID{}]无法连接源站{}：{}", id, host, e);
            return Err(Exception::OriginConnectFailed);
        }
    };
    debug!("[ID{}]已连接源站{}", id, host);

    if let Err(e) = stream.write_all(build_request(host, path).as_bytes()) {
        error!("[ID{}]向源站{}发送请求失败：{}", id, host, e);
        let _ = stream.shutdown(Shutdown::Both);
        return Err(Exception::OriginProtocolError);
    }

    let mut reader = BufReader::new(stream);
    let head = match read_head(&mut reader, max_head_size) {
        Ok(head) if head.is_empty() => {
            error!("[ID{}]源站{}没有返回任何数据", id, host);
            let _ = reader.get_ref().shutdown(Shutdown::Both);
            return Err(Exception::OriginProtocolError);
        }
        // 响应头超过上限时，剩余部分留在 reader 中随响应体一起中继
        Ok(head) if !head.is_complete() => {
            warn!("[ID{}]源站{}的响应头超过{}字节或提前结束", id, host, max_head_size);
            head
        }
        Ok(head) => head,
        Err(e) => {
            error!("[ID{}]读取源站{}的响应头失败：{}", id, host, e);
            let _ = reader.get_ref().shutdown(Shutdown::Both);
            return Err(Exception::OriginProtocolError);
        }
    };
    debug!("[ID{}]源站响应头接收完毕，长度：{}", id, head.len());

    Ok(OriginReply { head, reader })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    struct Loopback;

    impl Resolver for Loopback {
        fn resolve(&self, _host: &str) -> Result<Vec<Ipv4Addr>, Exception> {
            Ok(vec![Ipv4Addr::LOCALHOST])
        }
    }

    /// 启动一个只处理一次连接的模拟源站，返回端口和收到的请求
    fn serve_once(reply: &'static [u8]) -> (u16, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let head = read_head(&mut reader, MAX_HEAD_SIZE).unwrap();
            stream.write_all(reply).unwrap();
            String::from_utf8(head.as_bytes().to_vec()).unwrap()
        });
        (port, handle)
    }

    #[test]
    fn test_build_request() {
        assert_eq!(
            build_request("example.com", "/a/b"),
            "GET /a/b HTTP/1.0\r\nHost: example.com\r\n\r\n"
        );
    }

    #[test]
    fn test_fetch_reads_head_and_body() {
        let (port, handle) = serve_once(b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let connector = TcpConnector::new(Arc::new(Loopback)).with_port(port);

        let mut reply = fetch(&connector, "example.com", "/index.html", MAX_HEAD_SIZE, 0).unwrap();
        assert_eq!(reply.status_code(), Some(200));
        assert_eq!(
            reply.head().as_bytes(),
            b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\n"
        );
        let mut body = String::new();
        reply.body().read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
        reply.close();

        let request = handle.join().unwrap();
        assert_eq!(request, "GET /index.html HTTP/1.0\r\nHost: example.com\r\n\r\n");
    }

    #[test]
    fn test_fetch_non_200_status() {
        let (port, handle) = serve_once(b"HTTP/1.1 404 Not Found\r\n\r\n");
        let connector = TcpConnector::new(Arc::new(Loopback)).with_port(port);
        let reply = fetch(&connector, "example.com", "/missing", MAX_HEAD_SIZE, 0).unwrap();
        assert_eq!(reply.status_code(), Some(404));
        reply.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_oversized_head_keeps_remainder() {
        let (port, handle) = serve_once(b"HTTP/1.0 200 OK\r\nX-Long: 0123456789\r\n\r\nok");
        let connector = TcpConnector::new(Arc::new(Loopback)).with_port(port);

        let mut reply = fetch(&connector, "example.com", "/", 24, 0).unwrap();
        assert!(!reply.head().is_complete());
        assert_eq!(reply.status_code(), Some(200));
        let mut rest = String::new();
        reply.body().read_to_string(&mut rest).unwrap();
        let whole = [reply.head().as_bytes(), rest.as_bytes()].concat();
        assert_eq!(whole, b"HTTP/1.0 200 OK\r\nX-Long: 0123456789\r\n\r\nok");
        reply.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_empty_reply() {
        let (port, handle) = serve_once(b"");
        let connector = TcpConnector::new(Arc::new(Loopback)).with_port(port);
        let result = fetch(&connector, "example.com", "/", MAX_HEAD_SIZE, 0);
        assert!(matches!(result, Err(Exception::OriginProtocolError)));
        handle.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TcpConnector::new(Arc::new(Loopback)).with_port(port);
        let result = fetch(&connector, "example.com", "/", MAX_HEAD_SIZE, 0);
        assert!(matches!(result, Err(Exception::OriginConnectFailed)));
    }
}
