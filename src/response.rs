use crate::{param::*, util::HtmlBuilder};

use bytes::Bytes;
use log::error;

/// 代理自己生成的响应：错误页面，或缓存命中时的响应头。
///
/// 源站的响应头不经过这里，而是原样中继给客户端。
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: String,
    content_length: u64,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_0,
            status_code: 200,
            information: "OK".to_string(),
            content_type: "text/html".to_string(),
            content_length: 0,
            content: None,
        }
    }

    /// 构造错误响应，正文为固定模板的错误页面
    pub fn from_status_code(code: u16) -> Self {
        let message = match code {
            400 => "Bad Request",
            403 => "Access denied",
            404 => "File not found",
            501 => "Method is not supported",
            _ => "Some server side error",
        };
        let mut response = Self::new();
        response.set_code(code);
        let content = HtmlBuilder::from_status_code(response.status_code, message).build();
        response.content_length = content.len() as u64;
        response.content = Some(Bytes::from(content));
        response
    }

    /// 缓存命中时的响应头，正文由调用方从缓存文件中流式发送
    pub fn cache_hit(content_length: u64) -> Self {
        let mut response = Self::new();
        response.content_length = content_length;
        response
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        let (code, information) = match STATUS_CODES.get(&code) {
            Some(&info) => (code, info),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                (500, "Some server side error")
            }
        };
        self.status_code = code;
        self.information = information.to_string();
        self
    }

    /// 状态行与响应头（含结尾空行）
    pub fn head_bytes(&self) -> Vec<u8> {
        format!(
            "{} {} {}{crlf}Content-Type: {}{crlf}Content-Length: {}{crlf}Connection: closed{crlf}{crlf}",
            self.version,
            self.status_code,
            self.information,
            self.content_type,
            self.content_length,
            crlf = CRLF
        )
        .into_bytes()
    }

    /// 完整响应（响应头 + 正文）
    pub fn as_bytes(&self) -> Vec<u8> {
        let body: &[u8] = match &self.content {
            Some(c) => &c[..],
            None => &[],
        };
        [self.head_bytes().as_slice(), body].concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_new() {
        let response = Response::new();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
    }

    #[test]
    fn test_error_reply_format() {
        let bytes = Response::from_status_code(400).as_bytes();
        let response_str = String::from_utf8(bytes).unwrap();
        let body = "<HTML><HEAD><TITLE>400 Bad Request</TITLE></HEAD><BODY><H4>400 Bad Request</H4>Bad Request.</BODY></HTML>";

        assert!(response_str.starts_with("HTTP/1.0 400 Bad Request\r\n"));
        assert!(response_str.contains("Content-Type: text/html\r\n"));
        assert!(response_str.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(response_str.contains("Connection: closed\r\n\r\n"));
        assert!(response_str.ends_with(body));
    }

    #[test]
    fn test_error_messages() {
        let cases = [
            (Response::from_status_code(403), "403 Forbidden", "Access denied."),
            (Response::from_status_code(404), "404 Not Found", "File not found."),
            (Response::from_status_code(500), "500 Some server side error", "Some server side error."),
            (Response::from_status_code(501), "501 Not Implemented", "Method is not supported."),
        ];
        for (response, status, message) in cases {
            let text = String::from_utf8(response.as_bytes()).unwrap();
            assert!(text.starts_with(&format!("HTTP/1.0 {}\r\n", status)), "{}", text);
            assert!(text.contains(message));
        }
    }

    #[test]
    fn test_unknown_code_falls_back_to_500() {
        let response = Response::from_status_code(418);
        assert_eq!(response.status_code(), 500);
    }

    #[test]
    fn test_cache_hit_head() {
        let head = String::from_utf8(Response::cache_hit(1234).head_bytes()).unwrap();
        assert_eq!(
            head,
            "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nContent-Length: 1234\r\nConnection: closed\r\n\r\n"
        );
    }
}
