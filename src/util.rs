use std::io::{self, Read, Write};

use crate::param::{RELAY_CHUNK_SIZE, STATUS_CODES};

/// 错误页面构造器，生成固定格式的简短 HTML。
pub struct HtmlBuilder {
    code: u16,
    reason: String,
    message: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, message: &str) -> Self {
        let reason = match STATUS_CODES.get(&code) {
            Some(r) => *r,
            None => {
                panic!("非法的状态码：{}", code);
            }
        };
        Self {
            code,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn build(&self) -> String {
        format!(
            "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD><BODY><H4>{code} {reason}</H4>{message}.</BODY></HTML>",
            code = self.code,
            reason = self.reason,
            message = self.message
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

/// 一次中继的结果
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TeeOutcome {
    /// 从源读取的字节数
    pub read: u64,
    /// 是否全部成功写入客户端
    pub client_ok: bool,
    /// 是否全部成功写入缓存
    pub cache_ok: bool,
    /// 源是否被完整读到 EOF
    pub source_ok: bool,
}

/// 将 `source` 的数据同时写入 `client` 和 `cache`。
///
/// 任一目的地写入失败后停止向其写入，另一个继续；两个都失败时提前结束。
pub fn tee<R, C, F>(source: &mut R, client: &mut C, cache: Option<&mut F>) -> TeeOutcome
where
    R: Read + ?Sized,
    C: Write + ?Sized,
    F: Write + ?Sized,
{
    let mut buffer = vec![0u8; RELAY_CHUNK_SIZE];
    let mut outcome = TeeOutcome {
        read: 0,
        client_ok: true,
        cache_ok: cache.is_some(),
        source_ok: false,
    };
    let mut cache = cache;

    loop {
        let n = match source.read(&mut buffer) {
            Ok(0) => {
                outcome.source_ok = true;
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        outcome.read += n as u64;

        if outcome.client_ok && client.write_all(&buffer[..n]).is_err() {
            outcome.client_ok = false;
        }
        if outcome.cache_ok {
            if let Some(file) = cache.as_mut() {
                if file.write_all(&buffer[..n]).is_err() {
                    outcome.cache_ok = false;
                }
            }
        }
        if !outcome.client_ok && !outcome.cache_ok {
            break;
        }
    }
    if outcome.client_ok {
        outcome.client_ok = client.flush().is_ok();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 写入指定字节数后开始报错的写入器
    struct FailAfter {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_html_builder_template() {
        let html = HtmlBuilder::from_status_code(400, "Bad Request").build();
        assert_eq!(
            html,
            "<HTML><HEAD><TITLE>400 Bad Request</TITLE></HEAD><BODY><H4>400 Bad Request</H4>Bad Request.</BODY></HTML>"
        );
    }

    #[test]
    #[should_panic(expected = "非法的状态码")]
    fn test_html_builder_invalid_status_code() {
        HtmlBuilder::from_status_code(999, "x");
    }

    #[test]
    fn test_file_size() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_tee_both_destinations() {
        let data = vec![7u8; RELAY_CHUNK_SIZE * 3 + 5];
        let mut source = Cursor::new(data.clone());
        let mut client = Vec::new();
        let mut cache = Vec::new();

        let outcome = tee(&mut source, &mut client, Some(&mut cache));
        assert_eq!(outcome.read, data.len() as u64);
        assert!(outcome.client_ok && outcome.cache_ok && outcome.source_ok);
        assert_eq!(client, data);
        assert_eq!(cache, data);
    }

    #[test]
    fn test_tee_cache_failure_keeps_client() {
        let data = vec![1u8; RELAY_CHUNK_SIZE * 2];
        let mut source = Cursor::new(data.clone());
        let mut client = Vec::new();
        let mut cache = FailAfter {
            written: Vec::new(),
            limit: 10,
        };

        let outcome = tee(&mut source, &mut client, Some(&mut cache));
        assert!(outcome.client_ok);
        assert!(!outcome.cache_ok);
        assert_eq!(client, data);
    }

    #[test]
    fn test_tee_client_failure_keeps_cache() {
        let data = vec![2u8; RELAY_CHUNK_SIZE * 2];
        let mut source = Cursor::new(data.clone());
        let mut client = FailAfter {
            written: Vec::new(),
            limit: 0,
        };
        let mut cache = Vec::new();

        let outcome = tee(&mut source, &mut client, Some(&mut cache));
        assert!(!outcome.client_ok);
        assert!(outcome.cache_ok && outcome.source_ok);
        assert_eq!(cache, data);
    }

    #[test]
    fn test_tee_without_cache() {
        let mut source = Cursor::new(b"hello".to_vec());
        let mut client = Vec::new();
        let outcome = tee::<_, _, Vec<u8>>(&mut source, &mut client, None);
        assert!(outcome.client_ok);
        assert!(!outcome.cache_ok);
        assert_eq!(client, b"hello");
    }
}
