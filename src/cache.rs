// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 磁盘缓存
//!
//! 每个 (主机, 路径) 对应缓存根目录下的一个文件：
//! - `/` 映射为 `<host>/index.html`；
//! - 以 `/` 结尾的目录路径映射为 `<host><path>index.html`；
//! - 其余路径映射为 `<host><path>`。
//!
//! 读与写之间默认不加锁，两个并发的首次请求可能交错写入同一个文件。
//! 开启 `write_lock` 后，同一个键上的查找与写入被串行化，读者不会看到写了一半的文件。

use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    num::NonZeroUsize,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex},
};

use log::{debug, warn};
use lru::LruCache;

use crate::{exception::Exception, param::*};

/// 写锁表最多保留的键数量
const WRITE_LOCK_CAPACITY: usize = 1024;

pub struct CacheStore {
    root: PathBuf,
    write_locks: Option<Mutex<LruCache<PathBuf, Arc<Mutex<()>>>>>,
}

impl CacheStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            write_locks: None,
        }
    }

    /// 为同一个键的并发写入者启用写锁
    pub fn with_write_lock(mut self) -> Self {
        // WRITE_LOCK_CAPACITY 是非零常量
        let capacity = NonZeroUsize::new(WRITE_LOCK_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        self.write_locks = Some(Mutex::new(LruCache::new(capacity)));
        self
    }

    /// 根据主机和路径计算缓存文件的位置。
    ///
    /// 路径按分量拼接，拒绝 `..`、过长的分量以及包含 `/` 的主机名。
    pub fn path_for(&self, host: &str, url_path: &str) -> Result<PathBuf, Exception> {
        if host.is_empty() || host.contains('/') || host == "." || host == ".." {
            return Err(Exception::InvalidCachePath);
        }
        if !url_path.starts_with('/') {
            return Err(Exception::InvalidCachePath);
        }

        let mut relative = PathBuf::from(host);
        for component in Path::new(url_path).components() {
            match component {
                Component::RootDir => {}
                Component::Normal(part) => {
                    if part.len() > MAX_PATH_COMPONENT {
                        return Err(Exception::InvalidCachePath);
                    }
                    relative.push(part);
                }
                _ => return Err(Exception::InvalidCachePath),
            }
        }
        if url_path.ends_with('/') {
            relative.push(INDEX_FILE);
        }
        if host.len() > MAX_PATH_COMPONENT {
            return Err(Exception::InvalidCachePath);
        }

        let full = self.root.join(relative);
        if full.as_os_str().len() > MAX_CACHE_PATH {
            return Err(Exception::InvalidCachePath);
        }
        Ok(full)
    }

    /// 打开已缓存的文件，返回文件句柄和文件大小。缓存未命中返回 `Ok(None)`。
    pub fn read(&self, host: &str, url_path: &str) -> io::Result<Option<(File, u64)>> {
        let path = match self.path_for(host, url_path) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if is_miss(&e) => return Ok(None),
            Err(e) => return Err(e),
        };
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Ok(None);
        }
        debug!("缓存命中：{}", path.display());
        Ok(Some((file, metadata.len())))
    }

    /// 创建缓存文件以及所需的全部中间目录。已存在的文件会被截断。
    pub fn create_for_write(&self, host: &str, url_path: &str) -> io::Result<File> {
        let path = self
            .path_for(host, url_path)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
    }

    /// 删除一个（通常是写了一半的）缓存文件
    pub fn remove(&self, host: &str, url_path: &str) {
        if let Ok(path) = self.path_for(host, url_path) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("无法删除不完整的缓存文件{}：{}", path.display(), e);
                }
            }
        }
    }

    /// 获取某个键的写锁。未启用写锁时返回 `None`。
    pub fn write_lock(&self, host: &str, url_path: &str) -> Option<Arc<Mutex<()>>> {
        let locks = self.write_locks.as_ref()?;
        let key = self.path_for(host, url_path).ok()?;
        let mut locks = match locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let lock = locks.get_or_insert(key, || Arc::new(Mutex::new(())));
        Some(Arc::clone(lock))
    }
}

// 中间某一级是文件而不是目录时会得到 NotADirectory，同样视为未命中
fn is_miss(e: &io::Error) -> bool {
    e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(20)
}
