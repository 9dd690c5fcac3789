// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 目标过滤
//!
//! 过滤集合由两部分组成：
//! - 精确匹配（区分大小写）的主机名列表；
//! - 预先掩码过的 IPv4 前缀（CIDR）列表。
//!
//! 过滤集合在启动时加载一次，之后以 `Arc<FilterSet>` 的形式只读共享给所有工作线程。

use std::{
    collections::HashSet,
    fs,
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::{exception::Exception, param::ORIGIN_PORT};

lazy_static! {
    static ref IP_ENTRY: Regex = Regex::new(r"^(\d{1,3}(?:\.\d{1,3}){3})/(\d{1,2})$").unwrap();
}

/// 主机名解析。源站连接和过滤检查都通过它获取 IPv4 地址。
#[cfg_attr(test, mockall::automock)]
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str) -> Result<Vec<Ipv4Addr>, Exception>;
}

/// 使用系统解析器（getaddrinfo）的实现，只保留 IPv4 结果
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve(&self, host: &str) -> Result<Vec<Ipv4Addr>, Exception> {
        let addrs = match (host, ORIGIN_PORT).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("无法解析主机{}：{}", host, e);
                return Err(Exception::UnresolvableHost);
            }
        };
        let v4: Vec<Ipv4Addr> = addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .collect();
        if v4.is_empty() {
            return Err(Exception::UnresolvableHost);
        }
        Ok(v4)
    }
}

/// 一个 IPv4 网段。`network` 已按前缀长度掩码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    network: u32,
    prefix_len: u8,
}

impl IpPrefix {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, Exception> {
        if prefix_len > 32 {
            return Err(Exception::InvalidFilterEntry {
                line: 0,
                entry: format!("{}/{}", addr, prefix_len),
            });
        }
        let mask = mask_for(prefix_len);
        Ok(Self {
            network: u32::from(addr) & mask,
            prefix_len,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask_for(self.prefix_len) == self.network
    }
}

fn mask_for(prefix_len: u8) -> u32 {
    u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0)
}

#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    exact_hosts: HashSet<String>,
    ip_prefixes: Vec<IpPrefix>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts<I, P>(hosts: I, prefixes: P) -> Self
    where
        I: IntoIterator<Item = String>,
        P: IntoIterator<Item = IpPrefix>,
    {
        Self {
            exact_hosts: hosts.into_iter().collect(),
            ip_prefixes: prefixes.into_iter().collect(),
        }
    }

    /// 从文件加载过滤集合
    pub fn load(filename: &str) -> Result<Self, Exception> {
        let content = fs::read_to_string(filename).map_err(|e| {
            Exception::ConfigError(format!("无法读取过滤文件{}：{}", filename, e))
        })?;
        Self::parse(&content)
    }

    /// 解析过滤文件内容。
    ///
    /// 每行一项：以数字开头的行必须是 `a.b.c.d/len`，其余非空行是精确匹配的主机名。
    pub fn parse(content: &str) -> Result<Self, Exception> {
        let mut filter = Self::new();
        for (index, raw) in content.lines().enumerate() {
            let entry = raw.trim_end_matches(&['\r', '\n'][..]);
            if entry.is_empty() {
                continue;
            }
            if entry.starts_with(|c: char| c.is_ascii_digit()) {
                filter.ip_prefixes.push(parse_prefix(entry, index + 1)?);
            } else {
                filter.exact_hosts.insert(entry.to_string());
            }
        }
        debug!(
            "过滤集合已载入：{}个主机名，{}个网段",
            filter.exact_hosts.len(),
            filter.ip_prefixes.len()
        );
        Ok(filter)
    }

    pub fn hosts(&self) -> &HashSet<String> {
        &self.exact_hosts
    }

    pub fn prefixes(&self) -> &[IpPrefix] {
        &self.ip_prefixes
    }

    /// 判断主机是否被过滤。
    ///
    /// 不以数字开头的主机先做精确匹配；之后无论是否匹配，都会解析主机并逐个比对网段。
    /// 解析失败返回 `UnresolvableHost`，而不是“未过滤”。
    pub fn is_filtered(&self, host: &str, resolver: &dyn Resolver) -> Result<bool, Exception> {
        if !host.starts_with(|c: char| c.is_ascii_digit()) && self.exact_hosts.contains(host) {
            return Ok(true);
        }
        let addrs = resolver.resolve(host)?;
        Ok(addrs
            .iter()
            .any(|addr| self.ip_prefixes.iter().any(|prefix| prefix.contains(*addr))))
    }
}

fn parse_prefix(entry: &str, line: usize) -> Result<IpPrefix, Exception> {
    let invalid = || {
        warn!("过滤文件第{}行不是合法的网段：{}", line, entry);
        Exception::InvalidFilterEntry {
            line,
            entry: entry.to_string(),
        }
    };
    let captures = IP_ENTRY.captures(entry).ok_or_else(invalid)?;
    let addr = Ipv4Addr::from_str(&captures[1]).map_err(|_| invalid())?;
    let prefix_len: u8 = captures[2].parse().map_err(|_| invalid())?;
    if prefix_len > 32 {
        return Err(invalid());
    }
    IpPrefix::new(addr, prefix_len)
}
