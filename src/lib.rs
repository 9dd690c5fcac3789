pub mod cache;
pub mod config;
pub mod exception;
pub mod filter;
pub mod origin;
pub mod param;
pub mod pool;
pub mod proxy;
pub mod request;
pub mod response;
pub mod util;

pub use cache::CacheStore;
pub use config::Config;
pub use exception::Exception;
pub use filter::{DnsResolver, FilterSet, IpPrefix, Resolver};
pub use origin::{Connector, TcpConnector};
pub use param::{HttpRequestMethod, HttpVersion};
pub use pool::ThreadPool;
pub use proxy::ProxyHandler;
pub use request::Request;
pub use response::Response;
pub use util::HtmlBuilder;
