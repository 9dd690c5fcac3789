use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use caching_proxy::{Exception, FilterSet, Resolver};

use std::net::Ipv4Addr;

struct FixedResolver(Ipv4Addr);

impl Resolver for FixedResolver {
    fn resolve(&self, _host: &str) -> Result<Vec<Ipv4Addr>, Exception> {
        Ok(vec![self.0])
    }
}

/// 生成包含 `n` 个主机名和 `n` 个网段的过滤文件
fn filter_file(n: usize) -> String {
    let mut content = String::new();
    for i in 0..n {
        content.push_str(&format!("blocked{}.example.com\n", i));
        content.push_str(&format!("10.{}.{}.0/24\n", (i / 256) % 256, i % 256));
    }
    content
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_parse");
    for n in [10usize, 100, 1000] {
        let content = filter_file(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &content, |b, content| {
            b.iter(|| FilterSet::parse(black_box(content)).unwrap());
        });
    }
    group.finish();
}

fn lookup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_lookup");
    let resolver = FixedResolver(Ipv4Addr::new(93, 184, 216, 34));

    for n in [10usize, 100, 1000] {
        let filter = FilterSet::parse(&filter_file(n)).unwrap();
        group.bench_with_input(BenchmarkId::new("miss", n), &filter, |b, filter| {
            b.iter(|| filter.is_filtered(black_box("www.example.com"), &resolver).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("exact_hit", n), &filter, |b, filter| {
            b.iter(|| filter.is_filtered(black_box("blocked0.example.com"), &resolver).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, parse_benchmark, lookup_benchmark);
criterion_main!(benches);
