use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pasarela::core::{Endpoint, LogicalMember, RoutingToken};
use pasarela::driver::cql::{Consistency, FrameParser, Request};
use pasarela::routing::{
    AddressTranslator, IngressAddressTranslator, IngressConfig, IngressRouter,
    SniAddressTranslator,
};
use pasarela::tls::TlsSettings;
use bytes::BytesMut;
use std::sync::Arc;

/// Members with distinct host ids and unroutable pod addresses
fn create_members(count: usize) -> Vec<LogicalMember> {
    (0..count)
        .map(|i| {
            LogicalMember::new(
                Some(RoutingToken::new(format!("00000000-0000-4000-8000-{:012x}", i)).unwrap()),
                Endpoint::new(format!("10.244.{}.{}", i / 250, i % 250 + 1), 9042).unwrap(),
            )
        })
        .collect()
}

fn create_router(tokens: usize) -> IngressRouter {
    let tokens = create_members(tokens)
        .into_iter()
        .filter_map(|m| m.id().cloned())
        .collect();
    IngressRouter::new(Arc::new(IngressConfig::new(
        Endpoint::new("traefik.k3s.local", 9042).unwrap(),
        tokens,
        TlsSettings::default(),
    )))
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate");

    for member_count in [3, 100, 1000].iter() {
        let members = create_members(*member_count);

        let ingress = IngressAddressTranslator::new(Endpoint::new("traefik.k3s.local", 9042).unwrap());
        group.bench_with_input(
            BenchmarkId::new("ingress", member_count),
            &members,
            |b, members| {
                b.iter(|| {
                    for member in members {
                        black_box(ingress.translate(member).unwrap());
                    }
                });
            },
        );

        let sni = SniAddressTranslator::new(create_router(*member_count));
        group.bench_with_input(
            BenchmarkId::new("sni_ingress", member_count),
            &members,
            |b, members| {
                b.iter(|| {
                    for member in members {
                        black_box(sni.translate(member).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_contact_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("contact_set");

    for token_count in [1, 10, 100].iter() {
        let router = create_router(*token_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(token_count),
            &router,
            |b, router| b.iter(|| black_box(router.contact_set())),
        );
    }

    group.finish();
}

fn bench_frame_parse(c: &mut Criterion) {
    let mut encoded = BytesMut::new();
    Request::query(
        "SELECT peer, rpc_address, host_id, data_center, rack FROM system.peers",
        Consistency::One,
    )
    .to_frame(1)
    .encode(&mut encoded);

    c.bench_function("frame_parse_query", |b| {
        b.iter(|| {
            let mut buf = encoded.clone();
            black_box(FrameParser::parse(&mut buf).unwrap());
        })
    });
}

criterion_group!(benches, bench_translate, bench_contact_set, bench_frame_parse);
criterion_main!(benches);
