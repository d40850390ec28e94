//! End-to-end client-server benchmarks over HTTP.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;
use wirerpc_client::{Client, TransportConfig};
use wirerpc_protocol::{Grammar, Value};
use wirerpc_server::{HandlerError, HandlerRegistry, MethodTable, Router, Server, ServerConfig};

struct TestSetup {
    _server: Arc<Server>,
    base: String,
}

impl TestSetup {
    fn client(&self, grammar: Grammar) -> Client {
        let path = match grammar {
            Grammar::XmlRpc => "/RPC2",
            Grammar::JsonRpc => "/json",
            Grammar::Wddx => "/wddx",
        };
        Client::new(TransportConfig::new(format!("{}{}", self.base, path), grammar)).unwrap()
    }
}

fn setup_server(rt: &Runtime) -> TestSetup {
    let echo = MethodTable::new().method("echo", |args| {
        HandlerError::check_arity(args, 1)?;
        Ok(args[0].clone())
    });
    let registry = HandlerRegistry::new()
        .with_handler("Bench", echo)
        .with_system_handler();

    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Server::new(
        ServerConfig::new(addr),
        Arc::new(Router::new(registry)),
    ));

    let server_clone = server.clone();
    rt.spawn(async move {
        let _ = server_clone.serve(listener).await;
    });

    TestSetup {
        _server: server,
        base: format!("http://{}", addr),
    }
}

fn bench_ping_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server(&rt);

    let mut group = c.benchmark_group("e2e_ping");
    group.throughput(Throughput::Elements(1));

    for grammar in Grammar::ALL {
        let client = setup.client(grammar);
        group.bench_function(grammar.name(), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(client.ping().await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_echo_payload(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server(&rt);

    let mut group = c.benchmark_group("e2e_echo");

    for grammar in Grammar::ALL {
        let client = setup.client(grammar);
        for size in [100, 10000] {
            let payload = Value::Str("x".repeat(size));
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(grammar.name(), size),
                &payload,
                |b, payload| {
                    b.to_async(&rt).iter(|| async {
                        black_box(
                            client
                                .call("Bench.echo", vec![payload.clone()])
                                .await
                                .unwrap(),
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_concurrent_requests(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server(&rt);
    let client = setup.client(Grammar::JsonRpc);

    let mut group = c.benchmark_group("e2e_concurrent");

    for concurrency in [1, 10, 50] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| {
                    let client = client.clone();
                    async move {
                        let mut tasks = tokio::task::JoinSet::new();
                        for i in 0..concurrency {
                            let client = client.clone();
                            tasks.spawn(async move {
                                client
                                    .call("Bench.echo", vec![Value::Int(i as i64)])
                                    .await
                            });
                        }
                        while let Some(result) = tasks.join_next().await {
                            black_box(result.unwrap().unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ping_latency,
    bench_echo_payload,
    bench_concurrent_requests,
);

criterion_main!(benches);
