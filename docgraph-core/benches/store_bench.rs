// Benchmark graph store writes and full-history analytics scans.

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use docgraph_core::analyze::{ScanControl, Scope, collect_deployments, health, stats};
use docgraph_core::config::AnalyticsSection;
use docgraph_core::events::{DeploymentMetadata, EventTracker};
use docgraph_core::resolve::{EntityResolver, ProjectDescriptor};
use docgraph_core::store::{GraphStore, JsonGraphStore};

const SSGS: [&str; 4] = ["hugo", "jekyll", "mkdocs", "docusaurus"];

fn bench_record_deployments(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_record_deployments");

    for count in [100, 1_000] {
        group.bench_with_input(BenchmarkId::new("count", count), &count, |b, &n| {
            b.iter(|| {
                rt.block_on(async {
                    let store: Arc<dyn GraphStore> = Arc::new(JsonGraphStore::in_memory());
                    let resolver = EntityResolver::new(Arc::clone(&store), Default::default());
                    let tracker = EventTracker::new(Arc::clone(&store), Default::default());
                    let project = resolver
                        .resolve(&ProjectDescriptor::new("/bench/project"))
                        .await
                        .unwrap()
                        .node
                        .id;
                    let base = Utc::now() - Duration::days(60);
                    for i in 0..n {
                        let meta = DeploymentMetadata {
                            timestamp: Some(base + Duration::minutes(i64::from(i))),
                            ..Default::default()
                        };
                        tracker
                            .record_deployment(&project, SSGS[(i % 4) as usize], i % 3 != 0, meta, None)
                            .await
                            .unwrap();
                    }
                });
            });
        });
    }
    group.finish();
}

fn bench_analytics_scan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    // Pre-populate: 50 projects × 40 deployments.
    let store: Arc<dyn GraphStore> = rt.block_on(async {
        let store: Arc<dyn GraphStore> = Arc::new(JsonGraphStore::in_memory());
        let resolver = EntityResolver::new(Arc::clone(&store), Default::default());
        let tracker = EventTracker::new(Arc::clone(&store), Default::default());
        let base = Utc::now() - Duration::days(90);
        for p in 0..50 {
            let mut descriptor = ProjectDescriptor::new(format!("/bench/project-{p}"));
            descriptor.languages.insert("python".into(), 10);
            let project = resolver.resolve(&descriptor).await.unwrap().node.id;
            for i in 0..40 {
                let meta = DeploymentMetadata {
                    timestamp: Some(base + Duration::hours(i64::from(p * 40 + i))),
                    ..Default::default()
                };
                tracker
                    .record_deployment(&project, SSGS[(i % 4) as usize], (p + i) % 5 != 0, meta, None)
                    .await
                    .unwrap();
            }
        }
        store
    });

    let names: Vec<String> = SSGS.iter().map(|s| (*s).to_string()).collect();
    c.bench_function("analytics_compare_ssgs", |b| {
        b.iter(|| {
            let snapshot = store.snapshot();
            let control = ScanControl::new();
            let deployments = collect_deployments(&snapshot, &Scope::All, &control).unwrap();
            stats::compare_ssgs(&deployments, &names, &control).unwrap();
        });
    });

    c.bench_function("analytics_health_report", |b| {
        b.iter(|| {
            let snapshot = store.snapshot();
            let deployments = collect_deployments(&snapshot, &Scope::All, &ScanControl::new()).unwrap();
            health::health_report(&deployments, &AnalyticsSection::default(), Utc::now());
        });
    });
}

criterion_group!(benches, bench_record_deployments, bench_analytics_scan);
criterion_main!(benches);
