//! Warm-throughput benchmark: five canonical snippets run against a
//! Coordinator whose Python worker has already paid its startup cost.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use heimdall_sandbox::{Config, Coordinator};
use std::time::Duration;

const SNIPPET_ARITHMETIC: &str = "sum(i*i for i in range(1000))";

const SNIPPET_STRING_OPS: &str = concat!(
    "words = \"the quick brown fox jumps over the lazy dog\".split()\n",
    "\" \".join(w.capitalize() for w in words)"
);

const SNIPPET_LIST_COMPREHENSION: &str = concat!(
    "matrix = [[j*10+i for i in range(10)] for j in range(10)]\n",
    "[x for row in matrix for x in row if x % 3 == 0]"
);

const SNIPPET_DICT_OPS: &str = concat!(
    "text = \"hello world\"\n",
    "freq = {}\n",
    "for c in text:\n",
    "    freq[c] = freq.get(c, 0) + 1\n",
    "sorted(freq.items(), key=lambda x: -x[1])"
);

const SNIPPET_JSON_ROUNDTRIP: &str = concat!(
    "import json\n",
    "data = {\"key\": \"value\", \"numbers\": [1, 2, 3], \"nested\": {\"a\": 1}}\n",
    "json.dumps(json.loads(json.dumps(data)))"
);

fn warm_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("build benchmark runtime");
    let dir = tempfile::tempdir().expect("tempdir for bench workspace");
    let config = Config::for_workspace(dir.path()).expect("configure bench workspace");
    let coordinator = Coordinator::new(config);

    // Pre-warm: spawn the worker before measurement starts.
    runtime.block_on(coordinator.execute_python("1", vec![]));

    let mut group = c.benchmark_group("warm_throughput");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    for (name, snippet) in [
        ("arithmetic", SNIPPET_ARITHMETIC),
        ("string_ops", SNIPPET_STRING_OPS),
        ("list_comprehension", SNIPPET_LIST_COMPREHENSION),
        ("dict_ops", SNIPPET_DICT_OPS),
        ("json_roundtrip", SNIPPET_JSON_ROUNDTRIP),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| runtime.block_on(coordinator.execute_python(black_box(snippet), vec![])))
        });
    }
    group.finish();
}

criterion_group!(benches, warm_throughput);
criterion_main!(benches);
