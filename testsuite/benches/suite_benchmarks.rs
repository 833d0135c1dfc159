//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! End-to-end client to client latency through a relay

use criterion::{Criterion, criterion_group, criterion_main};
use linecast_client::ClientSession;
use linecast_testsuite::{TestRelay, line};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Pair {
    sender: ClientSession,
    receiver: ClientSession,
}

fn bench_client_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let relay = runtime.block_on(TestRelay::start()).unwrap();
    let pair = runtime.block_on(async {
        Pair {
            sender: relay.connect().await.unwrap(),
            receiver: relay.connect().await.unwrap(),
        }
    });
    let pair = Arc::new(Mutex::new(pair));
    let payload = line("the quick brown fox jumps over the lazy dog");

    let mut group = c.benchmark_group("client_round_trip");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("send_receive", |b| {
        b.to_async(&runtime).iter(|| {
            let pair = pair.clone();
            let payload = payload.clone();
            async move {
                let mut pair = pair.lock().await;
                pair.sender.send_line(payload).await.unwrap();
                black_box(pair.receiver.receive_line().await.unwrap());
            }
        });
    });
    group.finish();

    runtime.block_on(relay.shutdown()).unwrap();
}

criterion_group!(benches, bench_client_round_trip);
criterion_main!(benches);
