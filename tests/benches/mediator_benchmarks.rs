//! # Mediator Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | dispatch | routing one response to a live conversation among N |
//! | unknown correlation | discarding a response nobody waits for |
//! | lifecycle | identify → select → operate → complete with K pillars |

use br_01_conversation::testing::{final_reply, identify_reply, StaticPolicy};
use br_01_conversation::{
    ClientSettings, CollectionSettings, ConversationMediator, ConversationParams, ManualScheduler,
    NullEventSink, OperationPolicy, SelectionStrategy,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_bus::{ListenerHandle, MessageListener, MessageTransport, TransportError};
use shared_types::{
    CollectionId, ContributorId, CorrelationId, Destination, Message, MessageBody, OperationArgs,
    OperationKind, ResponseCode,
};
use std::sync::Arc;

/// Transport that accepts and forgets every message.
struct DiscardingTransport;

impl MessageTransport for DiscardingTransport {
    fn send(&self, _destination: &Destination, _message: Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn subscribe(
        &self,
        destination: &Destination,
        _listener: Arc<dyn MessageListener>,
    ) -> Result<ListenerHandle, TransportError> {
        Ok(ListenerHandle::detached(0, destination.clone()))
    }
}

fn settings(pillars: usize) -> ClientSettings {
    ClientSettings {
        collections: vec![CollectionSettings {
            id: CollectionId::new("books"),
            destination: Destination::new("collection.books"),
            contributors: (0..pillars)
                .map(|i| ContributorId::new(format!("pillar-{i}")))
                .collect(),
        }],
        ..ClientSettings::default()
    }
}

struct Bench {
    mediator: ConversationMediator,
    policy: Arc<dyn OperationPolicy>,
}

impl Bench {
    fn new(pillars: usize) -> Self {
        let mediator = ConversationMediator::new(
            settings(pillars),
            Arc::new(DiscardingTransport),
            Arc::new(ManualScheduler::new()),
        );
        Self {
            mediator,
            policy: Arc::new(StaticPolicy::new(
                OperationKind::GetStatus,
                SelectionStrategy::AllIdentified,
            )),
        }
    }

    /// Start a conversation; returns its identify request.
    fn start(&self) -> Message {
        let params = ConversationParams::new(CollectionId::new("books"), OperationArgs::GetStatus);
        let id = self
            .mediator
            .start_conversation(Arc::clone(&self.policy), params, Arc::new(NullEventSink))
            .unwrap();
        let settings = self.mediator.settings();
        Message::new(
            id,
            CollectionId::new("books"),
            settings.client_id.clone(),
            settings.receiver_destination.clone(),
            MessageBody::IdentifyRequest {
                args: OperationArgs::GetStatus,
            },
        )
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("mediator-dispatch");

    for live in [10usize, 1_000, 10_000] {
        let bench = Bench::new(1);
        let requests: Vec<Message> = (0..live).map(|_| bench.start()).collect();
        // Answering a pillar the conversation does not know is routed but ignored,
        // so the same message can be dispatched on every iteration.
        let stray = identify_reply(
            &requests[live / 2],
            "stranger",
            ResponseCode::IdentificationPositive,
            None,
        );

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("routed", live), &stray, |b, message| {
            b.iter(|| black_box(bench.mediator.dispatch(message.clone())))
        });

        let mut orphan = stray.clone();
        orphan.correlation_id = CorrelationId::new();
        group.bench_with_input(
            BenchmarkId::new("unknown_correlation", live),
            &orphan,
            |b, message| b.iter(|| black_box(bench.mediator.dispatch(message.clone()))),
        );
    }

    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversation-lifecycle");

    for pillars in [1usize, 3, 10] {
        let bench = Bench::new(pillars);
        let names: Vec<String> = (0..pillars).map(|i| format!("pillar-{i}")).collect();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("complete", pillars), &names, |b, names| {
            b.iter(|| {
                let request = bench.start();
                for name in names {
                    bench.mediator.dispatch(identify_reply(
                        &request,
                        name,
                        ResponseCode::IdentificationPositive,
                        None,
                    ));
                }
                for name in names {
                    bench.mediator.dispatch(final_reply(
                        &request,
                        name,
                        ResponseCode::OperationCompleted,
                        None,
                    ));
                }
                black_box(bench.mediator.active_count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_lifecycle);
criterion_main!(benches);
