//! # Integration Test Flows
//!
//! A `RepositoryClient` talking to scripted pillars through the
//! `InMemoryMessageBus`, with tokio timers on a paused clock.
//!
//! ## Flows Tested:
//!
//! 1. **Identify → select → operate**: every operation kind reaches `Complete`
//! 2. **Fastest-first**: GetFile only asks the pillar with the best delivery hint
//! 3. **Partial failure**: one failing pillar fails an all-selected operation
//! 4. **Routing**: concurrent conversations never see each other's responses

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use rand::Rng;
    use tokio::time::timeout;

    use br_01_conversation::testing::final_reply;
    use br_01_conversation::{
        EventPayload, OperationEvent, OperationEventType, OperationHandle, TerminalReason,
    };
    use br_02_operations::{AuditTrailQuery, RequestOptions};
    use shared_bus::MessageTransport;
    use shared_types::{
        ChecksumData, ChecksumSpec, ChecksumType, ContributorId, FileSelection, OperationResult,
        ResponseCode,
    };

    use crate::simulation::{IdentifyScript, OperationScript, Script, SimulatedRepository};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn three_cooperative() -> SimulatedRepository {
        SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative()),
            ("pillar-2", Script::cooperative()),
            ("pillar-3", Script::cooperative()),
        ])
        .unwrap()
    }

    /// Every event of one operation, up to the terminal one.
    async fn run_to_end(handle: &mut OperationHandle) -> Vec<OperationEvent> {
        timeout(Duration::from_secs(600), handle.collect_until_terminal())
            .await
            .expect("operation did not terminate")
    }

    fn types(events: &[OperationEvent]) -> Vec<OperationEventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    fn contributors_with(events: &[OperationEvent], wanted: OperationEventType) -> BTreeSet<String> {
        events
            .iter()
            .filter(|e| e.event_type == wanted)
            .filter_map(|e| e.contributor.as_ref().map(|c| c.as_str().to_string()))
            .collect()
    }

    fn md5(value: &str) -> ChecksumData {
        ChecksumData {
            spec: ChecksumSpec::plain(ChecksumType::Md5),
            value: value.into(),
            calculated_at: chrono::Utc::now(),
        }
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // =============================================================================
    // HAPPY PATHS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_get_status_from_every_pillar() {
        let repo = three_cooperative();
        let mut handle = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();

        let events = run_to_end(&mut handle).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, OperationEventType::Complete);

        let outcome = terminal.outcome().unwrap();
        assert_eq!(outcome.results.len(), 3);
        for (contributor, result) in outcome.payloads() {
            match result {
                OperationResult::Status(status) => assert_eq!(&status.contributor, contributor),
                other => panic!("Expected status, got {:?}", other),
            }
        }

        assert_eq!(
            contributors_with(&events, OperationEventType::ComponentIdentified),
            names(&["pillar-1", "pillar-2", "pillar-3"])
        );
        assert_eq!(
            contributors_with(&events, OperationEventType::ComponentComplete),
            names(&["pillar-1", "pillar-2", "pillar-3"])
        );
        assert_eq!(repo.client.mediator().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_operation_kind_completes() {
        let repo = three_cooperative();
        let books = SimulatedRepository::collection;
        let opts = RequestOptions::default;

        let mut handles = vec![
            repo.client.get_file(books(), "f1", "http://dl/f1", opts()).unwrap(),
            repo.client
                .get_file_ids(books(), FileSelection::AllFiles, None, opts())
                .unwrap(),
            repo.client
                .get_checksums(books(), FileSelection::AllFiles, ChecksumSpec::default(), None, opts())
                .unwrap(),
            repo.client
                .get_audit_trails(books(), AuditTrailQuery::default(), opts())
                .unwrap(),
            repo.client.get_status(books(), opts()).unwrap(),
            repo.client
                .put_file(books(), "f2", "http://up/f2", 10, None, None, opts())
                .unwrap(),
            repo.client
                .replace_file(books(), "f3", md5("abc123"), "http://up/f3", 20, None, opts())
                .unwrap(),
            repo.client
                .delete_file(books(), "f4", None, None, opts())
                .unwrap(),
        ];

        for handle in &mut handles {
            let events = run_to_end(handle).await;
            assert_eq!(
                events.last().map(|e| e.event_type),
                Some(OperationEventType::Complete),
                "{:?} did not complete",
                events.first().map(|e| e.operation)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_order_of_a_successful_operation() {
        let repo = SimulatedRepository::start(vec![("pillar-1", Script::cooperative().with_progress())])
            .unwrap();
        let mut handle = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();

        let events = run_to_end(&mut handle).await;
        assert_eq!(
            types(&events),
            vec![
                OperationEventType::IdentifyRequestSent,
                OperationEventType::ComponentIdentified,
                OperationEventType::IdentificationComplete,
                OperationEventType::RequestSent,
                OperationEventType::Progress,
                OperationEventType::ComponentComplete,
                OperationEventType::Complete,
            ]
        );
        assert!(events
            .iter()
            .all(|e| e.correlation_id == handle.correlation_id()));
    }

    // =============================================================================
    // SELECTION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_get_file_uses_fastest_pillar() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative().time_to_deliver(Duration::from_secs(5))),
            ("pillar-2", Script::cooperative().time_to_deliver(Duration::from_secs(1))),
            ("pillar-3", Script::cooperative().time_to_deliver(Duration::from_secs(3))),
        ])
        .unwrap();

        let mut handle = repo
            .client
            .get_file(
                SimulatedRepository::collection(),
                "f1",
                "http://dl/f1",
                RequestOptions::default(),
            )
            .unwrap();

        let events = run_to_end(&mut handle).await;
        let outcome = events.last().unwrap().outcome().unwrap().clone();
        assert!(outcome.is_success());
        assert_eq!(
            outcome.results.keys().cloned().collect::<Vec<_>>(),
            vec![ContributorId::new("pillar-2")]
        );

        assert_eq!(repo.pillar("pillar-2").operation_requests().len(), 1);
        assert!(repo.pillar("pillar-1").operation_requests().is_empty());
        assert!(repo.pillar("pillar-3").operation_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_file_follows_random_delivery_hints() {
        let mut rng = rand::thread_rng();
        let hints: Vec<u64> = (0..5).map(|_| rng.gen_range(1..10_000)).collect();
        let names: Vec<String> = (1..=hints.len()).map(|i| format!("pillar-{i}")).collect();
        let scripts = names
            .iter()
            .zip(&hints)
            .map(|(name, ms)| {
                (
                    name.as_str(),
                    Script::cooperative().time_to_deliver(Duration::from_millis(*ms)),
                )
            })
            .collect();
        let repo = SimulatedRepository::start(scripts).unwrap();

        let mut handle = repo
            .client
            .get_file(
                SimulatedRepository::collection(),
                "f1",
                "http://dl/f1",
                RequestOptions::default(),
            )
            .unwrap();
        let events = run_to_end(&mut handle).await;

        // Ties go to the earlier identify response, so only check the hint.
        let fastest = hints.iter().min().copied();
        let served: Vec<u64> = names
            .iter()
            .zip(&hints)
            .filter(|(name, _)| !repo.pillar(name).operation_requests().is_empty())
            .map(|(_, ms)| *ms)
            .collect();
        assert_eq!(served.len(), 1);
        assert_eq!(served.first().copied(), fastest);
        assert_eq!(events.last().unwrap().event_type, OperationEventType::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_targeted_delete_only_reaches_target() {
        let repo = three_cooperative();
        let mut handle = repo
            .client
            .delete_file(
                SimulatedRepository::collection(),
                "f1",
                None,
                None,
                RequestOptions::default().target(ContributorId::new("pillar-3")),
            )
            .unwrap();

        let events = run_to_end(&mut handle).await;
        assert_eq!(events.last().unwrap().event_type, OperationEventType::Complete);
        assert_eq!(repo.pillar("pillar-3").operation_requests().len(), 1);
        assert!(repo.pillar("pillar-1").operation_requests().is_empty());
        assert!(repo.pillar("pillar-2").operation_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_target_fails_without_operation_requests() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative().identify(IdentifyScript::Negative)),
            ("pillar-2", Script::cooperative()),
        ])
        .unwrap();

        let started = tokio::time::Instant::now();
        let mut handle = repo
            .client
            .delete_file(
                SimulatedRepository::collection(),
                "f1",
                None,
                None,
                RequestOptions::default().target(ContributorId::new("pillar-1")),
            )
            .unwrap();

        let events = run_to_end(&mut handle).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, OperationEventType::Failed);
        assert_eq!(
            terminal.outcome().and_then(|o| o.reason.clone()),
            Some(TerminalReason::RequestedContributorNotAvailable(
                ContributorId::new("pillar-1")
            ))
        );
        // The target's answer ends identification; no deadline involved.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(repo.pillars().iter().all(|p| p.operation_requests().is_empty()));
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_put_file_partial_failure() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative()),
            ("pillar-2", Script::cooperative()),
            (
                "pillar-3",
                Script::cooperative().operation(OperationScript::Fail(ResponseCode::FileTransferFailure)),
            ),
        ])
        .unwrap();

        let mut handle = repo
            .client
            .put_file(
                SimulatedRepository::collection(),
                "f1",
                "http://up/f1",
                10,
                None,
                None,
                RequestOptions::default(),
            )
            .unwrap();

        let events = run_to_end(&mut handle).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, OperationEventType::Failed);

        let outcome = terminal.outcome().unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            outcome.failures.keys().cloned().collect::<Vec<_>>(),
            vec![ContributorId::new("pillar-3")]
        );
        assert_eq!(
            contributors_with(&events, OperationEventType::ComponentFailed),
            names(&["pillar-3"])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_identifications_leave_nobody() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative().identify(IdentifyScript::Negative)),
            ("pillar-2", Script::cooperative().identify(IdentifyScript::Negative)),
        ])
        .unwrap();

        let mut handle = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();

        let events = run_to_end(&mut handle).await;
        let identified: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == OperationEventType::ComponentIdentified)
            .collect();
        assert_eq!(identified.len(), 2);
        assert!(identified.iter().all(|e| matches!(
            &e.payload,
            EventPayload::Identification { verdict, .. } if !verdict.is_positive()
        )));
        assert_eq!(
            events.last().unwrap().outcome().and_then(|o| o.reason.clone()),
            Some(TerminalReason::NoContributorAvailable)
        );
    }

    // =============================================================================
    // ROUTING
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_conversations_are_isolated() {
        let repo = three_cooperative();
        let mut handles: Vec<_> = (0..20)
            .map(|_| {
                repo.client
                    .get_status(SimulatedRepository::collection(), RequestOptions::default())
                    .unwrap()
            })
            .collect();

        for handle in &mut handles {
            let events = run_to_end(handle).await;
            assert_eq!(events.last().unwrap().event_type, OperationEventType::Complete);
            assert!(events
                .iter()
                .all(|e| e.correlation_id == handle.correlation_id()));
        }

        for pillar in repo.pillars() {
            assert_eq!(pillar.operation_requests().len(), 20);
        }
        let stats = repo.client.mediator().stats();
        assert_eq!(stats.completed.load(Ordering::Relaxed), 20);
        assert_eq!(stats.unknown_correlation.load(Ordering::Relaxed), 0);
        assert_eq!(repo.client.mediator().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_discarded() {
        let repo = SimulatedRepository::start(vec![("pillar-1", Script::cooperative())]).unwrap();
        let mut handle = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();
        run_to_end(&mut handle).await;

        let request = repo.pillar("pillar-1").identify_requests()[0].clone();
        let late = final_reply(&request, "pillar-1", ResponseCode::OperationCompleted, None);
        repo.bus
            .send(&repo.client.mediator().settings().receiver_destination, late)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = repo.client.mediator().stats();
        assert_eq!(stats.unknown_correlation.load(Ordering::Relaxed), 1);
        assert!(handle.try_next_event().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_open_operations() {
        let repo = SimulatedRepository::start(vec![("pillar-1", Script::silent())]).unwrap();
        let mut first = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();
        let mut second = repo
            .client
            .get_file_ids(
                SimulatedRepository::collection(),
                FileSelection::AllFiles,
                None,
                RequestOptions::default(),
            )
            .unwrap();

        assert_eq!(repo.client.shutdown(), 2);
        for handle in [&mut first, &mut second] {
            let events = run_to_end(handle).await;
            assert_eq!(
                events.last().unwrap().outcome().and_then(|o| o.reason.clone()),
                Some(TerminalReason::MediatorShutDown)
            );
        }
        assert!(repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_exposition() {
        br_telemetry::register_metrics().unwrap();
        let repo = three_cooperative();
        let mut handle = repo
            .client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap();
        run_to_end(&mut handle).await;

        let text = br_telemetry::gather_metrics().unwrap();
        assert!(text.contains("br_conversations_started_total"));
        assert!(text.contains("br_conversation_duration_seconds"));
    }
}
