//! # Timeout Flows
//!
//! Deadlines driven by the tokio clock. Every test runs on a paused clock, so
//! waiting out a 60 second operation timeout takes no wall time.

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    use br_01_conversation::{
        EventPayload, FailureReason, OperationEvent, OperationEventType,
        OperationHandle, OperationTimeoutOverride, TerminalReason,
    };
    use br_02_operations::RequestOptions;
    use shared_types::{ContributorId, OperationKind};

    use crate::simulation::{settings, OperationScript, Script, SimulatedRepository};

    async fn run_to_end(handle: &mut OperationHandle) -> Vec<OperationEvent> {
        timeout(Duration::from_secs(3600), handle.collect_until_terminal())
            .await
            .expect("operation did not terminate")
    }

    fn status(repo: &SimulatedRepository) -> OperationHandle {
        repo.client
            .get_status(SimulatedRepository::collection(), RequestOptions::default())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_pillar_dropped_at_identify_deadline() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative()),
            ("pillar-2", Script::cooperative()),
            ("pillar-3", Script::silent()),
        ])
        .unwrap();

        let started = Instant::now();
        let mut handle = status(&repo);
        let events = run_to_end(&mut handle).await;

        assert!(started.elapsed() >= Duration::from_secs(10));
        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, OperationEventType::Complete);

        let selected = events
            .iter()
            .find(|e| e.event_type == OperationEventType::IdentificationComplete)
            .map(|e| e.payload.clone());
        let Some(EventPayload::Contributors(mut selected)) = selected else {
            panic!("Expected IdentificationComplete with contributors");
        };
        selected.sort();
        assert_eq!(
            selected,
            vec![ContributorId::new("pillar-1"), ContributorId::new("pillar-2")]
        );
        assert!(repo.pillar("pillar-3").operation_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nobody_answers() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::silent()),
            ("pillar-2", Script::silent()),
        ])
        .unwrap();

        let mut handle = status(&repo);
        let events = run_to_end(&mut handle).await;
        assert_eq!(
            events.iter().map(|e| e.event_type).collect::<Vec<_>>(),
            vec![OperationEventType::IdentifyRequestSent, OperationEventType::Failed]
        );
        assert_eq!(
            events.last().unwrap().outcome().and_then(|o| o.reason.clone()),
            Some(TerminalReason::NoContributorAvailable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_deadline_fails_pending_pillars() {
        let repo = SimulatedRepository::start(vec![
            ("pillar-1", Script::cooperative()),
            ("pillar-2", Script::cooperative().operation(OperationScript::Silent)),
        ])
        .unwrap();

        let started = Instant::now();
        let mut handle = status(&repo);
        let events = run_to_end(&mut handle).await;
        assert!(started.elapsed() >= Duration::from_secs(60));

        let failed: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == OperationEventType::ComponentFailed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].contributor, Some(ContributorId::new("pillar-2")));
        assert_eq!(failed[0].payload, EventPayload::Failure(FailureReason::Timeout));

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, OperationEventType::Failed);
        assert_eq!(terminal.outcome().unwrap().results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_operation_timeout_override() {
        let mut config = settings(&["pillar-1", "pillar-2"]);
        config.operation_timeouts = vec![OperationTimeoutOverride {
            operation: OperationKind::GetStatus,
            identify_timeout_ms: Some(2_000),
            operation_timeout_ms: None,
        }];
        let repo = SimulatedRepository::start_with(
            config,
            vec![("pillar-1", Script::cooperative()), ("pillar-2", Script::silent())],
        )
        .unwrap();

        let started = Instant::now();
        let mut handle = status(&repo);
        let events = run_to_end(&mut handle).await;

        assert_eq!(events.last().unwrap().event_type, OperationEventType::Complete);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_expires_stale_conversations() {
        let mut config = settings(&["pillar-1"]);
        config.timeouts.identify_timeout_ms = 3_600_000;
        config.timeouts.conversation_timeout_ms = 5_000;
        config.timeouts.cleanup_interval_ms = 1_000;
        let repo =
            SimulatedRepository::start_with(config, vec![("pillar-1", Script::silent())]).unwrap();

        let cleaner = repo.client.mediator().spawn_cleanup();

        let started = Instant::now();
        let mut handle = status(&repo);
        let events = run_to_end(&mut handle).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            events.last().unwrap().outcome().and_then(|o| o.reason.clone()),
            Some(TerminalReason::ConversationTimedOut)
        );

        repo.client.shutdown();
        timeout(Duration::from_secs(5), cleaner)
            .await
            .expect("cleanup task did not stop")
            .unwrap();
    }
}
