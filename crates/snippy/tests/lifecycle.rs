use core::time::Duration;
use parking_lot::Mutex;
use snippy::{
    BreakerConfig, BreakerStatus, Error, Event, IdentityConfig, MemoryStore, Observer, Origin,
    RetryConfig, ServiceContext, SnippetDraft, SnippetService, SystemClock, ThreadRandom,
    UniquenessProbe, UserId,
};
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn fallbacks(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("fallback:").map(str::to_owned))
            .collect()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl Observer for Recorder {
    fn on_event(&self, event: &Event<'_>) {
        let line = match event {
            Event::FallbackIssued { value, .. } => format!("fallback:{value}"),
            Event::BreakerOpened { .. } => "breaker:opened".to_owned(),
            Event::BreakerHalfOpened => "breaker:half-open".to_owned(),
            Event::BreakerClosed => "breaker:closed".to_owned(),
            other => format!("{other:?}"),
        };
        self.events.lock().push(line);
    }
}

struct AlwaysTaken;

impl UniquenessProbe for AlwaysTaken {
    async fn exists(&self, _candidate: &str) -> snippy::Result<bool> {
        Ok(true)
    }
}

fn context_with(config: &IdentityConfig, observer: Arc<dyn Observer>) -> Arc<ServiceContext> {
    Arc::new(
        ServiceContext::with_components(config, ThreadRandom, SystemClock, observer).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn fallback_is_reported_with_the_assigned_value() {
    let recorder = Arc::new(Recorder::default());
    let context = context_with(&IdentityConfig::default(), recorder.clone());

    let assignment = context.assign_short_id(&AlwaysTaken, None).await.unwrap();

    assert_eq!(assignment.origin, Origin::Fallback { attempts: 5 });
    assert!(assignment.value.starts_with("e-"));
    assert_eq!(recorder.fallbacks(), [assignment.value]);

    let username = context
        .assign_username(&AlwaysTaken, Some("Ada"))
        .await
        .unwrap();
    assert!(username.value.starts_with("ada-"));
    assert_eq!(recorder.fallbacks().len(), 2);
}

#[tokio::test]
async fn mixed_workload_keeps_every_counter_equal_to_its_rows() {
    let store = MemoryStore::new();
    let context = context_with(&IdentityConfig::default(), Arc::new(snippy::NoopObserver));
    let service = SnippetService::new(store.clone(), context);

    let mut users: Vec<UserId> = Vec::new();
    for name in ["Ada", "Grace", "Linus", "Barbara", "Ken", "Dennis"] {
        let subject = format!("auth0|{name}");
        users.push(service.register_user(Some(name), &subject).await.unwrap().id);
    }

    let mut short_ids = Vec::new();
    for (i, owner) in users.iter().enumerate() {
        let snippet = service
            .create_snippet(*owner, SnippetDraft::titled(format!("snippet {i}")))
            .await
            .unwrap();
        short_ids.push(snippet.short_id);
    }

    for (round, user) in users.iter().cycle().take(40).enumerate() {
        let target = &short_ids[round % short_ids.len()];
        match round % 4 {
            0 | 1 => {
                service.toggle_favorite(*user, target).await.unwrap();
            }
            2 => {
                let comment = service
                    .add_comment(*user, target, &format!("comment {round}"))
                    .await
                    .unwrap();
                if round % 3 == 0 {
                    service.delete_comment(*user, comment.id).await.unwrap();
                }
            }
            _ => {
                let fork = service.fork_snippet(*user, target).await.unwrap();
                short_ids.push(fork.short_id);
            }
        }
    }

    // The first snippet goes away with its children; its forks survive.
    service.delete_snippet(users[0], &short_ids[0]).await.unwrap();

    let snippets = store.snippets();
    assert!(!snippets.is_empty());
    for snippet in snippets {
        let live = store.live_children(snippet.id);
        assert!(
            live.matches(&snippet),
            "{} counters {:?} disagree with rows {live:?}",
            snippet.short_id,
            (snippet.fork_count, snippet.favorite_count, snippet.comment_count)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn breaker_trips_on_an_unreachable_store_and_recovers() {
    let config = IdentityConfig {
        connection: RetryConfig::exponential(3, 10, 10),
        breaker: BreakerConfig {
            failure_threshold: 2,
            recovery_ms: 5_000,
        },
        ..IdentityConfig::default()
    };
    let recorder = Arc::new(Recorder::default());
    let store = MemoryStore::new();
    let service = SnippetService::new(store.clone(), context_with(&config, recorder.clone()));

    store.fail_next_begins(u32::MAX);
    let err = service.register_user(Some("Ada"), "auth0|ada").await.unwrap_err();
    assert_eq!(err, Error::CircuitOpen);
    assert_eq!(
        service.context().connection().breaker_status(),
        BreakerStatus::Open
    );

    // Rejected without touching the store.
    let err = service.register_user(Some("Ada"), "auth0|ada").await.unwrap_err();
    assert_eq!(err, Error::CircuitOpen);

    store.fail_next_begins(0);
    tokio::time::advance(Duration::from_millis(5_000)).await;

    let user = service.register_user(Some("Ada"), "auth0|ada").await.unwrap();
    assert!(user.username.starts_with("ada"));
    assert_eq!(
        service.context().connection().breaker_status(),
        BreakerStatus::Closed
    );
    assert_eq!(recorder.count("breaker:opened"), 1);
    assert_eq!(recorder.count("breaker:half-open"), 1);
    assert_eq!(recorder.count("breaker:closed"), 1);
}
