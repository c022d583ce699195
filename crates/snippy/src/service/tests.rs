use crate::test_support::{FixedClock, ScriptedRandom};
use crate::{
    ChildCounts, CountingObserver, Error, ErrorKind, Field, IdentityConfig, MemoryStore,
    RandSource, ServiceContext, SnippetDraft, SnippetService, ThreadRandom, User, UserId,
};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000_123;

type Service<R> = SnippetService<MemoryStore, R, FixedClock>;

fn service<R: RandSource + Clone>(rng: R) -> (Service<R>, Arc<CountingObserver>) {
    let observer = Arc::new(CountingObserver::new());
    let context = ServiceContext::with_components(
        &IdentityConfig::default(),
        rng,
        FixedClock(NOW),
        observer.clone(),
    )
    .unwrap();
    (
        SnippetService::new(MemoryStore::new(), Arc::new(context)),
        observer,
    )
}

async fn users<R: RandSource + Clone>(service: &Service<R>, n: usize) -> Vec<User> {
    let mut users = Vec::with_capacity(n);
    for i in 0..n {
        let user = service
            .register_user(Some(format!("User {i}").as_str()), &format!("auth0|{i}"))
            .await
            .unwrap();
        users.push(user);
    }
    users
}

#[tokio::test]
async fn register_user_derives_username_from_display_name() {
    let (service, _) = service(ScriptedRandom::new([821]));
    let user = service
        .register_user(Some("Ada Lovelace"), "auth0|ada")
        .await
        .unwrap();

    assert_eq!(user.username, "adalovelace1821");
    assert_eq!(user.display_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(service.store().user("adalovelace1821"), Some(user));
}

#[tokio::test]
async fn register_user_requires_an_auth_subject() {
    let (service, _) = service(ThreadRandom);
    let err = service.register_user(Some("Ada"), "  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn create_snippet_starts_with_zero_counters() {
    let (service, _) = service(ThreadRandom);
    let [owner]: [User; 1] = users(&service, 1).await.try_into().unwrap();

    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("hello"))
        .await
        .unwrap();

    assert_eq!(snippet.short_id.len(), 7);
    assert_eq!(snippet.owner, owner.id);
    assert_eq!(snippet.created_at_millis, NOW);
    assert_eq!(
        (snippet.fork_count, snippet.favorite_count, snippet.comment_count),
        (0, 0, 0)
    );
    assert_eq!(service.snippet(&snippet.short_id).await, Ok(snippet));
}

#[tokio::test]
async fn create_snippet_keeps_a_preassigned_short_id() {
    let (service, _) = service(ThreadRandom);
    let [owner]: [User; 1] = users(&service, 1).await.try_into().unwrap();
    let draft = SnippetDraft {
        short_id: "keep123".to_owned(),
        ..SnippetDraft::titled("kept")
    };

    let snippet = service.create_snippet(owner.id, draft).await.unwrap();
    assert_eq!(snippet.short_id, "keep123");
}

#[tokio::test]
async fn create_snippet_for_unknown_owner_is_not_found() {
    let (service, _) = service(ThreadRandom);
    let err = service
        .create_snippet(UserId::from_raw(999), SnippetDraft::titled("orphan"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(service.store().snippets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_short_ids_fall_back_and_only_a_fallback_clash_surfaces() {
    // Every draw is 0, so every candidate is "0000000".
    let (service, observer) = service(ScriptedRandom::new([0]));
    let [owner]: [User; 1] = users(&service, 1).await.try_into().unwrap();

    let first = service
        .create_snippet(owner.id, SnippetDraft::titled("one"))
        .await
        .unwrap();
    assert_eq!(first.short_id, "0000000");

    let second = service
        .create_snippet(owner.id, SnippetDraft::titled("two"))
        .await
        .unwrap();
    assert_eq!(second.short_id, "e-000000003f");
    assert_eq!(observer.snapshot().fallbacks, 1);
    assert_eq!(observer.snapshot().exhaustions, 1);

    let err = service
        .create_snippet(owner.id, SnippetDraft::titled("three"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collision(Field::ShortId));
    assert_eq!(service.store().snippets().len(), 2);
}

#[tokio::test]
async fn toggle_favorite_on_then_off() {
    let (service, _) = service(ThreadRandom);
    let [owner, fan]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("liked"))
        .await
        .unwrap();

    let on = service
        .toggle_favorite(fan.id, &snippet.short_id)
        .await
        .unwrap();
    assert!(on.is_favorited);
    assert_eq!(on.favorite_count, 1);

    let off = service
        .toggle_favorite(fan.id, &snippet.short_id)
        .await
        .unwrap();
    assert!(!off.is_favorited);
    assert_eq!(off.favorite_count, 0);

    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.favorite_count, 0);
    assert_eq!(service.store().live_children(snippet.id).favorites, 0);
}

#[tokio::test]
async fn favorite_count_tracks_creates_minus_deletes() {
    const N: usize = 12;
    const M: usize = 5;

    let (service, _) = service(ThreadRandom);
    let fans = users(&service, N + 1).await;
    let snippet = service
        .create_snippet(fans[N].id, SnippetDraft::titled("popular"))
        .await
        .unwrap();

    for fan in &fans[..N] {
        service
            .toggle_favorite(fan.id, &snippet.short_id)
            .await
            .unwrap();
    }
    for fan in &fans[..M] {
        service
            .toggle_favorite(fan.id, &snippet.short_id)
            .await
            .unwrap();
    }

    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.favorite_count, (N - M) as u64);
    assert!(service.store().live_children(snippet.id).matches(&stored));
}

#[tokio::test]
async fn comments_move_the_comment_count() {
    let (service, _) = service(ThreadRandom);
    let [owner, author]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("discussed"))
        .await
        .unwrap();

    let comment = service
        .add_comment(author.id, &snippet.short_id, "  nice work  ")
        .await
        .unwrap();
    assert_eq!(comment.body, "nice work");
    assert_eq!(
        service.snippet(&snippet.short_id).await.unwrap().comment_count,
        1
    );

    let err = service
        .delete_comment(owner.id, comment.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(
        service.snippet(&snippet.short_id).await.unwrap().comment_count,
        1
    );

    service.delete_comment(author.id, comment.id).await.unwrap();
    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.comment_count, 0);
    assert!(service.store().live_children(snippet.id).matches(&stored));
}

#[tokio::test]
async fn blank_comments_are_rejected() {
    let (service, _) = service(ThreadRandom);
    let [owner]: [User; 1] = users(&service, 1).await.try_into().unwrap();
    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("quiet"))
        .await
        .unwrap();

    let err = service
        .add_comment(owner.id, &snippet.short_id, " \n ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn failed_counter_update_rolls_back_the_child_row() {
    let (service, _) = service(ThreadRandom);
    let [owner, author]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("fragile"))
        .await
        .unwrap();

    service.store().fail_next_counter_updates(1);
    let err = service
        .add_comment(author.id, &snippet.short_id, "lost")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.comment_count, 0);
    assert_eq!(service.store().live_children(snippet.id), ChildCounts::default());
}

#[tokio::test]
async fn failed_commit_discards_the_favorite() {
    let (service, _) = service(ThreadRandom);
    let [owner, fan]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let snippet = service
        .create_snippet(owner.id, SnippetDraft::titled("fragile"))
        .await
        .unwrap();

    service.store().fail_next_commits(1);
    assert!(
        service
            .toggle_favorite(fan.id, &snippet.short_id)
            .await
            .is_err()
    );

    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.favorite_count, 0);
    assert_eq!(service.store().live_children(snippet.id).favorites, 0);
}

#[tokio::test]
async fn forks_count_against_their_parent() {
    let (service, _) = service(ThreadRandom);
    let [owner, forker]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let parent = service
        .create_snippet(
            owner.id,
            SnippetDraft {
                html: "<p>hi</p>".to_owned(),
                ..SnippetDraft::titled("parent")
            },
        )
        .await
        .unwrap();

    let fork = service
        .fork_snippet(forker.id, &parent.short_id)
        .await
        .unwrap();
    assert_eq!(fork.forked_from, Some(parent.id));
    assert_eq!(fork.owner, forker.id);
    assert_eq!(fork.html, "<p>hi</p>");
    assert_ne!(fork.short_id, parent.short_id);
    assert_eq!(
        service.snippet(&parent.short_id).await.unwrap().fork_count,
        1
    );

    service
        .delete_snippet(forker.id, &fork.short_id)
        .await
        .unwrap();
    let stored = service.snippet(&parent.short_id).await.unwrap();
    assert_eq!(stored.fork_count, 0);
    assert!(service.store().live_children(parent.id).matches(&stored));
}

#[tokio::test]
async fn deleting_a_parent_cascades_and_detaches_forks() {
    let (service, _) = service(ThreadRandom);
    let [owner, fan]: [User; 2] = users(&service, 2).await.try_into().unwrap();
    let parent = service
        .create_snippet(owner.id, SnippetDraft::titled("parent"))
        .await
        .unwrap();
    let fork = service
        .fork_snippet(fan.id, &parent.short_id)
        .await
        .unwrap();
    service
        .toggle_favorite(fan.id, &parent.short_id)
        .await
        .unwrap();
    service
        .add_comment(fan.id, &parent.short_id, "first")
        .await
        .unwrap();

    let err = service
        .delete_snippet(fan.id, &parent.short_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    service
        .delete_snippet(owner.id, &parent.short_id)
        .await
        .unwrap();
    assert_eq!(
        service.snippet(&parent.short_id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(service.store().live_children(parent.id), ChildCounts::default());
    let orphan = service.snippet(&fork.short_id).await.unwrap();
    assert_eq!(orphan.forked_from, None);
}

#[tokio::test(start_paused = true)]
async fn begin_retries_connectivity_failures() {
    let (service, observer) = service(ThreadRandom);
    service.store().fail_next_begins(2);

    let user = service.register_user(Some("Grace"), "auth0|grace").await;

    assert!(user.is_ok());
    assert_eq!(observer.snapshot().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn begin_gives_up_after_the_connection_budget() {
    let (service, _) = service(ThreadRandom);
    service.store().fail_next_begins(3);

    let err = service
        .register_user(Some("Grace"), "auth0|grace")
        .await
        .unwrap_err();

    match err {
        Error::Exhausted {
            policy, attempts, ..
        } => {
            assert_eq!(policy, "connection");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn lookups_retry_connectivity_failures() {
    let (service, observer) = service(ThreadRandom);
    let [author]: [User; 1] = users(&service, 1).await.try_into().unwrap();
    let snippet = service
        .create_snippet(author.id, SnippetDraft::titled("hello"))
        .await
        .unwrap();
    service.store().fail_next_reads(1);

    let comment = service
        .add_comment(author.id, &snippet.short_id, "first")
        .await
        .unwrap();

    assert_eq!(comment.author, author.id);
    assert_eq!(observer.snapshot().retries, 1);
    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.comment_count, 1);
}

#[tokio::test(start_paused = true)]
async fn lookups_give_up_after_the_connection_budget() {
    let (service, observer) = service(ThreadRandom);
    let [author]: [User; 1] = users(&service, 1).await.try_into().unwrap();
    let snippet = service
        .create_snippet(author.id, SnippetDraft::titled("hello"))
        .await
        .unwrap();
    service.store().fail_next_reads(3);

    let err = service
        .toggle_favorite(author.id, &snippet.short_id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Exhausted {
            policy: "connection",
            ..
        }
    ));
    assert_eq!(observer.snapshot().retries, 2);
    assert_eq!(service.store().live_children(snippet.id), ChildCounts::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_favorites_keep_the_counter_exact() {
    const FANS: usize = 64;

    let (service, _) = service(ThreadRandom);
    let fans = users(&service, FANS + 1).await;
    let snippet = service
        .create_snippet(fans[FANS].id, SnippetDraft::titled("hot"))
        .await
        .unwrap();
    let service = Arc::new(service);

    let handles: Vec<_> = fans[..FANS]
        .iter()
        .map(|fan| {
            let service = Arc::clone(&service);
            let short_id = snippet.short_id.clone();
            let fan = fan.id;
            tokio::spawn(async move { service.toggle_favorite(fan, &short_id).await })
        })
        .collect();
    let mut counts = Vec::with_capacity(FANS);
    for result in futures::future::join_all(handles).await {
        let toggle = result.unwrap().unwrap();
        assert!(toggle.is_favorited);
        counts.push(toggle.favorite_count);
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=FANS as u64).collect::<Vec<_>>());

    let stored = service.snippet(&snippet.short_id).await.unwrap();
    assert_eq!(stored.favorite_count, FANS as u64);
    assert!(service.store().live_children(snippet.id).matches(&stored));
}
