use anyhow::{Context, bail};
use futures::future::try_join_all;
use serde::Serialize;
use snippy::{
    CountingObserver, EventCounts, MemoryStore, Observer, ServiceContext, SnippetDraft,
    SnippetService, SystemClock, ThreadRandom, UserId,
};
use std::{ops::AddAssign, sync::Arc, time::Instant};

#[derive(Debug, Clone, Copy)]
pub struct DemoPlan {
    pub users: usize,
    pub snippets: usize,
    pub rounds: usize,
}

/// What one workload run did, and whether the counters held up.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DemoReport {
    pub users: usize,
    pub snippets: usize,
    pub forks: usize,
    pub favorites_added: usize,
    pub favorites_removed: usize,
    pub comments_added: usize,
    pub comments_deleted: usize,
    pub snippets_checked: usize,
    pub elapsed_ms: u128,
    pub events: EventCounts,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    forks: usize,
    favorites_added: usize,
    favorites_removed: usize,
    comments_added: usize,
    comments_deleted: usize,
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.forks += rhs.forks;
        self.favorites_added += rhs.favorites_added;
        self.favorites_removed += rhs.favorites_removed;
        self.comments_added += rhs.comments_added;
        self.comments_deleted += rhs.comments_deleted;
    }
}

type Service = SnippetService<MemoryStore, ThreadRandom, SystemClock>;

/// Registers users, gives some of them a snippet, then lets every user
/// favorite, comment on and fork those snippets concurrently. Fails if any
/// snippet's counters disagree with its child rows afterwards.
pub async fn run(
    context: ServiceContext,
    counts: Arc<CountingObserver>,
    plan: DemoPlan,
) -> anyhow::Result<DemoReport> {
    let store = MemoryStore::new();
    let service = Arc::new(SnippetService::new(store.clone(), Arc::new(context)));
    let start = Instant::now();

    let mut users = Vec::with_capacity(plan.users);
    for i in 0..plan.users {
        let user = service
            .register_user(Some(&format!("Demo User {i}")), &format!("demo|{i}"))
            .await
            .context("failed to register user")?;
        users.push(user.id);
    }

    let mut targets = Vec::with_capacity(plan.snippets);
    for (i, owner) in users.iter().take(plan.snippets).enumerate() {
        let snippet = service
            .create_snippet(*owner, SnippetDraft::titled(format!("demo snippet {i}")))
            .await
            .context("failed to create snippet")?;
        targets.push(snippet.short_id);
    }
    let targets: Arc<[String]> = targets.into();

    #[cfg(feature = "tracing")]
    tracing::info!(
        users = plan.users,
        snippets = plan.snippets,
        rounds = plan.rounds,
        "starting workload"
    );

    let tasks = users.iter().enumerate().map(|(seat, user)| {
        let service = Arc::clone(&service);
        let targets = Arc::clone(&targets);
        let user = *user;
        let rounds = plan.rounds;
        tokio::spawn(async move { act(&service, user, seat, &targets, rounds).await })
    });
    let mut tally = Tally::default();
    for outcome in try_join_all(tasks).await? {
        tally += outcome?;
    }

    let snippets = store.snippets();
    for snippet in &snippets {
        let live = store.live_children(snippet.id);
        if !live.matches(snippet) {
            bail!(
                "snippet {} counters (forks {}, favorites {}, comments {}) disagree with rows {live:?}",
                snippet.short_id,
                snippet.fork_count,
                snippet.favorite_count,
                snippet.comment_count,
            );
        }
    }

    Ok(DemoReport {
        users: plan.users,
        snippets: plan.snippets,
        forks: tally.forks,
        favorites_added: tally.favorites_added,
        favorites_removed: tally.favorites_removed,
        comments_added: tally.comments_added,
        comments_deleted: tally.comments_deleted,
        snippets_checked: snippets.len(),
        elapsed_ms: start.elapsed().as_millis(),
        events: counts.snapshot(),
    })
}

/// One user's share of the workload. The operation mix is a fixed function
/// of the seat and round, so runs differ only in interleaving.
async fn act(
    service: &Service,
    user: UserId,
    seat: usize,
    targets: &[String],
    rounds: usize,
) -> anyhow::Result<Tally> {
    let mut tally = Tally::default();
    for round in 0..rounds {
        let target = &targets[(seat + round) % targets.len()];
        match (seat + round) % 5 {
            0 | 1 => {
                if service.toggle_favorite(user, target).await?.is_favorited {
                    tally.favorites_added += 1;
                } else {
                    tally.favorites_removed += 1;
                }
            }
            2 | 3 => {
                let comment = service
                    .add_comment(user, target, &format!("round {round} from seat {seat}"))
                    .await?;
                tally.comments_added += 1;
                if round % 3 == 0 {
                    service.delete_comment(user, comment.id).await?;
                    tally.comments_deleted += 1;
                }
            }
            _ => {
                service.fork_snippet(user, target).await?;
                tally.forks += 1;
            }
        }
    }
    Ok(tally)
}

/// Builds the context a demo run uses: the caller's observer plus a counter
/// the report is read from.
pub fn context(
    identity: &snippy::IdentityConfig,
    observer: Arc<dyn Observer>,
) -> anyhow::Result<(ServiceContext, Arc<CountingObserver>)> {
    let counts = Arc::new(CountingObserver::new());
    let context = ServiceContext::with_components(
        identity,
        ThreadRandom,
        SystemClock,
        Arc::new((Arc::clone(&counts), observer)),
    )?;
    Ok((context, counts))
}
