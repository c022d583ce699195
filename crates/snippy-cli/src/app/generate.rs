use parking_lot::Mutex;
use snippy::{Assignment, ServiceContext, UniquenessProbe};
use std::collections::HashSet;

/// Treats every value issued earlier in this run as taken, so a batch never
/// repeats itself.
#[derive(Default)]
pub struct IssuedProbe {
    issued: Mutex<HashSet<String>>,
}

impl IssuedProbe {
    fn issue(&self, assignment: &Assignment) {
        self.issued.lock().insert(assignment.value.clone());
    }
}

impl UniquenessProbe for IssuedProbe {
    async fn exists(&self, candidate: &str) -> snippy::Result<bool> {
        Ok(self.issued.lock().contains(candidate))
    }
}

pub async fn short_ids(context: &ServiceContext, count: usize) -> anyhow::Result<Vec<Assignment>> {
    let probe = IssuedProbe::default();
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let assignment = context.assign_short_id(&probe, None).await?;
        probe.issue(&assignment);
        out.push(assignment);
    }
    Ok(out)
}

pub async fn usernames(
    context: &ServiceContext,
    display_name: Option<&str>,
    count: usize,
) -> anyhow::Result<Vec<Assignment>> {
    let probe = IssuedProbe::default();
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let assignment = context.assign_username(&probe, display_name).await?;
        probe.issue(&assignment);
        out.push(assignment);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snippy::{IdentityConfig, NoopObserver, SystemClock, ThreadRandom};
    use std::sync::Arc;

    fn context() -> ServiceContext {
        ServiceContext::with_components(
            &IdentityConfig::default(),
            ThreadRandom,
            SystemClock,
            Arc::new(NoopObserver),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn short_ids_are_distinct() {
        let ids = short_ids(&context(), 200).await.unwrap();
        let distinct: HashSet<_> = ids.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(distinct.len(), 200);
        assert!(ids.iter().all(|a| a.value.len() == 7 && !a.is_fallback()));
    }

    #[tokio::test]
    async fn usernames_share_the_display_name_base() {
        let names = usernames(&context(), Some("Grace Hopper"), 5).await.unwrap();
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|a| a.value.starts_with("gracehopper")));
    }
}
