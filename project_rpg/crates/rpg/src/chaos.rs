use ecs_adapter::EntityId;

/// Fault-injection hooks called by the runner.
pub trait ChaosEngineering {
    fn on_round_start(&mut self, _round: u64) {}

    /// Called with the planning candidates of one gather, in request order.
    /// Entities removed from the list are not asked to plan this round.
    fn on_planning(&mut self, _label: &str, _candidates: &mut Vec<EntityId>) {}
}

#[derive(Debug, Default)]
pub struct NoChaos;

impl ChaosEngineering for NoChaos {}

/// Skips one planning candidate out of every `every`.
#[derive(Debug)]
pub struct DropEveryNth {
    every: usize,
    seen: usize,
}

impl DropEveryNth {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1), seen: 0 }
    }
}

impl ChaosEngineering for DropEveryNth {
    fn on_planning(&mut self, label: &str, candidates: &mut Vec<EntityId>) {
        candidates.retain(|entity| {
            self.seen += 1;
            let keep = self.seen % self.every != 0;
            if !keep {
                tracing::info!(label, entity = %entity, "chaos dropped planning candidate");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_chaos_keeps_everyone() {
        let mut list = vec![EntityId::new(1, 0), EntityId::new(2, 0)];
        NoChaos.on_planning("actor_planning", &mut list);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn drop_every_nth_counts_across_calls() {
        let mut chaos = DropEveryNth::new(2);
        let mut first = vec![EntityId::new(1, 0), EntityId::new(2, 0), EntityId::new(3, 0)];
        chaos.on_planning("stage_planning", &mut first);
        assert_eq!(first, vec![EntityId::new(1, 0), EntityId::new(3, 0)]);

        let mut second = vec![EntityId::new(4, 0)];
        chaos.on_planning("actor_planning", &mut second);
        assert!(second.is_empty());
    }
}
