use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use ecs_adapter::{CollectorId, EcsError};
use futures_util::FutureExt;
use observability::RoundMetrics;

use crate::phase::{Executor, Initializer, PhaseError, PhaseKind, Reactor, Teardown, WorldContext};

/// Pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Maximum rounds for [`Pipeline::run`] (0 = unlimited).
    pub max_rounds: u64,
    /// A round slower than this logs a warning (0 = no budget).
    pub round_budget_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("phase {phase} failed fatally: {reason}")]
    Fatal { phase: &'static str, reason: String },

    #[error("ecs error: {0}")]
    Ecs(#[from] EcsError),

    #[error("pipeline already torn down")]
    TornDown,
}

enum Slot<C> {
    Initializer(Box<dyn Initializer<C>>),
    Executor(Box<dyn Executor<C>>),
    Reactor {
        reactor: Box<dyn Reactor<C>>,
        collector: CollectorId,
    },
    Teardown(Box<dyn Teardown<C>>),
}

impl<C> Slot<C> {
    fn kind(&self) -> PhaseKind {
        match self {
            Slot::Initializer(_) => PhaseKind::Initializer,
            Slot::Executor(_) => PhaseKind::Executor,
            Slot::Reactor { .. } => PhaseKind::Reactor,
            Slot::Teardown(_) => PhaseKind::Teardown,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Slot::Initializer(p) => p.name(),
            Slot::Executor(p) => p.name(),
            Slot::Reactor { reactor, .. } => reactor.name(),
            Slot::Teardown(p) => p.name(),
        }
    }
}

enum Outcome {
    Done,
    Failed,
    Fatal(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Await one phase step, turning panics and errors into an [`Outcome`].
async fn guarded<F>(phase: &'static str, step: F) -> Outcome
where
    F: Future<Output = Result<(), PhaseError>>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(Ok(())) => Outcome::Done,
        Ok(Err(e)) if e.is_fatal() => {
            tracing::error!(phase, error = %e, "phase failed fatally");
            Outcome::Fatal(e.to_string())
        }
        Ok(Err(e)) => {
            tracing::warn!(phase, error = %e, "phase failed, skipped for this round");
            Outcome::Failed
        }
        Err(payload) => {
            tracing::error!(phase, panic = %panic_message(payload.as_ref()), "phase panicked, skipped for this round");
            Outcome::Failed
        }
    }
}

/// Ordered list of phases run once per round.
///
/// Phases run strictly one after another; every effect of a phase is
/// visible to the next one.
pub struct Pipeline<C> {
    slots: Vec<Slot<C>>,
    config: PipelineConfig,
    current_round: u64,
    initialized: bool,
    torn_down: bool,
}

impl<C: WorldContext + 'static> Pipeline<C> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            slots: Vec::new(),
            config,
            current_round: 0,
            initialized: false,
            torn_down: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn current_round(&self) -> u64 {
        self.current_round
    }

    pub fn add_initializer(&mut self, phase: impl Initializer<C> + 'static) -> &mut Self {
        self.slots.push(Slot::Initializer(Box::new(phase)));
        self
    }

    pub fn add_executor(&mut self, phase: impl Executor<C> + 'static) -> &mut Self {
        self.slots.push(Slot::Executor(Box::new(phase)));
        self
    }

    /// Register a reactor; its collector starts listening immediately.
    pub fn add_reactor(&mut self, ctx: &mut C, reactor: impl Reactor<C> + 'static) -> &mut Self {
        let collector = ctx.ecs_mut().subscribe(reactor.trigger());
        self.slots.push(Slot::Reactor {
            reactor: Box::new(reactor),
            collector,
        });
        self
    }

    pub fn add_teardown(&mut self, phase: impl Teardown<C> + 'static) -> &mut Self {
        self.slots.push(Slot::Teardown(Box::new(phase)));
        self
    }

    /// Registered phases in execution order.
    pub fn phases(&self) -> Vec<(PhaseKind, &'static str)> {
        self.slots.iter().map(|s| (s.kind(), s.name())).collect()
    }

    /// Run every initializer once. Called implicitly by the first `step`.
    pub async fn initialize(&mut self, ctx: &mut C) -> Result<(), PipelineError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        for slot in self.slots.iter_mut() {
            if let Slot::Initializer(phase) = slot {
                let name = phase.name();
                if let Outcome::Fatal(reason) = guarded(name, phase.initialize(ctx)).await {
                    return Err(PipelineError::Fatal { phase: name, reason });
                }
            }
        }
        tracing::info!(phases = self.slots.len(), "pipeline initialized");
        Ok(())
    }

    /// Execute a single round.
    pub async fn step(&mut self, ctx: &mut C) -> Result<RoundMetrics, PipelineError> {
        if self.torn_down {
            return Err(PipelineError::TornDown);
        }
        self.initialize(ctx).await?;

        let start = Instant::now();
        self.current_round += 1;
        ctx.begin_round(self.current_round);

        let mut phases_run = 0;
        let mut phases_failed = 0;

        for slot in self.slots.iter_mut() {
            let (name, outcome) = match slot {
                Slot::Initializer(_) | Slot::Teardown(_) => continue,
                Slot::Executor(phase) => {
                    let name = phase.name();
                    let mut outcome = guarded(name, phase.pre_execute(ctx)).await;
                    if matches!(outcome, Outcome::Done) {
                        outcome = guarded(name, phase.execute(ctx)).await;
                    }
                    if matches!(outcome, Outcome::Done) {
                        outcome = guarded(name, phase.post_execute(ctx)).await;
                    }
                    (name, outcome)
                }
                Slot::Reactor { reactor, collector } => {
                    let name = reactor.name();
                    let drained = ctx.ecs_mut().drain_collector(*collector)?;
                    let trigger = reactor.trigger();
                    let view: &C = ctx;
                    let batch: Vec<_> = drained
                        .into_iter()
                        .filter(|&e| {
                            view.ecs().is_alive(e) && trigger.holds(view.ecs(), e) && reactor.filter(view, e)
                        })
                        .collect();
                    if batch.is_empty() {
                        continue;
                    }
                    tracing::trace!(phase = name, batch = batch.len(), "reactor triggered");
                    (name, guarded(name, reactor.react(ctx, batch)).await)
                }
            };

            phases_run += 1;
            match outcome {
                Outcome::Done => {}
                Outcome::Failed => phases_failed += 1,
                Outcome::Fatal(reason) => return Err(PipelineError::Fatal { phase: name, reason }),
            }
        }

        let (requests, failed_requests) = ctx.take_request_counts();
        let metrics = RoundMetrics {
            round: self.current_round,
            duration_us: start.elapsed().as_micros(),
            phases_run,
            phases_failed,
            entity_count: ctx.ecs().entity_count(),
            requests,
            failed_requests,
        };
        metrics.log(self.config.round_budget_ms);
        Ok(metrics)
    }

    /// Run rounds until `max_rounds` is reached or the context asks to stop.
    pub async fn run(&mut self, ctx: &mut C) -> Result<Vec<RoundMetrics>, PipelineError> {
        let mut all_metrics = Vec::new();
        loop {
            if self.config.max_rounds > 0 && self.current_round >= self.config.max_rounds {
                break;
            }
            if ctx.should_stop() {
                tracing::info!(round = self.current_round, "stop requested, no further rounds");
                break;
            }
            all_metrics.push(self.step(ctx).await?);
        }
        Ok(all_metrics)
    }

    /// Run every teardown phase once. All of them run even if one fails;
    /// the first fatal error is returned.
    pub async fn teardown(&mut self, ctx: &mut C) -> Result<(), PipelineError> {
        if self.torn_down {
            return Err(PipelineError::TornDown);
        }
        self.torn_down = true;
        let mut first_fatal = None;
        for slot in self.slots.iter_mut() {
            if let Slot::Teardown(phase) = slot {
                let name = phase.name();
                if let Outcome::Fatal(reason) = guarded(name, phase.teardown(ctx)).await {
                    first_fatal.get_or_insert(PipelineError::Fatal { phase: name, reason });
                }
            }
        }
        tracing::info!(rounds = self.current_round, "pipeline torn down");
        first_fatal.map_or(Ok(()), Err)
    }
}
