//! Round assembly: the phases in their fixed order, bound to one world.

use engine_core::{Pipeline, PipelineConfig, PipelineError};
use observability::RoundMetrics;
use session::SessionError;

use crate::actions::{GivePropAction, StageTagAction, TagAction, TransferPropAction};
use crate::context::RpgContext;
use crate::systems::{
    ActorPlanningSystem, AnnounceSystem, BehaviorSystem, ClientMessageSystem, CompressHistorySystem, ConnectSystem,
    ConversationCheckSystem, DamageSystem, DeadSystem, DestroySystem, EquipPropSystem, GameOverTeardown, GoToSystem,
    HealSystem, InspectSystem, KickOffSystem, MindVoiceSystem, PickUpPropSystem, PlayerInputSystem, PostActionSystem,
    PostPlanningSystem, PrePlanningSystem, PreGoToSystem, RoundStartSystem, SaveSystem, SaveTeardown, SkillSystem,
    SpeakSystem, StageNarrateSystem, StagePlanningSystem, StageTransferSystem, StealPropSystem, TagSystem,
    TransferPropSystem, UpdateAppearanceSystem, UpdateArchiveSystem, WhisperSystem,
};

/// Register every phase on a fresh pipeline.
///
/// Reactor collectors start recording at registration, so components the
/// scenario builder attached before this call never trigger a reaction.
pub fn build_pipeline(ctx: &mut RpgContext, config: PipelineConfig, connect: ConnectSystem) -> Pipeline<RpgContext> {
    let mut pipeline = Pipeline::new(config);
    pipeline.add_initializer(connect).add_initializer(KickOffSystem);

    pipeline
        .add_executor(RoundStartSystem)
        .add_executor(PlayerInputSystem)
        .add_executor(KickOffSystem)
        .add_executor(PrePlanningSystem)
        .add_executor(StagePlanningSystem)
        .add_executor(ActorPlanningSystem)
        .add_executor(PostPlanningSystem)
        .add_executor(UpdateAppearanceSystem::new("update_appearance"))
        .add_executor(ConversationCheckSystem);

    // Stage narration and tags, then the conversation group.
    pipeline
        .add_reactor(ctx, StageNarrateSystem)
        .add_reactor(ctx, TagSystem::<StageTagAction>::default())
        .add_reactor(ctx, TagSystem::<TagAction>::default())
        .add_reactor(ctx, MindVoiceSystem)
        .add_reactor(ctx, WhisperSystem)
        .add_reactor(ctx, AnnounceSystem)
        .add_reactor(ctx, SpeakSystem);

    // Skills and their damage payloads.
    pipeline
        .add_reactor(ctx, BehaviorSystem)
        .add_reactor(ctx, SkillSystem)
        .add_reactor(ctx, DamageSystem)
        .add_reactor(ctx, HealSystem)
        .add_reactor(ctx, DeadSystem);

    // Props.
    pipeline
        .add_reactor(ctx, StageTransferSystem)
        .add_reactor(ctx, PickUpPropSystem)
        .add_reactor(ctx, StealPropSystem)
        .add_reactor(ctx, TransferPropSystem::<TransferPropAction>::default())
        .add_reactor(ctx, TransferPropSystem::<GivePropAction>::default())
        .add_reactor(ctx, EquipPropSystem);
    pipeline
        .add_executor(UpdateAppearanceSystem::new("update_appearance_after_equip"))
        .add_reactor(ctx, InspectSystem);

    // Movement.
    pipeline.add_reactor(ctx, PreGoToSystem).add_reactor(ctx, GoToSystem);

    pipeline
        .add_executor(PostActionSystem)
        .add_executor(UpdateArchiveSystem)
        .add_executor(CompressHistorySystem)
        .add_executor(ClientMessageSystem)
        .add_executor(SaveSystem)
        .add_executor(DestroySystem);

    pipeline.add_teardown(SaveTeardown).add_teardown(GameOverTeardown);
    pipeline
}

/// A world plus the pipeline that drives it.
pub struct Game {
    ctx: RpgContext,
    pipeline: Pipeline<RpgContext>,
}

impl Game {
    /// Wraps an already-built world. Build the scenario first.
    pub fn new(mut ctx: RpgContext, config: PipelineConfig, connect: ConnectSystem) -> Self {
        let pipeline = build_pipeline(&mut ctx, config, connect);
        Self { ctx, pipeline }
    }

    pub fn ctx(&self) -> &RpgContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut RpgContext {
        &mut self.ctx
    }

    pub fn pipeline(&self) -> &Pipeline<RpgContext> {
        &self.pipeline
    }

    pub fn round(&self) -> u64 {
        self.pipeline.current_round()
    }

    /// No further round will be scheduled: a player died or the round
    /// limit was reached.
    pub fn is_over(&self) -> bool {
        let max = self.pipeline.config().max_rounds;
        self.ctx.is_game_over() || (max > 0 && self.pipeline.current_round() >= max)
    }

    /// Runs the initializers. `step` does this implicitly on first use.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        self.pipeline.initialize(&mut self.ctx).await
    }

    pub async fn step(&mut self) -> Result<RoundMetrics, PipelineError> {
        self.pipeline.step(&mut self.ctx).await
    }

    pub async fn run(&mut self) -> Result<Vec<RoundMetrics>, PipelineError> {
        self.pipeline.run(&mut self.ctx).await
    }

    pub async fn shutdown(&mut self) -> Result<(), PipelineError> {
        self.pipeline.teardown(&mut self.ctx).await
    }

    pub fn submit_command(&self, player: &str, command: impl Into<String>) -> Result<(), SessionError> {
        self.ctx.players.submit_command(player, command)
    }
}
