use serde::{Deserialize, Serialize};
use session::MessageChannel;

/// Which kind of entity an event is being rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientKind {
    World,
    Stage,
    Actor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferVerb {
    PickUp,
    Steal,
    Give,
    StageHandOver,
}

/// Everything the world tells its agents.
///
/// One event renders differently per recipient through [`AgentEvent::format`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    RoundStarted {
        round: u64,
    },
    StageNarrate {
        stage: String,
        narrate: String,
    },
    MindVoice {
        actor: String,
        content: String,
    },
    Whisper {
        from: String,
        to: String,
        content: String,
    },
    Announce {
        from: String,
        stage: String,
        content: String,
    },
    Speak {
        from: String,
        to: String,
        content: String,
    },
    LeftStage {
        actor: String,
        stage: String,
    },
    EnteredStage {
        actor: String,
        from: Option<String>,
        stage: String,
    },
    GateDenied {
        actor: String,
        stage: String,
        leaving: bool,
        reason: String,
    },
    PropTransferred {
        from: String,
        to: String,
        prop: String,
        count: u32,
        verb: TransferVerb,
    },
    PropEquipped {
        actor: String,
        prop: String,
    },
    Inspected {
        inspector: String,
        target: String,
        appearance: String,
        props: Vec<String>,
    },
    SkillBroadcast {
        caster: String,
        narration: String,
    },
    SkillRejected {
        caster: String,
        sentence: String,
        reason: String,
    },
    Damaged {
        source: String,
        target: String,
        amount: i32,
        hp: i32,
        max_hp: i32,
    },
    Healed {
        source: String,
        target: String,
        amount: i32,
        hp: i32,
        max_hp: i32,
    },
    Killed {
        killer: String,
        target: String,
    },
    /// Corrective or informational line for a single recipient.
    Notice {
        text: String,
    },
    GameOver {
        reason: String,
    },
}

fn you(name: &str, recipient: &str) -> String {
    if name == recipient {
        "你".to_string()
    } else {
        name.to_string()
    }
}

fn health_percent(hp: i32, max_hp: i32) -> f64 {
    if max_hp <= 0 {
        return 0.0;
    }
    f64::from(hp) * 100.0 / f64::from(max_hp)
}

impl AgentEvent {
    pub fn class_name(&self) -> &'static str {
        match self {
            AgentEvent::RoundStarted { .. } => "RoundStartedEvent",
            AgentEvent::StageNarrate { .. } => "StageNarrateEvent",
            AgentEvent::MindVoice { .. } => "MindVoiceEvent",
            AgentEvent::Whisper { .. } => "WhisperEvent",
            AgentEvent::Announce { .. } => "AnnounceEvent",
            AgentEvent::Speak { .. } => "SpeakEvent",
            AgentEvent::LeftStage { .. } => "LeftStageEvent",
            AgentEvent::EnteredStage { .. } => "EnteredStageEvent",
            AgentEvent::GateDenied { .. } => "GateDeniedEvent",
            AgentEvent::PropTransferred { .. } => "PropTransferredEvent",
            AgentEvent::PropEquipped { .. } => "PropEquippedEvent",
            AgentEvent::Inspected { .. } => "InspectedEvent",
            AgentEvent::SkillBroadcast { .. } => "SkillBroadcastEvent",
            AgentEvent::SkillRejected { .. } => "SkillRejectedEvent",
            AgentEvent::Damaged { .. } => "DamagedEvent",
            AgentEvent::Healed { .. } => "HealedEvent",
            AgentEvent::Killed { .. } => "KilledEvent",
            AgentEvent::Notice { .. } => "NoticeEvent",
            AgentEvent::GameOver { .. } => "GameOverEvent",
        }
    }

    /// Whether the rendered line is appended to the recipient's history.
    /// Round markers and game over only reach players; a mind voice is
    /// already in the speaker's own reply.
    pub fn enters_history(&self) -> bool {
        !matches!(
            self,
            AgentEvent::RoundStarted { .. } | AgentEvent::MindVoice { .. } | AgentEvent::GameOver { .. }
        )
    }

    /// Player-facing queue this event is delivered on.
    pub fn channel(&self) -> MessageChannel {
        match self {
            AgentEvent::StageNarrate { .. } | AgentEvent::LeftStage { .. } | AgentEvent::EnteredStage { .. } => {
                MessageChannel::Stage
            }
            AgentEvent::RoundStarted { .. }
            | AgentEvent::Notice { .. }
            | AgentEvent::GateDenied { .. }
            | AgentEvent::SkillRejected { .. }
            | AgentEvent::GameOver { .. } => MessageChannel::Tip,
            _ => MessageChannel::Actor,
        }
    }

    /// Render the event for one recipient.
    pub fn format(&self, kind: RecipientKind, recipient: &str) -> String {
        match self {
            AgentEvent::RoundStarted { round } => format!("# 第{round}回合开始。"),
            AgentEvent::StageNarrate { stage, narrate } => match kind {
                RecipientKind::Stage => format!("# 你的场景描述: {narrate}"),
                _ => format!("# {stage}的环境: {narrate}"),
            },
            AgentEvent::MindVoice { actor, content } => {
                format!("# {}的内心独白: {content}", you(actor, recipient))
            }
            AgentEvent::Whisper { from, to, content } => {
                format!("# {}对{}私语道: {content}", you(from, recipient), you(to, recipient))
            }
            AgentEvent::Announce { from, stage, content } => {
                format!("# {}对{stage}里的所有人说: {content}", you(from, recipient))
            }
            AgentEvent::Speak { from, to, content } => {
                format!("# {}对{}说: {content}", you(from, recipient), you(to, recipient))
            }
            AgentEvent::LeftStage { actor, stage } => format!("# {actor}离开了{stage}场景。"),
            AgentEvent::EnteredStage { actor, from, stage } => match from {
                Some(from) if actor == recipient => format!("# 你离开了{from}, 进入了{stage}。"),
                None if actor == recipient => format!("# 你进入了{stage}。"),
                _ => format!("# {actor}进入了场景——{stage}。"),
            },
            AgentEvent::GateDenied {
                actor,
                stage,
                leaving,
                reason,
            } => {
                let verb = if *leaving { "离开" } else { "进入" };
                format!("# {}想要{verb}场景: {stage}, 但是失败了。\n## 说明:\n{reason}", you(actor, recipient))
            }
            AgentEvent::PropTransferred {
                from,
                to,
                prop,
                count,
                verb,
            } => {
                let (from, to) = (you(from, recipient), you(to, recipient));
                match verb {
                    TransferVerb::PickUp => format!("# {to}从{from}场景内获取了道具: {prop} x{count}。"),
                    TransferVerb::Steal => format!("# {to}从{from}身上盗取了{prop} x{count}。"),
                    TransferVerb::Give => format!("# {from}把{prop} x{count}交给了{to}。"),
                    TransferVerb::StageHandOver => format!("# {from}把{prop} x{count}交给了{to}。"),
                }
            }
            AgentEvent::PropEquipped { actor, prop } => format!("# {}装备了{prop}。", you(actor, recipient)),
            AgentEvent::Inspected {
                target,
                appearance,
                props,
                ..
            } => {
                let props = if props.is_empty() {
                    "- 无任何道具。".to_string()
                } else {
                    props.iter().map(|p| format!("- {p}")).collect::<Vec<_>>().join("\n")
                };
                format!("# 你仔细观察了{target}。\n## 外观:\n{appearance}\n## 可见道具:\n{props}")
            }
            AgentEvent::SkillBroadcast { caster, narration } => {
                format!("# {}实施了行动(使用了技能)\n## 行动内容\n{narration}", you(caster, recipient))
            }
            AgentEvent::SkillRejected {
                caster,
                sentence,
                reason,
            } => format!("# {}的技能没有生效: {reason}\n## 原始的行动内容语句\n{sentence}", you(caster, recipient)),
            AgentEvent::Damaged {
                source,
                target,
                amount,
                hp,
                max_hp,
            } => format!(
                "# {}对{}造成了{amount}点伤害, 当前{}的生命值剩余{:.0}%。",
                you(source, recipient),
                you(target, recipient),
                you(target, recipient),
                health_percent(*hp, *max_hp)
            ),
            AgentEvent::Healed {
                source,
                target,
                amount,
                hp,
                max_hp,
            } => format!(
                "# {}为{}恢复了{amount}点生命值, 当前生命值{:.0}%。",
                you(source, recipient),
                you(target, recipient),
                health_percent(*hp, *max_hp)
            ),
            AgentEvent::Killed { killer, target } => {
                format!("# {}击败了{}, {}死亡了。", you(killer, recipient), you(target, recipient), target)
            }
            AgentEvent::Notice { text } => text.clone(),
            AgentEvent::GameOver { reason } => format!("# 游戏结束: {reason}"),
        }
    }
}
