//! Prompt text sent to agents.
//!
//! Tagged prompts start with a marker such as [`ACTOR_PLAN_TAG`] so later
//! history rewrites can find them again.

use std::collections::BTreeMap;

use persistence::PropModel;

use crate::actions::ActionKind;

pub const ACTOR_PLAN_TAG: &str = "<角色计划>";
pub const STAGE_PLAN_TAG: &str = "<场景计划>";
pub const ARCHIVE_TAG: &str = "<档案记录>";
pub const KICK_OFF_TAG: &str = "<初始设定>";

pub const SUCCESS: &str = "SUCCESS";
pub const CRITICAL_SUCCESS: &str = "CRITICAL_SUCCESS";
pub const FAILURE: &str = "FAILURE";

fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("- {empty}");
    }
    items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
}

fn action_names(kinds: &[ActionKind]) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

pub fn prop_prompt(prop: &PropModel, count: u32) -> String {
    let mut out = format!("### {} x{count}\n- 类型: {}", prop.name, prop.prop_type.as_str());
    if !prop.description.is_empty() {
        out.push_str(&format!("\n- 道具描述: {}", prop.description));
    }
    if !prop.appearance.is_empty() {
        out.push_str(&format!("\n- 道具外观: {}", prop.appearance));
    }
    out
}

fn props_section(props: &[(PropModel, u32)]) -> String {
    if props.is_empty() {
        return "- 无任何道具。".to_string();
    }
    props.iter().map(|(p, n)| prop_prompt(p, *n)).collect::<Vec<_>>().join("\n")
}

pub fn kick_off_actor_prompt(kick_off: &str, about_game: &str, round: u64) -> String {
    format!(
        "# {KICK_OFF_TAG} 游戏世界即将开始运行。这是你的初始设定, 你将以此为起点进行游戏\n\
         ## 游戏介绍\n{about_game}\n\
         ## 游戏运行回合\n当前回合: {round}\n\
         ## 初始设定\n{kick_off}\n\
         ## 输出要求\n- 返回 JSON 对象, 只带如下键: {}, {}",
        ActionKind::MindVoice.as_str(),
        ActionKind::Tag.as_str()
    )
}

pub fn kick_off_stage_prompt(
    kick_off: &str,
    about_game: &str,
    props: &[(PropModel, u32)],
    actors: &[String],
    round: u64,
) -> String {
    format!(
        "# {KICK_OFF_TAG} 游戏世界即将开始运行。这是你作为场景的初始设定\n\
         ## 游戏介绍\n{about_game}\n\
         ## 初始设定\n{kick_off}\n\
         ## 场景内道具\n{}\n\
         ## 场景内角色\n{}\n\
         ## 游戏运行回合\n当前回合: {round}\n\
         ## 输出要求\n- 返回 JSON 对象, 只带如下键: {}, {}",
        props_section(props),
        bullet_list(actors, "无任何角色。"),
        ActionKind::StageNarrate.as_str(),
        ActionKind::Tag.as_str()
    )
}

pub fn kick_off_world_system_prompt(kick_off: &str, about_game: &str, round: u64) -> String {
    format!(
        "# {KICK_OFF_TAG} 游戏世界即将开始运行, 请简要回答你的职能与描述。\n\
         ## 游戏介绍\n{about_game}\n\
         ## 你的职能\n{kick_off}\n\
         ## 游戏运行回合\n当前回合: {round}"
    )
}

/// Inputs of an actor's planning prompt.
#[derive(Debug, Clone, Default)]
pub struct ActorPlanInput {
    pub stage: String,
    pub narrative: String,
    pub exits: Vec<String>,
    pub actors: Vec<String>,
    pub props: Vec<String>,
    pub round: u64,
}

pub fn actor_plan_prompt(input: &ActorPlanInput, allowed: &[ActionKind]) -> String {
    let stage = if input.stage.is_empty() { "未知场景" } else { &input.stage };
    let narrative = if input.narrative.is_empty() {
        String::new()
    } else {
        format!("\n## 你所在场景的环境信息\n- {}", input.narrative)
    };
    let exits = if input.exits.is_empty() {
        "## 目前你不能去往任何场景".to_string()
    } else {
        format!("## 目前你只能去往如下场景\n{}", bullet_list(&input.exits, ""))
    };
    format!(
        "# {ACTOR_PLAN_TAG} 请做出你的计划, 决定你将要做什么。\n\
         ## 你当前所在的场景为: {stage}{narrative}\n\
         {exits}\n\
         ## 场景内其他角色\n{}\n\
         ## 场景内道具\n{}\n\
         ## 游戏运行回合\n当前回合: {}\n\
         ## 要求\n- 返回 JSON 对象, 键只能是: {}\n- 结果中要附带{}。",
        bullet_list(&input.actors, "无其他角色。"),
        bullet_list(&input.props, "无任何道具。"),
        input.round,
        action_names(allowed),
        ActionKind::Tag.as_str()
    )
}

pub fn stage_plan_prompt(props: &[(PropModel, u32)], actors: &[String], round: u64, allowed: &[ActionKind]) -> String {
    format!(
        "# {STAGE_PLAN_TAG} 请输出'场景描述'和'你的计划'\n\
         ## 场景内道具\n{}\n\
         ## 场景内角色\n{}\n\
         ## 游戏运行回合\n当前回合: {round}\n\
         ## 输出要求\n- 返回 JSON 对象, 键只能是: {}\n- 必须包含 {} 和 {}。",
        props_section(props),
        bullet_list(actors, "无任何角色。"),
        action_names(allowed),
        ActionKind::StageNarrate.as_str(),
        ActionKind::Tag.as_str()
    )
}

/// Replacement text for an older planning prompt.
pub fn compressed_plan_stub(tag: &str) -> String {
    format!("# {tag} 较早的计划请求, 内容已省略。")
}

pub fn archive_prompt(actor: &str, known_actors: &[String], known_stages: &[String]) -> String {
    let actors = if known_actors.is_empty() {
        format!("{actor} 目前没有认识的角色。")
    } else {
        format!("{actor} 认识的角色有: {}。", known_actors.join(","))
    };
    let stages = if known_stages.is_empty() {
        format!("{actor} 目前没有已知的场景。")
    } else {
        format!("{actor} 已知的场景包括: {}。", known_stages.join(","))
    };
    format!("# {ARCHIVE_TAG}\n- {actors}\n- {stages}")
}

/// `bodies` maps actor name to (base form, clothes appearance).
pub fn appearance_prompt(bodies: &BTreeMap<String, (String, String)>) -> String {
    let info = bodies
        .iter()
        .map(|(name, (body, clothes))| format!("### {name}\n- 裸身: {body}\n- 衣服: {clothes}"))
        .collect::<Vec<_>>()
        .join("\n");
    let keys: BTreeMap<&str, &str> = bodies.keys().map(|k| (k.as_str(), "?")).collect();
    let shape = serde_json::to_string(&keys).unwrap_or_else(|_| "{}".to_string());
    format!(
        "# 请根据 裸身 与 衣服, 生成当前的角色外观的描述。\n\
         ## 提供给你的信息\n{info}\n\
         ## 输出格式\n{shape}\n\
         - '?' 替换为你推理出的外观, 使用第三人称。"
    )
}

/// Fallback derivation when the appearance system cannot be asked.
pub fn combine_appearance(body: &str, clothes: &str) -> String {
    if clothes.is_empty() {
        body.to_string()
    } else {
        format!("{body} 身穿: {clothes}")
    }
}

pub fn conversation_check_prompt(announce: &[String], speak: &[String], whisper: &[String]) -> String {
    let join = |items: &[String]| {
        if items.is_empty() {
            "无".to_string()
        } else {
            items.join("\n")
        }
    };
    format!(
        "# 玩家输入了如下对话类型事件, 请你检查\n\
         ## {}: 公开说话内容\n{}\n\
         ## {}: 对某角色说, 场景其他角色可以听见\n{}\n\
         ## {}: 只有目标角色可以听见\n{}\n\
         ## 检查规则\n- 对话内容是否违反政策或有不当的内容。\n- 对话内容是否超出游戏范围。\n\
         ## 输出格式\n{{\"{}\": [\"Yes/No\"]}}",
        ActionKind::Announce.as_str(),
        join(announce),
        ActionKind::Speak.as_str(),
        join(speak),
        ActionKind::Whisper.as_str(),
        join(whisper),
        ActionKind::Tag.as_str()
    )
}

pub fn gate_prompt(actor: &str, stage: &str, leaving: bool, condition: &str, status: &str, props: &[(PropModel, u32)]) -> String {
    let verb = if leaving { "离开" } else { "进入" };
    format!(
        "# {actor} 想要{verb}场景: {stage}。\n\
         ## 第1步: 回顾场景的{verb}条件\n{condition}\n\
         ## 第2步: 检查{actor}的状态\n{status}\n\
         ## 第3步: 检查{actor}的道具\n{}\n\
         ## 输出格式\n{{\"{}\": [\"@{actor}>允许或不允许的原因\"], \"{}\": [\"Yes/No\"]}}\n\
         - 如果不允许, 只说明哪一条不符合要求。",
        props_section(props),
        ActionKind::Whisper.as_str(),
        ActionKind::Tag.as_str()
    )
}

pub fn skill_prompt(actor: &str, appearance: &str, skills: &[(PropModel, u32)], props: &[(PropModel, u32)], targets: &[String]) -> String {
    format!(
        "# {actor} 准备使用技能, 请你做出判断并推理结果。\n\
         ## {actor} 信息\n{appearance}\n\
         ## 施放技能\n{}\n\
         ## 配置的道具\n{}\n\
         ## 目标\n{}\n\
         ## 输出格式\n{{\"{}\": [\"推理后的句子描述\"], \"{}\": [\"{CRITICAL_SUCCESS}或{SUCCESS}或{FAILURE}\"]}}",
        props_section(skills),
        props_section(props),
        bullet_list(targets, "无"),
        ActionKind::Announce.as_str(),
        ActionKind::Tag.as_str()
    )
}

pub fn skill_target_prompt(actor: &str, target: &str, narration: &str, result: &str) -> String {
    format!(
        "# {actor} 向 {target} 发动技能。\n\
         ## 事件描述\n{narration}\n\
         ## 系统判断结果\n{result}\n\
         ## 要求\n- 结合事件描述推理技能对 {target} 的影响, 更新你的状态。\n\
         - 返回 JSON 对象, 只带如下键: {}, {}",
        ActionKind::MindVoice.as_str(),
        ActionKind::Tag.as_str()
    )
}
