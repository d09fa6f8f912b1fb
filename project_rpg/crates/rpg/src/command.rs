//! Player command grammar: `/verb args`.

use crate::actions::ActionKind;
use crate::format::{make_target_message, parse_prop_count, parse_target_message, parse_target_prop};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Action values to attach to the player's actor.
    Act(Vec<(ActionKind, String)>),
    /// Nothing to attach; tell the player why.
    Tip(String),
}

pub const HELP: &str = "可用指令: /speak 目标 内容, /whisper 目标 内容, /announce 内容, /mindvoice 内容, \
/goto 场景, /pickup 道具[=数量], /steal 目标 道具[=数量], /give 目标 道具[=数量], /equip 道具, \
/inspect 目标, /behavior 行动语句, /skill 目标 技能";

fn single(kind: ActionKind, value: impl Into<String>) -> PlayerCommand {
    PlayerCommand::Act(vec![(kind, value.into())])
}

fn missing(what: &str) -> PlayerCommand {
    PlayerCommand::Tip(format!("缺少{what}。{HELP}"))
}

/// `@B>hi` as-is, or `B hi` rewritten into it.
fn target_message(kind: ActionKind, arg: &str) -> PlayerCommand {
    if arg.starts_with('@') {
        return match parse_target_message(arg) {
            Some(_) => single(kind, arg),
            None => missing("目标或内容"),
        };
    }
    match arg.split_once(char::is_whitespace) {
        Some((target, message)) if !message.trim().is_empty() => {
            single(kind, make_target_message(target, message.trim()))
        }
        _ => missing("目标或内容"),
    }
}

/// `@B/Potion=2` as-is, or `B Potion=2` / `B Potion 2` rewritten into it.
fn target_prop(kind: ActionKind, arg: &str) -> PlayerCommand {
    if arg.starts_with('@') {
        return match parse_target_prop(arg) {
            Some(_) => single(kind, arg),
            None => missing("目标或道具"),
        };
    }
    let parts: Vec<&str> = arg.split_whitespace().collect();
    let value = match parts.as_slice() {
        [target, prop] => format!("@{target}/{prop}"),
        [target, prop, count] if count.parse::<u32>().is_ok() => format!("@{target}/{prop}={count}"),
        _ => return missing("目标或道具"),
    };
    match parse_target_prop(&value) {
        Some(_) => single(kind, value),
        None => missing("目标或道具"),
    }
}

pub fn parse_command(input: &str) -> PlayerCommand {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return PlayerCommand::Tip(HELP.to_string());
    }

    let Some(body) = trimmed.strip_prefix('/') else {
        return target_message(ActionKind::Speak, trimmed);
    };
    let mut parts = body.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    match verb.as_str() {
        "speak" | "say" => target_message(ActionKind::Speak, arg),
        "whisper" => target_message(ActionKind::Whisper, arg),
        "announce" if !arg.is_empty() => single(ActionKind::Announce, arg),
        "mindvoice" if !arg.is_empty() => single(ActionKind::MindVoice, arg),
        "goto" if !arg.is_empty() => single(ActionKind::GoTo, arg),
        "pickup" => match parse_prop_count(arg) {
            Some(_) => single(ActionKind::PickUpProp, arg),
            None => missing("道具"),
        },
        "steal" => target_prop(ActionKind::StealProp, arg),
        "give" => target_prop(ActionKind::GiveProp, arg),
        "equip" if !arg.is_empty() => single(ActionKind::EquipProp, arg),
        "inspect" if !arg.is_empty() => single(ActionKind::Inspect, arg),
        "behavior" if !arg.is_empty() => single(ActionKind::Behavior, arg),
        "skill" => match arg.split_once(char::is_whitespace) {
            Some((target, skill)) if !skill.trim().is_empty() => PlayerCommand::Act(vec![
                (ActionKind::SkillTarget, target.trim_start_matches('@').to_string()),
                (ActionKind::Skill, skill.trim().to_string()),
            ]),
            _ => missing("目标或技能"),
        },
        "help" | "?" => PlayerCommand::Tip(HELP.to_string()),
        "announce" | "mindvoice" | "goto" | "equip" | "inspect" | "behavior" => missing("参数"),
        _ => PlayerCommand::Tip(format!("未知指令: /{verb}。{HELP}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(kind: ActionKind, value: &str) -> PlayerCommand {
        PlayerCommand::Act(vec![(kind, value.to_string())])
    }

    #[test]
    fn plain_text_is_speech() {
        assert_eq!(parse_command("B hello there"), act(ActionKind::Speak, "@B>hello there"));
        assert_eq!(parse_command("@B>hi"), act(ActionKind::Speak, "@B>hi"));
        assert!(matches!(parse_command("hello"), PlayerCommand::Tip(_)));
    }

    #[test]
    fn speech_verbs() {
        assert_eq!(parse_command("/speak B hi"), act(ActionKind::Speak, "@B>hi"));
        assert_eq!(parse_command("/whisper @B>psst"), act(ActionKind::Whisper, "@B>psst"));
        assert_eq!(parse_command("/announce listen all"), act(ActionKind::Announce, "listen all"));
        assert_eq!(parse_command("/MindVoice hmm"), act(ActionKind::MindVoice, "hmm"));
    }

    #[test]
    fn movement_and_props() {
        assert_eq!(parse_command("/goto 北门"), act(ActionKind::GoTo, "北门"));
        assert_eq!(parse_command("/pickup Potion=2"), act(ActionKind::PickUpProp, "Potion=2"));
        assert_eq!(parse_command("/give B Potion 2"), act(ActionKind::GiveProp, "@B/Potion=2"));
        assert_eq!(parse_command("/steal @B/Crown"), act(ActionKind::StealProp, "@B/Crown"));
        assert_eq!(parse_command("/equip Sword"), act(ActionKind::EquipProp, "Sword"));
        assert_eq!(parse_command("/inspect B"), act(ActionKind::Inspect, "B"));
    }

    #[test]
    fn skill_attaches_target_and_skill() {
        assert_eq!(
            parse_command("/skill B Fireball"),
            PlayerCommand::Act(vec![
                (ActionKind::SkillTarget, "B".to_string()),
                (ActionKind::Skill, "Fireball".to_string()),
            ])
        );
    }

    #[test]
    fn bad_input_becomes_tip() {
        assert!(matches!(parse_command("/dance"), PlayerCommand::Tip(t) if t.contains("/dance")));
        assert!(matches!(parse_command("/goto"), PlayerCommand::Tip(_)));
        assert!(matches!(parse_command("/give B"), PlayerCommand::Tip(_)));
        assert!(matches!(parse_command(""), PlayerCommand::Tip(_)));
    }
}
