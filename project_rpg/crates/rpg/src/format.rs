//! Value formats carried by action components.
//!
//! - speech: `@target>message`
//! - prop with target: `@target/prop=n` (the count is optional)
//! - prop alone: `prop=n` (the count is optional)

/// Parsed `@target>message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMessage {
    pub target: String,
    pub message: String,
}

pub fn make_target_message(target: &str, message: &str) -> String {
    format!("@{target}>{message}")
}

pub fn parse_target_message(value: &str) -> Option<TargetMessage> {
    let rest = value.trim().strip_prefix('@')?;
    let (target, message) = rest.split_once('>')?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some(TargetMessage {
        target: target.to_string(),
        message: message.trim().to_string(),
    })
}

/// Parsed `prop=n`. `count` is `None` when no count was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropCount {
    pub prop: String,
    pub count: Option<u32>,
}

pub fn parse_prop_count(value: &str) -> Option<PropCount> {
    let value = value.trim();
    let (prop, count) = match value.rsplit_once('=') {
        Some((prop, count)) => (prop.trim(), Some(count.trim().parse::<u32>().ok()?)),
        None => (value, None),
    };
    if prop.is_empty() {
        return None;
    }
    Some(PropCount {
        prop: prop.to_string(),
        count,
    })
}

pub fn make_prop_count(prop: &str, count: u32) -> String {
    format!("{prop}={count}")
}

/// Parsed `@target/prop=n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProp {
    pub target: String,
    pub prop: String,
    pub count: Option<u32>,
}

pub fn make_target_prop(target: &str, prop: &str, count: u32) -> String {
    format!("@{target}/{prop}={count}")
}

pub fn parse_target_prop(value: &str) -> Option<TargetProp> {
    let rest = value.trim().strip_prefix('@')?;
    let (target, prop) = rest.split_once('/')?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let PropCount { prop, count } = parse_prop_count(prop)?;
    Some(TargetProp {
        target: target.to_string(),
        prop,
        count,
    })
}
