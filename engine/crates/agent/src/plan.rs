use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("reply is empty")]
    Empty,

    #[error("reply contains no JSON object")]
    NoObject,

    #[error("malformed plan: {0}")]
    Malformed(String),
}

/// An agent plan: action names mapped to argument lists.
///
/// Keys keep the order in which they first appeared; a key repeated inside
/// one object or across concatenated objects has its values appended with
/// duplicates removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanMap {
    entries: Vec<(String, Vec<String>)>,
}

impl PlanMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                for v in values {
                    if !existing.contains(&v) {
                        existing.push(v);
                    }
                }
            }
            None => {
                let mut deduped: Vec<String> = Vec::with_capacity(values.len());
                for v in values {
                    if !deduped.contains(&v) {
                        deduped.push(v);
                    }
                }
                self.entries.push((key, deduped));
            }
        }
    }

    fn merge(&mut self, other: PlanMap) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Values of `key` joined with a space; empty when absent.
    pub fn joined(&self, key: &str) -> String {
        self.get(key).map(|v| v.join(" ")).unwrap_or_default()
    }

    /// Case-insensitive check that any value of `key` equals `token`.
    pub fn has_token(&self, key: &str, token: &str) -> bool {
        self.get(key)
            .map(|vals| vals.iter().any(|v| v.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct PlanVisitor;

impl<'de> Visitor<'de> for PlanVisitor {
    type Value = PlanMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping action names to lists of strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PlanMap, A::Error> {
        let mut plan = PlanMap::new();
        while let Some((key, values)) = access.next_entry::<String, Vec<String>>()? {
            plan.insert(key, values);
        }
        Ok(plan)
    }
}

impl<'de> Deserialize<'de> for PlanMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PlanVisitor)
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse an agent reply into a [`PlanMap`].
///
/// Accepts a fenced reply, stray prose around the JSON, and several objects
/// written back to back (`{..}{..}`), which are merged.
pub fn parse_plan(reply: &str) -> Result<PlanMap, PlanError> {
    let body = strip_json_fence(reply);
    if body.is_empty() {
        return Err(PlanError::Empty);
    }
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(PlanError::NoObject);
    };
    if end < start {
        return Err(PlanError::NoObject);
    }

    let mut plan = PlanMap::new();
    let stream = serde_json::Deserializer::from_str(&body[start..=end]).into_iter::<PlanMap>();
    for fragment in stream {
        let fragment = fragment.map_err(|e| PlanError::Malformed(e.to_string()))?;
        plan.merge(fragment);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let plan = parse_plan(r#"{"SpeakAction":["@B>hi"],"GoToAction":["Y"]}"#).unwrap();
        assert_eq!(plan.keys().collect::<Vec<_>>(), vec!["SpeakAction", "GoToAction"]);
        assert_eq!(plan.first("GoToAction"), Some("Y"));
    }

    #[test]
    fn fenced_reply() {
        let reply = "```json\n{\"TagAction\":[\"yes\"]}\n```";
        assert!(parse_plan(reply).unwrap().has_token("TagAction", "YES"));
        assert_eq!(strip_json_fence("```{\"a\":[]}```"), "{\"a\":[]}");
    }

    #[test]
    fn duplicate_keys_and_fragments_merge() {
        let reply = r#"{"SpeakAction":["@B>hi"],"SpeakAction":["@C>yo","@B>hi"]} {"SpeakAction":["@D>hey"],"TagAction":["calm"]}"#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.get("SpeakAction").unwrap(),
            &["@B>hi".to_string(), "@C>yo".to_string(), "@D>hey".to_string()]
        );
    }

    #[test]
    fn prose_around_json_is_ignored() {
        let plan = parse_plan("Sure! {\"MindVoiceAction\":[\"hmm\"]} Hope that helps.").unwrap();
        assert_eq!(plan.joined("MindVoiceAction"), "hmm");
    }

    #[test]
    fn rejects_non_plans() {
        assert_eq!(parse_plan("not json"), Err(PlanError::NoObject));
        assert_eq!(parse_plan("   "), Err(PlanError::Empty));
        assert!(matches!(parse_plan(r#"{"SpeakAction":"hi"}"#), Err(PlanError::Malformed(_))));
        assert!(matches!(parse_plan(r#"{"SpeakAction":[1,2]}"#), Err(PlanError::Malformed(_))));
        assert!(matches!(parse_plan(r#"{"SpeakAction":["a"],}"#), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn empty_object_is_an_empty_plan() {
        assert!(parse_plan("{}").unwrap().is_empty());
    }
}
