use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kinds of persisted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    Prop,
    ActorArchive,
    StageArchive,
    StatusProfile,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Prop => "prop",
            FileKind::ActorArchive => "actor_archive",
            FileKind::StageArchive => "stage_archive",
            FileKind::StatusProfile => "status_profile",
        }
    }

    /// Path of a blob relative to the runtime directory.
    pub fn relative_path(&self, owner: &str, name: &str) -> PathBuf {
        let base = PathBuf::from(owner);
        match self {
            FileKind::Prop => base.join("props").join(format!("{name}.json")),
            FileKind::ActorArchive => base.join("actors_archive").join(format!("{name}.json")),
            FileKind::StageArchive => base.join("stages_archive").join(format!("{name}.json")),
            FileKind::StatusProfile => base.join("status_profile.json"),
        }
    }
}

/// A blob stored in a [`crate::FileTable`], addressed by `(owner, name)`.
pub trait OwnedFile: Serialize + Clone {
    const KIND: FileKind;

    fn owner(&self) -> &str;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropType {
    Weapon,
    Clothes,
    Consumable,
    NonConsumable,
    Skill,
    SpecialComponent,
}

impl PropType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropType::Weapon => "Weapon",
            PropType::Clothes => "Clothes",
            PropType::Consumable => "Consumable",
            PropType::NonConsumable => "NonConsumable",
            PropType::Skill => "Skill",
            PropType::SpecialComponent => "SpecialComponent",
        }
    }
}

/// Static description of a prop, shared by every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropModel {
    pub name: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub prop_type: PropType,
    /// Indexed by the `ATTR_*` constants.
    #[serde(default)]
    pub attributes: Vec<i32>,
    #[serde(default)]
    pub appearance: String,
    /// Unique props move as a whole and go to the killer on death.
    #[serde(default)]
    pub unique: bool,
}

impl PropModel {
    pub const ATTR_MAX_HP: usize = 0;
    pub const ATTR_HP: usize = 1;
    pub const ATTR_DAMAGE: usize = 2;
    pub const ATTR_DEFENSE: usize = 3;
    pub const ATTR_HEAL: usize = 4;

    pub fn attribute(&self, index: usize) -> i32 {
        self.attributes.get(index).copied().unwrap_or(0)
    }

    pub fn damage(&self) -> i32 {
        self.attribute(Self::ATTR_DAMAGE)
    }

    pub fn defense(&self) -> i32 {
        self.attribute(Self::ATTR_DEFENSE)
    }

    pub fn heal(&self) -> i32 {
        self.attribute(Self::ATTR_HEAL)
    }
}

/// A prop instance held by an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropFile {
    pub owner: String,
    pub prop: PropModel,
    pub count: u32,
}

impl PropFile {
    pub fn new(owner: impl Into<String>, prop: PropModel, count: u32) -> Self {
        Self {
            owner: owner.into(),
            prop,
            count,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.prop.unique
    }

    pub fn prop_type(&self) -> PropType {
        self.prop.prop_type
    }
}

impl OwnedFile for PropFile {
    const KIND: FileKind = FileKind::Prop;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.prop.name
    }
}

/// "I (owner) know actor `name`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorArchiveFile {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub appearance: String,
}

impl OwnedFile for ActorArchiveFile {
    const KIND: FileKind = FileKind::ActorArchive;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// "I (owner) know stage `name`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArchiveFile {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub stage_narrate: String,
}

impl OwnedFile for StageArchiveFile {
    const KIND: FileKind = FileKind::StageArchive;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Per-actor status dump written every round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusProfile {
    pub name: String,
    pub stage: String,
    pub max_hp: i32,
    pub hp: i32,
    pub damage: i32,
    pub defense: i32,
    pub heal: i32,
    pub weapon: Option<String>,
    pub clothes: Option<String>,
    pub props: BTreeMap<String, u32>,
}

impl OwnedFile for StatusProfile {
    const KIND: FileKind = FileKind::StatusProfile;

    fn owner(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        "status_profile"
    }
}

/// Process-wide stage → actor names index.
pub type StageActorsMap = BTreeMap<String, Vec<String>>;
