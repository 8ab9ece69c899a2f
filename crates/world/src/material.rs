//! Material descriptors and the grammar they are validated against.
//!
//! A material descriptor names a placeable block and, optionally, its state:
//!
//! ```text
//! descriptor := key [ "[" [ prop ( "," prop )* ] "]" ]
//! key        := [ namespace ":" ] path
//! prop       := name "=" value
//! ```
//!
//! A bare `path` uses the [`DEFAULT_NAMESPACE`]. Keys and property values are
//! checked against a [`MaterialRegistry`]; anything the registry does not know
//! is rejected with a [`MaterialParseError`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace assumed when a descriptor omits one.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Reasons a material descriptor fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterialParseError {
    #[error("material descriptor is empty")]
    Empty,
    #[error("invalid material key `{0}`")]
    InvalidKey(String),
    #[error("unknown material `{0}`")]
    UnknownMaterial(String),
    #[error("unterminated property list in `{0}`")]
    UnterminatedProperties(String),
    #[error("unexpected input `{rest}` after `{descriptor}`")]
    TrailingInput { descriptor: String, rest: String },
    #[error("malformed property `{0}`, expected name=value")]
    MalformedProperty(String),
    #[error("`{material}` has no property `{property}`")]
    UnknownProperty { material: String, property: String },
    #[error("`{value}` is not a valid value for `{material}[{property}]`")]
    InvalidValue {
        material: String,
        property: String,
        value: String,
    },
    #[error("property `{0}` given more than once")]
    DuplicateProperty(String),
}

/// A namespaced material key such as `minecraft:oak_planks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialKey {
    namespace: String,
    path: String,
}

impl MaterialKey {
    /// Parse `namespace:path` or bare `path`.
    pub fn parse(input: &str) -> Result<Self, MaterialParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MaterialParseError::Empty);
        }
        let (namespace, path) = match input.split_once(':') {
            Some((ns, p)) => (ns.trim(), p.trim()),
            None => (DEFAULT_NAMESPACE, input),
        };
        let namespace_ok = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.'));
        let path_ok = !path.is_empty()
            && path
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.' | '/'));
        if !namespace_ok || !path_ok {
            return Err(MaterialParseError::InvalidKey(input.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for the empty material (`air` and its cave/void variants).
    pub fn is_air(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
            && matches!(self.path.as_str(), "air" | "cave_air" | "void_air")
    }
}

impl fmt::Display for MaterialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// A validated material: key plus fully checked property assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Material {
    key: MaterialKey,
    properties: BTreeMap<String, String>,
}

impl Material {
    pub fn key(&self) -> &MaterialKey {
        &self.key
    }

    /// Property value, if the descriptor set one.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn is_air(&self) -> bool {
        self.key.is_air()
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if !self.properties.is_empty() {
            f.write_str("[")?;
            for (i, (name, value)) in self.properties.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{name}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Registry entry as authored in `materials.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDefinition {
    /// Material key, namespace optional.
    pub name: String,
    /// Allowed values per state property.
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
}

impl MaterialDefinition {
    /// Definition with no state properties.
    pub fn simple(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style helper adding one property and its allowed values.
    pub fn with_property(mut self, name: &str, values: &[&str]) -> Self {
        self.properties.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }
}

/// The set of materials (and their state properties) a world accepts.
#[derive(Debug, Clone, Default)]
pub struct MaterialRegistry {
    entries: BTreeMap<MaterialKey, BTreeMap<String, BTreeSet<String>>>,
}

impl MaterialRegistry {
    /// Build a registry; definitions with malformed keys are rejected.
    pub fn new(definitions: Vec<MaterialDefinition>) -> Result<Self, MaterialParseError> {
        let mut entries = BTreeMap::new();
        for def in definitions {
            let key = MaterialKey::parse(&def.name)?;
            let properties = def
                .properties
                .into_iter()
                .map(|(name, values)| (name, values.into_iter().collect()))
                .collect();
            entries.insert(key, properties);
        }
        Ok(Self { entries })
    }

    /// Load definitions from a JSON array of [`MaterialDefinition`].
    pub fn from_json_str(contents: &str) -> anyhow::Result<Self> {
        let defs: Vec<MaterialDefinition> = serde_json::from_str(contents)?;
        Ok(Self::new(defs)?)
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &MaterialKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Parse and validate a descriptor such as `oak_stairs[facing=north]`.
    pub fn parse(&self, descriptor: &str) -> Result<Material, MaterialParseError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(MaterialParseError::Empty);
        }

        let (key_part, props_part) = match descriptor.find('[') {
            Some(open) => {
                let close = descriptor
                    .rfind(']')
                    .filter(|close| *close > open)
                    .ok_or_else(|| {
                        MaterialParseError::UnterminatedProperties(descriptor.to_string())
                    })?;
                let rest = descriptor[close + 1..].trim();
                if !rest.is_empty() {
                    return Err(MaterialParseError::TrailingInput {
                        descriptor: descriptor[..=close].to_string(),
                        rest: rest.to_string(),
                    });
                }
                (&descriptor[..open], Some(&descriptor[open + 1..close]))
            }
            None => (descriptor, None),
        };

        let key = MaterialKey::parse(key_part)?;
        let allowed = self
            .entries
            .get(&key)
            .ok_or_else(|| MaterialParseError::UnknownMaterial(key.to_string()))?;

        let mut properties = BTreeMap::new();
        for prop in props_part
            .into_iter()
            .flat_map(|p| p.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let (name, value) = prop
                .split_once('=')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, v)| !n.is_empty() && !v.is_empty())
                .ok_or_else(|| MaterialParseError::MalformedProperty(prop.to_string()))?;

            let values = allowed
                .get(name)
                .ok_or_else(|| MaterialParseError::UnknownProperty {
                    material: key.to_string(),
                    property: name.to_string(),
                })?;
            if !values.contains(value) {
                return Err(MaterialParseError::InvalidValue {
                    material: key.to_string(),
                    property: name.to_string(),
                    value: value.to_string(),
                });
            }
            if properties
                .insert(name.to_string(), value.to_string())
                .is_some()
            {
                return Err(MaterialParseError::DuplicateProperty(name.to_string()));
            }
        }

        Ok(Material { key, properties })
    }

    /// Built-in registry covering the common building materials.
    pub fn builtin() -> Self {
        const BOOL: &[&str] = &["true", "false"];
        const HORIZONTAL: &[&str] = &["north", "south", "east", "west"];
        const AXIS: &[&str] = &["x", "y", "z"];

        let mut defs: Vec<MaterialDefinition> = [
            "air",
            "stone",
            "cobblestone",
            "mossy_cobblestone",
            "stone_bricks",
            "bricks",
            "dirt",
            "sand",
            "sandstone",
            "gravel",
            "clay",
            "terracotta",
            "glass",
            "glowstone",
            "bookshelf",
            "oak_planks",
            "spruce_planks",
            "birch_planks",
            "dark_oak_planks",
            "white_wool",
            "red_wool",
            "white_concrete",
            "gray_concrete",
            "iron_block",
            "gold_block",
            "torch",
            "crafting_table",
        ]
        .into_iter()
        .map(MaterialDefinition::simple)
        .collect();

        for log in ["oak_log", "spruce_log", "birch_log", "dark_oak_log"] {
            defs.push(MaterialDefinition::simple(log).with_property("axis", AXIS));
        }
        for stairs in [
            "oak_stairs",
            "spruce_stairs",
            "stone_brick_stairs",
            "cobblestone_stairs",
            "brick_stairs",
        ] {
            defs.push(
                MaterialDefinition::simple(stairs)
                    .with_property("facing", HORIZONTAL)
                    .with_property("half", &["top", "bottom"])
                    .with_property(
                        "shape",
                        &[
                            "straight",
                            "inner_left",
                            "inner_right",
                            "outer_left",
                            "outer_right",
                        ],
                    )
                    .with_property("waterlogged", BOOL),
            );
        }
        for slab in ["oak_slab", "spruce_slab", "stone_brick_slab", "cobblestone_slab"] {
            defs.push(
                MaterialDefinition::simple(slab)
                    .with_property("type", &["top", "bottom", "double"])
                    .with_property("waterlogged", BOOL),
            );
        }
        for door in ["oak_door", "spruce_door"] {
            defs.push(
                MaterialDefinition::simple(door)
                    .with_property("facing", HORIZONTAL)
                    .with_property("half", &["upper", "lower"])
                    .with_property("hinge", &["left", "right"])
                    .with_property("open", BOOL)
                    .with_property("powered", BOOL),
            );
        }
        for connected in ["glass_pane", "oak_fence", "spruce_fence", "iron_bars"] {
            defs.push(
                MaterialDefinition::simple(connected)
                    .with_property("north", BOOL)
                    .with_property("south", BOOL)
                    .with_property("east", BOOL)
                    .with_property("west", BOOL)
                    .with_property("waterlogged", BOOL),
            );
        }
        for leaves in ["oak_leaves", "spruce_leaves", "birch_leaves"] {
            defs.push(
                MaterialDefinition::simple(leaves)
                    .with_property("distance", &["1", "2", "3", "4", "5", "6", "7"])
                    .with_property("persistent", BOOL)
                    .with_property("waterlogged", BOOL),
            );
        }
        defs.push(MaterialDefinition::simple("grass_block").with_property("snowy", BOOL));
        defs.push(MaterialDefinition::simple("wall_torch").with_property("facing", HORIZONTAL));
        defs.push(MaterialDefinition::simple("lantern").with_property("hanging", BOOL));
        defs.push(
            MaterialDefinition::simple("water").with_property(
                "level",
                &[
                    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13",
                    "14", "15",
                ],
            ),
        );

        Self::new(defs).unwrap_or_default()
    }
}
