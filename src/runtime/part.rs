//! Scriptable parts: buttons, fields, cards, backgrounds, stacks, the message
//! box and the application root.
//!
//! A [`PartModel`] pairs the part's fixed identity (type, owner layer, place in
//! the hierarchy) with its [`PropertyStore`] and script.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{ScriptError, ScriptResult};
use super::property::{Adjective, Getter, PropertyStore, Setter};
use super::specifier::PartSpecifier;
use super::value::{Rect, Value};
use crate::interpreter::Script;

/// Kind of part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    /// Button
    Button,
    /// Text field
    Field,
    /// Card
    Card,
    /// Background shared by cards
    Background,
    /// Stack
    Stack,
    /// The message box
    MessageBox,
    /// The application root
    Application,
}

impl PartType {
    /// Script keyword for the type.
    pub fn keyword(&self) -> &'static str {
        match self {
            PartType::Button => "button",
            PartType::Field => "field",
            PartType::Card => "card",
            PartType::Background => "bkgnd",
            PartType::Stack => "stack",
            PartType::MessageBox => "msg",
            PartType::Application => "stackrt",
        }
    }

    /// Parse a type keyword, including the usual abbreviations.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "button" | "btn" | "buttons" | "btns" => Some(PartType::Button),
            "field" | "fld" | "fields" | "flds" => Some(PartType::Field),
            "card" | "cd" | "cards" | "cds" => Some(PartType::Card),
            "background" | "bkgnd" | "bg" | "backgrounds" | "bkgnds" | "bgs" => {
                Some(PartType::Background)
            }
            "stack" | "stacks" => Some(PartType::Stack),
            "msg" | "message" => Some(PartType::MessageBox),
            _ => None,
        }
    }

    /// Buttons and fields: parts placed on a card or background layer.
    pub fn is_layered(&self) -> bool {
        matches!(self, PartType::Button | PartType::Field)
    }
}

/// Layer that owns a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// Placed on a single card.
    Card,
    /// Placed on a background and shown on each of its cards.
    Background,
    /// Owned by a stack (cards and backgrounds).
    Stack,
    /// Owned by the application (stacks, message box).
    Application,
}

impl Owner {
    fn prefix(&self) -> &'static str {
        match self {
            Owner::Card => "card ",
            Owner::Background => "bkgnd ",
            Owner::Stack | Owner::Application => "",
        }
    }
}

/// Runtime-wide identity of a part, unique across open stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartKey(pub Uuid);

impl PartKey {
    /// Create a new random key
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PartKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The containers a part lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lineage {
    /// Owning stack.
    pub stack: Option<PartKey>,
    /// Owning background (for cards and background-layer parts).
    pub background: Option<PartKey>,
    /// Owning card (for card-layer parts).
    pub card: Option<PartKey>,
}

/// Script text plus its compiled form, compiled on first dispatch.
#[derive(Debug, Default)]
pub struct ScriptSlot {
    /// Source text.
    pub text: String,
    /// Compiled script; cleared whenever the text changes.
    pub compiled: Option<Arc<Script>>,
}

/// What part lookup needs to know about a candidate.
pub trait Findable {
    /// Kind of part.
    fn part_type(&self) -> PartType;
    /// Owning layer.
    fn owner(&self) -> Owner;
    /// Per-stack id.
    fn part_id(&self) -> i64;
    /// Current name.
    fn part_name(&self) -> String;
    /// Bounds, for parts that have them.
    fn bounds(&self) -> Option<Rect>;
}

impl<T: Findable + ?Sized> Findable for Arc<T> {
    fn part_type(&self) -> PartType {
        (**self).part_type()
    }
    fn owner(&self) -> Owner {
        (**self).owner()
    }
    fn part_id(&self) -> i64 {
        (**self).part_id()
    }
    fn part_name(&self) -> String {
        (**self).part_name()
    }
    fn bounds(&self) -> Option<Rect> {
        (**self).bounds()
    }
}

/// Identity, properties and script of one part.
pub struct PartModel {
    key: PartKey,
    part_type: PartType,
    owner: Owner,
    id: i64,
    lineage: Lineage,
    properties: PropertyStore,
    script: Arc<RwLock<ScriptSlot>>,
}

impl PartModel {
    /// Create a part and define the properties its type carries.
    ///
    /// `context` is appended to the abbreviated forms to build the long name
    /// and long id (for example ` of card id 3`).
    pub fn new(
        part_type: PartType,
        owner: Owner,
        id: i64,
        name: &str,
        lineage: Lineage,
        context: &str,
    ) -> Self {
        let prefix = format!("{}{}", owner_prefix(part_type, owner), part_type.keyword());
        let label = format!("{} id {}", prefix, id);
        let part = Self {
            key: PartKey::new(),
            part_type,
            owner,
            id,
            lineage,
            properties: PropertyStore::new(label),
            script: Arc::new(RwLock::new(ScriptSlot::default())),
        };
        part.define_identity(&prefix, context, name);
        part.define_script();
        if part_type.is_layered() || matches!(part_type, PartType::Card | PartType::Background) {
            // Position within the container; kept current by the registry.
            part.properties.define("number", 0, true);
        }
        match part_type {
            PartType::Button => {
                part.define_geometry();
                part.properties.define("hilite", false, false);
            }
            PartType::Field => {
                part.define_geometry();
                part.properties.define("lockText", false, false);
                // `text` is a second spelling of the field's contents.
                part.properties
                    .alias("text", "contents")
                    .expect("define_geometry defines 'contents' before the alias");
            }
            PartType::Card => part.properties.define("marked", false, false),
            PartType::Stack => part.properties.define("cantModify", false, false),
            PartType::MessageBox => {
                part.properties.define("contents", Value::Empty, false);
                part.properties.define("visible", false, false);
            }
            PartType::Background | PartType::Application => {}
        }
        part
    }

    fn define_identity(&self, prefix: &str, context: &str, name: &str) {
        let store = &self.properties;
        store.define("id", self.id, true);
        store.define("name", name, false);

        let id = self.id;
        let abbreviated_name = {
            let prefix = prefix.to_string();
            move |store: &PropertyStore| -> ScriptResult<String> {
                let name = store.get("name")?.string_value();
                Ok(if name.is_empty() {
                    format!("{} id {}", prefix, id)
                } else {
                    format!("{} \"{}\"", prefix, name)
                })
            }
        };
        let long_name = {
            let abbreviated = abbreviated_name.clone();
            let context = context.to_string();
            move |store: &PropertyStore| -> ScriptResult<String> {
                Ok(format!("{}{}", abbreviated(store)?, context))
            }
        };

        store.define_computed("short name", Arc::new(|store: &PropertyStore| store.get("name")), None);
        store.define_computed(
            "abbreviated name",
            Arc::new(move |store: &PropertyStore| abbreviated_name(store).map(Value::Text)),
            None,
        );
        store.define_computed(
            "long name",
            Arc::new(move |store: &PropertyStore| long_name(store).map(Value::Text)),
            None,
        );
        store.define("abbreviated id", format!("{} id {}", prefix, id), true);
        store.define("long id", format!("{} id {}{}", prefix, id, context), true);

        store.define_adjectives("name", Adjective::Abbreviated, "short name", "abbreviated name", "long name");
        store.define_adjectives("id", Adjective::Short, "id", "abbreviated id", "long id");
    }

    fn define_script(&self) {
        let slot = self.script.clone();
        let getter: Getter = Arc::new(move |_: &PropertyStore| Ok(Value::Text(slot.read().text.clone())));
        let slot = self.script.clone();
        let setter: Setter = Arc::new(move |_: &PropertyStore, value: Value| {
            let mut slot = slot.write();
            slot.text = value.string_value();
            slot.compiled = None;
            Ok(())
        });
        self.properties.define_computed("script", getter, Some(setter));
    }

    fn define_geometry(&self) {
        let store = &self.properties;
        store.define("rect", Rect::new(0, 0, 0, 0), false);
        store.define("visible", true, false);
        store.define("contents", Value::Empty, false);

        // Moving edges keep the size; width and height resize from the top-left.
        define_rect_property(store, "left", |r| Some(r.left), |r, v| r.offset(v.checked_sub(r.left)?, 0));
        define_rect_property(store, "top", |r| Some(r.top), |r, v| r.offset(0, v.checked_sub(r.top)?));
        define_rect_property(store, "right", |r| Some(r.right), |r, v| r.offset(v.checked_sub(r.right)?, 0));
        define_rect_property(store, "bottom", |r| Some(r.bottom), |r, v| r.offset(0, v.checked_sub(r.bottom)?));
        define_rect_property(store, "width", Rect::width, |r, v| {
            Some(Rect::new(r.left, r.top, r.left.checked_add(v)?, r.bottom))
        });
        define_rect_property(store, "height", Rect::height, |r, v| {
            Some(Rect::new(r.left, r.top, r.right, r.top.checked_add(v)?))
        });
        store.define_computed(
            "loc",
            Arc::new(|store: &PropertyStore| {
                let rect = rect_of(store)?;
                rect.center().map(Value::Point).ok_or_else(|| out_of_range("loc", &rect))
            }),
            None,
        );
    }

    /// Runtime-wide key.
    pub fn key(&self) -> PartKey {
        self.key
    }

    /// Containers this part lives in.
    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    /// Property table.
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Record the part's position within its container.
    pub(crate) fn set_number(&self, number: usize) {
        if self.properties.contains("number") {
            self.properties
                .restore("number", number)
                .expect("'number' is always a stored property");
        }
    }

    /// Shared script slot.
    pub fn script_slot(&self) -> &Arc<RwLock<ScriptSlot>> {
        &self.script
    }

    /// Replace the script text.
    pub fn set_script(&self, text: impl Into<String>) {
        let mut slot = self.script.write();
        slot.text = text.into();
        slot.compiled = None;
    }

    /// Specifier that addresses exactly this part.
    pub fn specifier(&self) -> PartSpecifier {
        match self.part_type {
            PartType::MessageBox => PartSpecifier::MessageBox,
            part_type => PartSpecifier::by_id(part_type, self.id).on(self.owner),
        }
    }

    /// Abbreviated name, as scripts see `the name`.
    pub fn describe(&self) -> String {
        self.properties
            .get("abbreviated name")
            .map(|value| value.string_value())
            .unwrap_or_else(|_| self.properties.label().to_string())
    }
}

impl Findable for PartModel {
    fn part_type(&self) -> PartType {
        self.part_type
    }

    fn owner(&self) -> Owner {
        self.owner
    }

    fn part_id(&self) -> i64 {
        self.id
    }

    fn part_name(&self) -> String {
        self.properties
            .get("name")
            .map(|value| value.string_value())
            .unwrap_or_default()
    }

    fn bounds(&self) -> Option<Rect> {
        if !self.part_type.is_layered() {
            return None;
        }
        self.properties.get("rect").ok()?.as_rect()
    }
}

impl fmt::Debug for PartModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartModel")
            .field("key", &self.key)
            .field("type", &self.part_type)
            .field("owner", &self.owner)
            .field("id", &self.id)
            .finish()
    }
}

fn owner_prefix(part_type: PartType, owner: Owner) -> &'static str {
    if part_type.is_layered() {
        owner.prefix()
    } else {
        ""
    }
}

fn out_of_range(property: &str, rect: &Rect) -> ScriptError {
    ScriptError::semantic(format!(
        "{} of rectangle {} is out of range",
        property,
        Value::Rect(*rect)
    ))
}

fn rect_of(store: &PropertyStore) -> ScriptResult<Rect> {
    let value = store.get("rect")?;
    value.as_rect().ok_or_else(|| {
        ScriptError::semantic(format!("'{}' is not a rectangle", value))
    })
}

fn define_rect_property(
    store: &PropertyStore,
    name: &str,
    read: fn(&Rect) -> Option<i64>,
    write: fn(&Rect, i64) -> Option<Rect>,
) {
    let property = name.to_string();
    let setter_property = property.clone();
    store.define_computed(
        name,
        Arc::new(move |store: &PropertyStore| {
            let rect = rect_of(store)?;
            read(&rect)
                .map(Value::Integer)
                .ok_or_else(|| out_of_range(&property, &rect))
        }),
        Some(Arc::new(move |store: &PropertyStore, value: Value| {
            let amount = value.as_integer().ok_or_else(|| {
                ScriptError::semantic(format!(
                    "{} expects an integer, got '{}'",
                    setter_property, value
                ))
            })?;
            let rect = rect_of(store)?;
            let updated = write(&rect, amount).ok_or_else(|| out_of_range(&setter_property, &rect))?;
            store.set("rect", updated)
        })),
    );
}
