//! Descriptions of which part a script means.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ordinal::Ordinal;
use super::part::{Owner, PartType};
use super::value::Point;

/// A reference to a part, resolved against a scope by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartSpecifier {
    /// `card button id 12`
    ById {
        /// Type filter; `None` matches any part.
        part_type: Option<PartType>,
        /// Layer filter.
        owner: Option<Owner>,
        /// Per-stack id.
        id: i64,
    },
    /// `bkgnd field "notes"`; names compare case-insensitively.
    ByName {
        /// Type filter.
        part_type: Option<PartType>,
        /// Layer filter.
        owner: Option<Owner>,
        /// Name to match.
        name: String,
    },
    /// `button 3`: 1-based position among the candidates.
    ByNumber {
        /// Type filter.
        part_type: Option<PartType>,
        /// Layer filter.
        owner: Option<Owner>,
        /// 1-based position.
        number: i64,
    },
    /// `last card`, `any button`.
    ByOrdinal {
        /// Type filter.
        part_type: Option<PartType>,
        /// Layer filter.
        owner: Option<Owner>,
        /// Position selector.
        ordinal: Ordinal,
    },
    /// The top-most part whose rect contains a point.
    ByPosition {
        /// Layer filter.
        owner: Option<Owner>,
        /// Point in card coordinates.
        position: Point,
    },
    /// The message box.
    MessageBox,
    /// The current card, background or stack.
    This(PartType),
    /// `part` looked up inside the container `of`.
    Composite {
        /// Inner specifier.
        part: Box<PartSpecifier>,
        /// Container specifier.
        of: Box<PartSpecifier>,
    },
}

impl PartSpecifier {
    /// Part of `part_type` with the given id.
    pub fn by_id(part_type: PartType, id: i64) -> Self {
        PartSpecifier::ById {
            part_type: Some(part_type),
            owner: None,
            id,
        }
    }

    /// Part of `part_type` with the given name.
    pub fn by_name(part_type: PartType, name: impl Into<String>) -> Self {
        PartSpecifier::ByName {
            part_type: Some(part_type),
            owner: None,
            name: name.into(),
        }
    }

    /// The `number`th part of `part_type`.
    pub fn by_number(part_type: PartType, number: i64) -> Self {
        PartSpecifier::ByNumber {
            part_type: Some(part_type),
            owner: None,
            number,
        }
    }

    /// Part of `part_type` chosen by an ordinal.
    pub fn by_ordinal(part_type: PartType, ordinal: Ordinal) -> Self {
        PartSpecifier::ByOrdinal {
            part_type: Some(part_type),
            owner: None,
            ordinal,
        }
    }

    /// Top-most part at `position`.
    pub fn at(position: Point) -> Self {
        PartSpecifier::ByPosition {
            owner: None,
            position,
        }
    }

    /// Restrict to parts owned by `layer`. No effect on composite, message box
    /// or `this` specifiers.
    pub fn on(mut self, layer: Owner) -> Self {
        match &mut self {
            PartSpecifier::ById { owner, .. }
            | PartSpecifier::ByName { owner, .. }
            | PartSpecifier::ByNumber { owner, .. }
            | PartSpecifier::ByOrdinal { owner, .. }
            | PartSpecifier::ByPosition { owner, .. } => *owner = Some(layer),
            _ => {}
        }
        self
    }

    /// Look this specifier up inside `container`.
    pub fn of(self, container: PartSpecifier) -> Self {
        PartSpecifier::Composite {
            part: Box::new(self),
            of: Box::new(container),
        }
    }

    /// Type filter, where the specifier has one.
    pub fn part_type(&self) -> Option<PartType> {
        match self {
            PartSpecifier::ById { part_type, .. }
            | PartSpecifier::ByName { part_type, .. }
            | PartSpecifier::ByNumber { part_type, .. }
            | PartSpecifier::ByOrdinal { part_type, .. } => *part_type,
            PartSpecifier::ByPosition { .. } => None,
            PartSpecifier::MessageBox => Some(PartType::MessageBox),
            PartSpecifier::This(part_type) => Some(*part_type),
            PartSpecifier::Composite { part, .. } => part.part_type(),
        }
    }

    /// Layer filter, where the specifier has one.
    pub fn owner(&self) -> Option<Owner> {
        match self {
            PartSpecifier::ById { owner, .. }
            | PartSpecifier::ByName { owner, .. }
            | PartSpecifier::ByNumber { owner, .. }
            | PartSpecifier::ByOrdinal { owner, .. }
            | PartSpecifier::ByPosition { owner, .. } => *owner,
            _ => None,
        }
    }
}

fn write_subject(
    f: &mut fmt::Formatter<'_>,
    part_type: Option<PartType>,
    owner: Option<Owner>,
) -> fmt::Result {
    match part_type {
        Some(part_type) => {
            if part_type.is_layered() {
                match owner {
                    Some(Owner::Card) => f.write_str("card ")?,
                    Some(Owner::Background) => f.write_str("bkgnd ")?,
                    _ => {}
                }
            }
            f.write_str(part_type.keyword())
        }
        None => match owner {
            Some(Owner::Card) => f.write_str("card part"),
            Some(Owner::Background) => f.write_str("bkgnd part"),
            _ => f.write_str("part"),
        },
    }
}

impl fmt::Display for PartSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartSpecifier::ById {
                part_type,
                owner,
                id,
            } => {
                write_subject(f, *part_type, *owner)?;
                write!(f, " id {}", id)
            }
            PartSpecifier::ByName {
                part_type,
                owner,
                name,
            } => {
                write_subject(f, *part_type, *owner)?;
                write!(f, " \"{}\"", name)
            }
            PartSpecifier::ByNumber {
                part_type,
                owner,
                number,
            } => {
                write_subject(f, *part_type, *owner)?;
                write!(f, " {}", number)
            }
            PartSpecifier::ByOrdinal {
                part_type,
                owner,
                ordinal,
            } => match ordinal {
                Ordinal::Number(number) => {
                    write_subject(f, *part_type, *owner)?;
                    write!(f, " {}", number)
                }
                symbolic => {
                    write!(f, "{} ", symbolic)?;
                    write_subject(f, *part_type, *owner)
                }
            },
            PartSpecifier::ByPosition { owner, position } => {
                write_subject(f, None, *owner)?;
                write!(f, " at {},{}", position.x, position.y)
            }
            PartSpecifier::MessageBox => f.write_str("msg"),
            PartSpecifier::This(part_type) => write!(f, "this {}", part_type.keyword()),
            PartSpecifier::Composite { part, of } => write!(f, "{} of {}", part, of),
        }
    }
}
