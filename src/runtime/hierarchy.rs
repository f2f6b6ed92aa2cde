//! The containment tree of open stacks and the message-passing order.
//!
//! Every part lives in [`PartRegistry::parts`] keyed by [`PartKey`]; the
//! ordered relations (cards of a stack, parts of a card or background in
//! z-order) are kept as key lists beside it.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::{ScriptError, ScriptResult};
use super::finder::PartFinder;
use super::ordinal::OrdinalSource;
use super::property::Adjective;
use super::part::{Findable, Lineage, Owner, PartKey, PartModel, PartType};
use super::specifier::PartSpecifier;

/// Containers that unqualified part references resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    /// Stack in scope.
    pub stack: PartKey,
    /// Background in scope.
    pub background: Option<PartKey>,
    /// Card in scope; `None` when the scope is a background alone.
    pub card: Option<PartKey>,
}

#[derive(Debug)]
struct StackLayout {
    backgrounds: Vec<PartKey>,
    cards: Vec<PartKey>,
    current_card: PartKey,
    next_id: i64,
}

impl StackLayout {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// All parts of the running application.
pub struct PartRegistry {
    parts: HashMap<PartKey, Arc<PartModel>>,
    layouts: HashMap<PartKey, StackLayout>,
    /// Buttons and fields of each card or background, bottom first.
    children: HashMap<PartKey, Vec<PartKey>>,
    stacks: Vec<PartKey>,
    current_stack: Option<PartKey>,
    application: PartKey,
    message_box: PartKey,
    next_stack_id: i64,
}

impl Default for PartRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartRegistry {
    /// Registry holding only the application and the message box.
    pub fn new() -> Self {
        let application = PartModel::new(
            PartType::Application,
            Owner::Application,
            0,
            "Stackrt",
            Lineage::default(),
            "",
        );
        application.properties().define("version", crate::VERSION, true);
        let message_box = PartModel::new(
            PartType::MessageBox,
            Owner::Application,
            0,
            "Message",
            Lineage::default(),
            "",
        );
        let mut registry = Self {
            parts: HashMap::new(),
            layouts: HashMap::new(),
            children: HashMap::new(),
            stacks: Vec::new(),
            current_stack: None,
            application: application.key(),
            message_box: message_box.key(),
            next_stack_id: 1,
        };
        registry.insert(application);
        registry.insert(message_box);
        registry
    }

    fn insert(&mut self, part: PartModel) -> PartKey {
        let key = part.key();
        self.parts.insert(key, Arc::new(part));
        key
    }

    /// The application root.
    pub fn application(&self) -> &Arc<PartModel> {
        &self.parts[&self.application]
    }

    /// The message box.
    pub fn message_box(&self) -> &Arc<PartModel> {
        &self.parts[&self.message_box]
    }

    /// Part by key, if it still exists.
    pub fn part(&self, key: PartKey) -> Option<&Arc<PartModel>> {
        self.parts.get(&key)
    }

    /// Part by key, failing when it has been removed.
    pub fn get(&self, key: PartKey) -> ScriptResult<&Arc<PartModel>> {
        self.parts
            .get(&key)
            .ok_or_else(|| ScriptError::PartNotFound(format!("part {}", key)))
    }

    fn layout(&self, stack: PartKey) -> ScriptResult<&StackLayout> {
        self.layouts
            .get(&stack)
            .ok_or_else(|| ScriptError::PartNotFound(format!("stack {}", stack)))
    }

    fn layout_mut(&mut self, stack: PartKey) -> ScriptResult<&mut StackLayout> {
        self.layouts
            .get_mut(&stack)
            .ok_or_else(|| ScriptError::PartNotFound(format!("stack {}", stack)))
    }

    fn expect_type(&self, key: PartKey, part_type: PartType) -> ScriptResult<&Arc<PartModel>> {
        let part = self.get(key)?;
        if part.part_type() != part_type {
            return Err(ScriptError::semantic(format!(
                "{} is not a {}",
                part.describe(),
                part_type.keyword()
            )));
        }
        Ok(part)
    }

    /// Open a new stack with one background and one card. The first stack
    /// opened becomes current.
    pub fn add_stack(&mut self, name: &str) -> PartKey {
        let id = self.next_stack_id;
        self.next_stack_id += 1;
        let stack = PartModel::new(
            PartType::Stack,
            Owner::Application,
            id,
            name,
            Lineage::default(),
            "",
        );
        let stack_key = self.insert(stack);
        let stack_context = format!(" of stack \"{}\"", name);

        let mut layout = StackLayout {
            backgrounds: Vec::new(),
            cards: Vec::new(),
            current_card: stack_key,
            next_id: 1,
        };
        let background = PartModel::new(
            PartType::Background,
            Owner::Stack,
            layout.allocate_id(),
            "",
            Lineage {
                stack: Some(stack_key),
                ..Lineage::default()
            },
            &stack_context,
        );
        let background_key = background.key();
        let card = PartModel::new(
            PartType::Card,
            Owner::Stack,
            layout.allocate_id(),
            "",
            Lineage {
                stack: Some(stack_key),
                background: Some(background_key),
                card: None,
            },
            &stack_context,
        );
        let card_key = card.key();
        layout.backgrounds.push(background_key);
        layout.cards.push(card_key);
        layout.current_card = card_key;
        self.insert(background);
        self.insert(card);
        self.layouts.insert(stack_key, layout);
        self.stacks.push(stack_key);
        if self.current_stack.is_none() {
            self.current_stack = Some(stack_key);
        }
        self.renumber(stack_key);
        tracing::debug!("opened stack \"{}\" ({})", name, stack_key);
        stack_key
    }

    /// Add an empty background to `stack`.
    pub fn add_background(&mut self, stack: PartKey, name: &str) -> ScriptResult<PartKey> {
        let context = self.stack_context(stack)?;
        let layout = self.layout_mut(stack)?;
        let background = PartModel::new(
            PartType::Background,
            Owner::Stack,
            layout.allocate_id(),
            name,
            Lineage {
                stack: Some(stack),
                ..Lineage::default()
            },
            &context,
        );
        let key = background.key();
        layout.backgrounds.push(key);
        self.insert(background);
        self.renumber(stack);
        Ok(key)
    }

    /// Append a card using `background` to the end of `stack`.
    pub fn add_card(&mut self, stack: PartKey, background: PartKey, name: &str) -> ScriptResult<PartKey> {
        let bg = self.expect_type(background, PartType::Background)?;
        if bg.lineage().stack != Some(stack) {
            return Err(ScriptError::semantic(format!(
                "{} does not belong to this stack",
                bg.describe()
            )));
        }
        let context = self.stack_context(stack)?;
        let layout = self.layout_mut(stack)?;
        let card = PartModel::new(
            PartType::Card,
            Owner::Stack,
            layout.allocate_id(),
            name,
            Lineage {
                stack: Some(stack),
                background: Some(background),
                card: None,
            },
            &context,
        );
        let key = card.key();
        layout.cards.push(key);
        self.insert(card);
        self.renumber(stack);
        Ok(key)
    }

    /// Place a new button or field on top of `host` (a card or background).
    pub fn add_part(&mut self, host: PartKey, part_type: PartType, name: &str) -> ScriptResult<PartKey> {
        if !part_type.is_layered() {
            return Err(ScriptError::semantic(format!(
                "only buttons and fields can be placed on a card, not a {}",
                part_type.keyword()
            )));
        }
        let host_part = self.get(host)?.clone();
        let (owner, lineage) = match host_part.part_type() {
            PartType::Card => (
                Owner::Card,
                Lineage {
                    card: Some(host),
                    ..host_part.lineage()
                },
            ),
            PartType::Background => (
                Owner::Background,
                Lineage {
                    background: Some(host),
                    ..host_part.lineage()
                },
            ),
            _ => {
                return Err(ScriptError::semantic(format!(
                    "{} cannot hold buttons or fields",
                    host_part.describe()
                )));
            }
        };
        let stack = lineage
            .stack
            .ok_or_else(|| ScriptError::semantic("part host is not in a stack"))?;
        let host_id = host_part
            .properties()
            .get_with_adjective("id", Some(Adjective::Long))?;
        let context = format!(" of {}", host_id);
        let id = self.layout_mut(stack)?.allocate_id();
        let part = PartModel::new(part_type, owner, id, name, lineage, &context);
        let key = self.insert(part);
        self.children.entry(host).or_default().push(key);
        self.renumber_children(host);
        Ok(key)
    }

    /// Delete a part. The last card of a stack and backgrounds still used by a
    /// card cannot be removed; removing a stack closes it.
    pub fn remove_part(&mut self, key: PartKey) -> ScriptResult<()> {
        let part = self.get(key)?.clone();
        let lineage = part.lineage();
        match part.part_type() {
            PartType::Button | PartType::Field => {
                let host = match part.owner() {
                    Owner::Background => lineage.background,
                    _ => lineage.card,
                };
                if let Some(host) = host {
                    if let Some(children) = self.children.get_mut(&host) {
                        children.retain(|child| *child != key);
                    }
                    self.renumber_children(host);
                }
                self.parts.remove(&key);
            }
            PartType::Card => {
                let stack = lineage
                    .stack
                    .ok_or_else(|| ScriptError::semantic("card is not in a stack"))?;
                let layout = self.layout_mut(stack)?;
                if layout.cards.len() <= 1 {
                    return Err(ScriptError::semantic("can't delete the last card of a stack"));
                }
                let index = layout.cards.iter().position(|card| *card == key).unwrap_or(0);
                layout.cards.retain(|card| *card != key);
                if layout.current_card == key {
                    layout.current_card = layout.cards[index.min(layout.cards.len() - 1)];
                }
                self.drop_children(key);
                self.parts.remove(&key);
                self.renumber(stack);
            }
            PartType::Background => {
                let stack = lineage
                    .stack
                    .ok_or_else(|| ScriptError::semantic("background is not in a stack"))?;
                let in_use = self.layout(stack)?.cards.iter().any(|card| {
                    self.parts
                        .get(card)
                        .is_some_and(|card| card.lineage().background == Some(key))
                });
                if in_use {
                    return Err(ScriptError::semantic(format!(
                        "{} is still used by a card",
                        part.describe()
                    )));
                }
                self.layout_mut(stack)?.backgrounds.retain(|bg| *bg != key);
                self.drop_children(key);
                self.parts.remove(&key);
                self.renumber(stack);
            }
            PartType::Stack => {
                if let Some(layout) = self.layouts.remove(&key) {
                    for host in layout.cards.iter().chain(layout.backgrounds.iter()) {
                        self.drop_children(*host);
                        self.parts.remove(host);
                    }
                }
                self.stacks.retain(|stack| *stack != key);
                if self.current_stack == Some(key) {
                    self.current_stack = self.stacks.first().copied();
                }
                self.parts.remove(&key);
                tracing::debug!("closed stack {}", key);
            }
            PartType::MessageBox | PartType::Application => {
                return Err(ScriptError::semantic(format!(
                    "can't delete {}",
                    part.describe()
                )));
            }
        }
        Ok(())
    }

    fn drop_children(&mut self, host: PartKey) {
        if let Some(children) = self.children.remove(&host) {
            for child in children {
                self.parts.remove(&child);
            }
        }
    }

    fn stack_context(&self, stack: PartKey) -> ScriptResult<String> {
        let stack = self.expect_type(stack, PartType::Stack)?;
        Ok(format!(" of stack \"{}\"", stack.part_name()))
    }

    fn renumber(&self, stack: PartKey) {
        if let Some(layout) = self.layouts.get(&stack) {
            for keys in [&layout.cards, &layout.backgrounds] {
                for (index, key) in keys.iter().enumerate() {
                    if let Some(part) = self.parts.get(key) {
                        part.set_number(index + 1);
                    }
                }
            }
        }
    }

    fn renumber_children(&self, host: PartKey) {
        let Some(children) = self.children.get(&host) else {
            return;
        };
        for part_type in [PartType::Button, PartType::Field] {
            let mut number = 0usize;
            for key in children {
                if let Some(part) = self.parts.get(key).filter(|part| part.part_type() == part_type) {
                    number += 1;
                    part.set_number(number);
                }
            }
        }
    }

    /// Make `card` the current card of its stack, and its stack current.
    pub fn go_to_card(&mut self, card: PartKey) -> ScriptResult<()> {
        let stack = self
            .expect_type(card, PartType::Card)?
            .lineage()
            .stack
            .ok_or_else(|| ScriptError::semantic("card is not in a stack"))?;
        self.layout_mut(stack)?.current_card = card;
        self.current_stack = Some(stack);
        Ok(())
    }

    /// Make `stack` the current stack.
    pub fn set_current_stack(&mut self, stack: PartKey) -> ScriptResult<()> {
        self.expect_type(stack, PartType::Stack)?;
        self.current_stack = Some(stack);
        Ok(())
    }

    /// Open stacks, in the order they were opened.
    pub fn stacks(&self) -> &[PartKey] {
        &self.stacks
    }

    /// Cards of `stack`, in order.
    pub fn cards(&self, stack: PartKey) -> ScriptResult<&[PartKey]> {
        Ok(&self.layout(stack)?.cards)
    }

    /// Backgrounds of `stack`, in order.
    pub fn backgrounds(&self, stack: PartKey) -> ScriptResult<&[PartKey]> {
        Ok(&self.layout(stack)?.backgrounds)
    }

    /// Buttons and fields placed on `host`, bottom first.
    pub fn children(&self, host: PartKey) -> &[PartKey] {
        self.children.get(&host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Current card of `stack`.
    pub fn current_card(&self, stack: PartKey) -> ScriptResult<PartKey> {
        Ok(self.layout(stack)?.current_card)
    }

    /// Scope of the current card of the current stack.
    pub fn current_scope(&self) -> ScriptResult<Scope> {
        let stack = self
            .current_stack
            .ok_or_else(|| ScriptError::PartNotFound("this stack".into()))?;
        self.stack_scope(stack)
    }

    fn stack_scope(&self, stack: PartKey) -> ScriptResult<Scope> {
        let card = self.current_card(stack)?;
        Ok(Scope {
            stack,
            background: self.get(card)?.lineage().background,
            card: Some(card),
        })
    }

    /// Scope seen from inside `key`: a card or background scopes to itself, a
    /// stack to its current card, a button or field to its host.
    pub fn scope_of(&self, key: PartKey) -> ScriptResult<Scope> {
        let part = self.get(key)?;
        let lineage = part.lineage();
        match part.part_type() {
            PartType::Stack => self.stack_scope(key),
            PartType::Card => Ok(Scope {
                stack: lineage.stack.ok_or_else(|| ScriptError::semantic("card is not in a stack"))?,
                background: lineage.background,
                card: Some(key),
            }),
            PartType::Background => Ok(Scope {
                stack: lineage
                    .stack
                    .ok_or_else(|| ScriptError::semantic("background is not in a stack"))?,
                background: Some(key),
                card: None,
            }),
            PartType::Button | PartType::Field => {
                let stack = lineage
                    .stack
                    .ok_or_else(|| ScriptError::semantic("part is not in a stack"))?;
                match lineage.card {
                    Some(card) => self.scope_of(card),
                    None => Ok(Scope {
                        stack,
                        background: lineage.background,
                        // A background part sees the card currently showing it.
                        card: self
                            .current_card(stack)
                            .ok()
                            .filter(|card| {
                                self.parts
                                    .get(card)
                                    .is_some_and(|card| card.lineage().background == lineage.background)
                            }),
                    }),
                }
            }
            PartType::MessageBox | PartType::Application => self.current_scope(),
        }
    }

    /// Candidate parts for a simple specifier, bottom first.
    fn candidates(&self, scope: &Scope, spec: &PartSpecifier) -> ScriptResult<Vec<Arc<PartModel>>> {
        let mut keys: Vec<PartKey> = Vec::new();
        let wants = |part_type: PartType| spec.part_type().is_none_or(|ty| ty == part_type);
        let layered = matches!(spec, PartSpecifier::ByPosition { .. })
            || spec.part_type().is_none_or(|ty| ty.is_layered());
        if layered {
            if let Some(background) = scope.background {
                keys.extend(self.children(background));
            }
            if let Some(card) = scope.card {
                keys.extend(self.children(card));
            }
        }
        if !matches!(spec, PartSpecifier::ByPosition { .. }) {
            if wants(PartType::Card) {
                let cards = self.cards(scope.stack)?;
                match (scope.card, scope.background) {
                    // Cards of a background alone: `card 2 of bkgnd 1`.
                    (None, Some(background)) => keys.extend(cards.iter().filter(|card| {
                        self.parts
                            .get(*card)
                            .is_some_and(|card| card.lineage().background == Some(background))
                    })),
                    _ => keys.extend(cards),
                }
            }
            if wants(PartType::Background) {
                keys.extend(self.backgrounds(scope.stack)?);
            }
            if spec.part_type() == Some(PartType::Stack) {
                keys.extend(&self.stacks);
            }
        }
        Ok(keys
            .into_iter()
            .filter_map(|key| self.parts.get(&key).cloned())
            .collect())
    }

    /// Resolve `spec` against `scope`.
    pub fn resolve(
        &self,
        scope: &Scope,
        spec: &PartSpecifier,
        source: &mut dyn OrdinalSource,
    ) -> ScriptResult<Arc<PartModel>> {
        match spec {
            PartSpecifier::MessageBox => Ok(self.message_box().clone()),
            PartSpecifier::This(part_type) => {
                let key = match part_type {
                    PartType::Card => scope.card,
                    PartType::Background => scope.background,
                    PartType::Stack => Some(scope.stack),
                    _ => None,
                };
                key.and_then(|key| self.parts.get(&key).cloned())
                    .ok_or_else(|| ScriptError::PartNotFound(spec.to_string()))
            }
            PartSpecifier::Composite { part, of } => {
                let container = self.resolve(scope, of, source)?;
                let inner = match container.part_type() {
                    PartType::Stack | PartType::Card | PartType::Background => {
                        self.scope_of(container.key())?
                    }
                    _ => {
                        return Err(ScriptError::semantic(format!(
                            "{} does not contain parts",
                            container.describe()
                        )));
                    }
                };
                self.resolve(&inner, part, source)
            }
            _ if spec.part_type() == Some(PartType::Application) => Ok(self.application().clone()),
            _ => {
                let candidates = self.candidates(scope, spec)?;
                PartFinder::new(source).find(spec, &candidates).cloned()
            }
        }
    }

    /// The part that receives a message when `key` does not handle it.
    pub fn next_recipient(&self, key: PartKey) -> Option<PartKey> {
        let part = self.parts.get(&key)?;
        let lineage = part.lineage();
        match part.part_type() {
            PartType::Button | PartType::Field => match part.owner() {
                Owner::Background => lineage.background,
                _ => lineage.card,
            },
            PartType::Card => lineage.background,
            PartType::Background => lineage.stack,
            PartType::Stack => Some(self.application),
            PartType::MessageBox => self
                .current_scope()
                .ok()
                .and_then(|scope| scope.card)
                .or(Some(self.application)),
            PartType::Application => None,
        }
    }
}

impl std::fmt::Debug for PartRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartRegistry")
            .field("parts", &self.parts.len())
            .field("stacks", &self.stacks)
            .field("current_stack", &self.current_stack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ordinal::{FixedSource, Ordinal};
    use crate::runtime::value::{Point, Rect, Value};

    struct Fixture {
        registry: PartRegistry,
        stack: PartKey,
        background: PartKey,
        card: PartKey,
        next: PartKey,
        ok: PartKey,
    }

    fn fixture() -> Fixture {
        let mut registry = PartRegistry::new();
        let stack = registry.add_stack("Home");
        let background = registry.backgrounds(stack).unwrap()[0];
        let card = registry.cards(stack).unwrap()[0];
        let next = registry.add_part(background, PartType::Button, "Next").unwrap();
        let ok = registry.add_part(card, PartType::Button, "OK").unwrap();
        Fixture {
            registry,
            stack,
            background,
            card,
            next,
            ok,
        }
    }

    fn resolve(fx: &Fixture, spec: &PartSpecifier) -> ScriptResult<PartKey> {
        let scope = fx.registry.current_scope()?;
        fx.registry
            .resolve(&scope, spec, &mut FixedSource(0))
            .map(|part| part.key())
    }

    #[test]
    fn background_parts_come_before_card_parts() {
        let fx = fixture();
        assert_eq!(resolve(&fx, &PartSpecifier::by_number(PartType::Button, 1)).unwrap(), fx.next);
        assert_eq!(resolve(&fx, &PartSpecifier::by_number(PartType::Button, 2)).unwrap(), fx.ok);
        let card_first = PartSpecifier::by_number(PartType::Button, 1).on(Owner::Card);
        assert_eq!(resolve(&fx, &card_first).unwrap(), fx.ok);
        assert_eq!(
            resolve(&fx, &PartSpecifier::This(PartType::Background)).unwrap(),
            fx.background
        );
        assert!(resolve(&fx, &PartSpecifier::by_number(PartType::Button, 3)).is_err());
    }

    #[test]
    fn message_path_ends_at_the_application() {
        let fx = fixture();
        let path = |start| {
            let mut path = vec![start];
            let mut current = start;
            while let Some(next) = fx.registry.next_recipient(current) {
                path.push(next);
                current = next;
            }
            path
        };
        let app = fx.registry.application().key();
        assert_eq!(path(fx.ok), vec![fx.ok, fx.card, fx.background, fx.stack, app]);
        assert_eq!(path(fx.next), vec![fx.next, fx.background, fx.stack, app]);
        assert_eq!(
            path(fx.registry.message_box().key()),
            vec![fx.registry.message_box().key(), fx.card, fx.background, fx.stack, app]
        );
    }

    #[test]
    fn composite_lookup_scopes_to_the_container() {
        let mut fx = fixture();
        let second = fx.registry.add_card(fx.stack, fx.background, "second").unwrap();
        let help = fx.registry.add_part(second, PartType::Button, "Help").unwrap();

        let spec = PartSpecifier::by_name(PartType::Button, "help")
            .of(PartSpecifier::by_ordinal(PartType::Card, Ordinal::Last));
        assert_eq!(resolve(&fx, &spec).unwrap(), help);
        // Not visible from the current card.
        assert!(resolve(&fx, &PartSpecifier::by_name(PartType::Button, "Help")).is_err());

        let card = fx.registry.get(second).unwrap();
        assert_eq!(card.properties().get("number").unwrap(), Value::Integer(2));
        assert_eq!(card.describe(), "card \"second\"");
    }

    #[test]
    fn position_lookup_uses_rects() {
        let fx = fixture();
        let ok = fx.registry.get(fx.ok).unwrap();
        ok.properties().set("rect", Rect::new(10, 10, 20, 20)).unwrap();
        let next = fx.registry.get(fx.next).unwrap();
        next.properties().set("rect", Rect::new(0, 0, 100, 100)).unwrap();
        assert_eq!(resolve(&fx, &PartSpecifier::at(Point::new(15, 15))).unwrap(), fx.ok);
        assert_eq!(resolve(&fx, &PartSpecifier::at(Point::new(50, 50))).unwrap(), fx.next);
    }

    #[test]
    fn removal_rules() {
        let mut fx = fixture();
        let err = fx.registry.remove_part(fx.card).unwrap_err();
        assert!(err.to_string().contains("last card"));
        assert!(fx.registry.remove_part(fx.background).is_err());

        let second = fx.registry.add_card(fx.stack, fx.background, "").unwrap();
        fx.registry.remove_part(fx.card).unwrap();
        assert!(fx.registry.part(fx.ok).is_none());
        assert_eq!(fx.registry.current_card(fx.stack).unwrap(), second);

        fx.registry.remove_part(fx.stack).unwrap();
        assert!(fx.registry.current_scope().is_err());
        assert!(fx.registry.remove_part(fx.registry.application().key()).is_err());
    }

    #[test]
    fn long_names_include_the_container() {
        let fx = fixture();
        let ok = fx.registry.get(fx.ok).unwrap();
        let long = ok
            .properties()
            .get_with_adjective("name", Some(crate::runtime::property::Adjective::Long))
            .unwrap();
        assert_eq!(long.string_value(), "card button \"OK\" of card id 2 of stack \"Home\"");
    }
}
