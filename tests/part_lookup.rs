//! Part hierarchy and lookup tests
//!
//! Covers specifier resolution against a populated stack, the
//! next-recipient chain, and structural edits.

use stackrt::runtime::error::ScriptError;
use stackrt::runtime::hierarchy::{PartRegistry, Scope};
use stackrt::runtime::ordinal::{FixedSource, Ordinal};
use stackrt::runtime::part::{Findable, Owner, PartKey, PartType};
use stackrt::runtime::value::{Point, Rect, Value};
use stackrt::PartSpecifier;

struct Layout {
    registry: PartRegistry,
    stack: PartKey,
    background: PartKey,
    cards: Vec<PartKey>,
    card_buttons: Vec<PartKey>,
    bg_field: PartKey,
}

/// Stack with three cards on one background, a background field and two
/// overlapping buttons on the first card.
fn layout() -> Layout {
    let mut registry = PartRegistry::new();
    let stack = registry.add_stack("Address Book");
    let first = registry.cards(stack).unwrap()[0];
    let background = registry.backgrounds(stack).unwrap()[0];
    let second = registry.add_card(stack, background, "Bob").unwrap();
    let third = registry.add_card(stack, background, "Carol").unwrap();
    registry
        .get(first)
        .unwrap()
        .properties()
        .set("name", "Alice")
        .unwrap();

    let bg_field = registry.add_part(background, PartType::Field, "Phone").unwrap();
    let lower = registry.add_part(first, PartType::Button, "Lower").unwrap();
    let upper = registry.add_part(first, PartType::Button, "Upper").unwrap();
    registry
        .get(lower)
        .unwrap()
        .properties()
        .set("rect", Rect::new(0, 0, 100, 100))
        .unwrap();
    registry
        .get(upper)
        .unwrap()
        .properties()
        .set("rect", Rect::new(50, 50, 150, 150))
        .unwrap();

    Layout {
        registry,
        stack,
        background,
        cards: vec![first, second, third],
        card_buttons: vec![lower, upper],
        bg_field,
    }
}

fn resolve(layout: &Layout, spec: &PartSpecifier) -> Result<PartKey, ScriptError> {
    let scope = layout.registry.current_scope()?;
    layout
        .registry
        .resolve(&scope, spec, &mut FixedSource(1))
        .map(|part| part.key())
}

#[test]
fn cards_resolve_by_number_name_and_ordinal() {
    let layout = layout();
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_number(PartType::Card, 2)),
        Ok(layout.cards[1])
    );
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_name(PartType::Card, "carol")),
        Ok(layout.cards[2])
    );
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_ordinal(PartType::Card, Ordinal::Last)),
        Ok(layout.cards[2])
    );
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_ordinal(PartType::Card, Ordinal::Middle)),
        Ok(layout.cards[1])
    );
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_ordinal(PartType::Card, Ordinal::Any)),
        Ok(layout.cards[1])
    );
}

#[test]
fn out_of_range_positions_are_not_found() {
    let layout = layout();
    for spec in [
        PartSpecifier::by_number(PartType::Card, 4),
        PartSpecifier::by_number(PartType::Card, 0),
        PartSpecifier::by_number(PartType::Button, 3),
        PartSpecifier::by_id(PartType::Field, 999),
    ] {
        assert!(
            matches!(resolve(&layout, &spec), Err(ScriptError::PartNotFound(_))),
            "{} should not resolve",
            spec
        );
    }
}

#[test]
fn layer_filters_separate_card_and_background_parts() {
    let layout = layout();
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_number(PartType::Field, 1).on(Owner::Background)),
        Ok(layout.bg_field)
    );
    assert!(resolve(&layout, &PartSpecifier::by_number(PartType::Field, 1).on(Owner::Card)).is_err());
    assert_eq!(
        resolve(&layout, &PartSpecifier::by_number(PartType::Button, 2).on(Owner::Card)),
        Ok(layout.card_buttons[1])
    );
}

#[test]
fn position_lookup_prefers_the_top_most_part() {
    let layout = layout();
    assert_eq!(
        resolve(&layout, &PartSpecifier::at(Point::new(75, 75))),
        Ok(layout.card_buttons[1])
    );
    assert_eq!(
        resolve(&layout, &PartSpecifier::at(Point::new(10, 10))),
        Ok(layout.card_buttons[0])
    );
    assert!(resolve(&layout, &PartSpecifier::at(Point::new(500, 500))).is_err());
}

#[test]
fn composite_specifiers_scope_to_their_container() {
    let mut layout = layout();
    let on_second = layout
        .registry
        .add_part(layout.cards[1], PartType::Button, "Call")
        .unwrap();
    let spec = PartSpecifier::by_number(PartType::Button, 1)
        .of(PartSpecifier::by_name(PartType::Card, "Bob"));
    assert_eq!(resolve(&layout, &spec), Ok(on_second));
    assert_eq!(spec.to_string(), "button 1 of card \"Bob\"");

    let field = PartSpecifier::by_name(PartType::Field, "Phone").of(PartSpecifier::This(PartType::Background));
    assert_eq!(resolve(&layout, &field), Ok(layout.bg_field));
}

#[test]
fn every_part_reaches_the_application() {
    let layout = layout();
    let application = layout.registry.application().key();
    let mut starts = layout.cards.clone();
    starts.extend(&layout.card_buttons);
    starts.extend([layout.bg_field, layout.background, layout.stack]);
    starts.push(layout.registry.message_box().key());

    for start in starts {
        let mut current = start;
        let mut hops = 0;
        while let Some(next) = layout.registry.next_recipient(current) {
            current = next;
            hops += 1;
            assert!(hops <= 6, "chain from {} does not terminate", start);
        }
        assert_eq!(current, application);
    }
}

#[test]
fn background_parts_skip_the_card() {
    let layout = layout();
    assert_eq!(layout.registry.next_recipient(layout.bg_field), Some(layout.background));
    assert_eq!(
        layout.registry.next_recipient(layout.card_buttons[0]),
        Some(layout.cards[0])
    );
}

#[test]
fn structural_edits_keep_numbers_current() {
    let mut layout = layout();
    layout.registry.remove_part(layout.card_buttons[0]).unwrap();
    let upper = layout.registry.get(layout.card_buttons[1]).unwrap();
    assert_eq!(upper.properties().get("number").unwrap(), Value::Integer(1));

    layout.registry.remove_part(layout.cards[1]).unwrap();
    let carol = layout.registry.get(layout.cards[2]).unwrap();
    assert_eq!(carol.properties().get("number").unwrap(), Value::Integer(2));
    assert!(layout.registry.part(layout.cards[1]).is_none());
}

#[test]
fn the_last_card_and_used_backgrounds_stay() {
    let mut layout = layout();
    assert!(layout.registry.remove_part(layout.background).is_err());
    layout.registry.remove_part(layout.cards[1]).unwrap();
    layout.registry.remove_part(layout.cards[2]).unwrap();
    assert!(layout.registry.remove_part(layout.cards[0]).is_err());
    assert!(layout.registry.remove_part(layout.registry.application().key()).is_err());
}

#[test]
fn going_to_a_card_changes_the_scope() {
    let mut layout = layout();
    layout.registry.go_to_card(layout.cards[2]).unwrap();
    let scope = layout.registry.current_scope().unwrap();
    assert_eq!(
        scope,
        Scope {
            stack: layout.stack,
            background: Some(layout.background),
            card: Some(layout.cards[2]),
        }
    );
    let this = resolve(&layout, &PartSpecifier::This(PartType::Card)).unwrap();
    assert_eq!(layout.registry.get(this).unwrap().part_name(), "Carol");
}

#[tokio::test]
async fn property_writes_are_broadcast() {
    let layout = layout();
    let field = layout.registry.get(layout.bg_field).unwrap().clone();
    let mut changes = field.properties().subscribe();

    field.properties().set("text", "555-0100").unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.property, "contents");
    assert_eq!(change.old, Value::Empty);
    assert_eq!(change.new, Value::text("555-0100"));
}
