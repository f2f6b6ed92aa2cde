//! Selecting one part from an ordered candidate list.
//!
//! The finder is pure: the registry decides which parts are candidates (in
//! z-order, bottom first) and the finder applies the specifier's type filter,
//! then its layer filter, then its selector.

use super::error::{ScriptError, ScriptResult};
use super::ordinal::OrdinalSource;
use super::part::Findable;
use super::specifier::PartSpecifier;

/// Applies simple specifiers to candidate lists.
pub struct PartFinder<'a> {
    source: &'a mut dyn OrdinalSource,
}

impl<'a> PartFinder<'a> {
    /// Finder drawing `any` picks from `source`.
    pub fn new(source: &'a mut dyn OrdinalSource) -> Self {
        Self { source }
    }

    /// Select the part `spec` names among `candidates`.
    ///
    /// Composite, `this` and message-box specifiers need the hierarchy and are
    /// rejected here.
    pub fn find<'c, C: Findable>(
        &mut self,
        spec: &PartSpecifier,
        candidates: &'c [C],
    ) -> ScriptResult<&'c C> {
        let not_found = || ScriptError::PartNotFound(spec.to_string());
        let filtered: Vec<&'c C> = candidates
            .iter()
            .filter(|candidate| spec.part_type().is_none_or(|ty| candidate.part_type() == ty))
            .filter(|candidate| spec.owner().is_none_or(|owner| candidate.owner() == owner))
            .collect();

        match spec {
            PartSpecifier::ById { id, .. } => filtered
                .into_iter()
                .find(|candidate| candidate.part_id() == *id)
                .ok_or_else(not_found),
            PartSpecifier::ByName { name, .. } => {
                let wanted = name.to_lowercase();
                filtered
                    .into_iter()
                    .find(|candidate| candidate.part_name().to_lowercase() == wanted)
                    .ok_or_else(not_found)
            }
            PartSpecifier::ByNumber { number, .. } => usize::try_from(*number)
                .ok()
                .filter(|number| *number >= 1)
                .and_then(|number| filtered.get(number - 1).copied())
                .ok_or_else(not_found),
            PartSpecifier::ByOrdinal { ordinal, .. } => ordinal
                .resolve(filtered.len(), self.source)
                .map(|index| filtered[index])
                .ok_or_else(not_found),
            PartSpecifier::ByPosition { position, .. } => filtered
                .into_iter()
                .rev()
                .find(|candidate| {
                    candidate
                        .bounds()
                        .is_some_and(|rect| rect.contains(*position))
                })
                .ok_or_else(not_found),
            PartSpecifier::MessageBox
            | PartSpecifier::This(_)
            | PartSpecifier::Composite { .. } => Err(ScriptError::semantic(format!(
                "'{}' must be resolved against the part hierarchy",
                spec
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ordinal::{FixedSource, Ordinal};
    use crate::runtime::part::{Owner, PartType};
    use crate::runtime::value::{Point, Rect};

    #[derive(Debug, PartialEq)]
    struct Stub {
        part_type: PartType,
        owner: Owner,
        id: i64,
        name: &'static str,
        rect: Option<Rect>,
    }

    impl Findable for Stub {
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
            self.name.to_string()
        }
        fn bounds(&self) -> Option<Rect> {
            self.rect
        }
    }

    fn stub(part_type: PartType, owner: Owner, id: i64, name: &'static str, rect: Rect) -> Stub {
        Stub {
            part_type,
            owner,
            id,
            name,
            rect: Some(rect),
        }
    }

    fn layout() -> Vec<Stub> {
        vec![
            stub(PartType::Button, Owner::Background, 1, "Next", Rect::new(0, 0, 100, 100)),
            stub(PartType::Field, Owner::Background, 2, "Notes", Rect::new(0, 0, 50, 50)),
            stub(PartType::Button, Owner::Card, 3, "OK", Rect::new(20, 20, 40, 40)),
            stub(PartType::Button, Owner::Card, 4, "Cancel", Rect::new(60, 60, 80, 80)),
        ]
    }

    #[test]
    fn type_then_layer_then_selector() {
        let parts = layout();
        let mut source = FixedSource(0);
        let mut finder = PartFinder::new(&mut source);

        let second = PartSpecifier::by_number(PartType::Button, 2);
        assert_eq!(finder.find(&second, &parts).unwrap().id, 3);

        let card_first = PartSpecifier::by_number(PartType::Button, 1).on(Owner::Card);
        assert_eq!(finder.find(&card_first, &parts).unwrap().id, 3);

        let named = PartSpecifier::by_name(PartType::Button, "cancel");
        assert_eq!(finder.find(&named, &parts).unwrap().id, 4);

        let last = PartSpecifier::by_ordinal(PartType::Button, Ordinal::Last);
        assert_eq!(finder.find(&last, &parts).unwrap().id, 4);

        let wrong_type = PartSpecifier::by_id(PartType::Field, 3);
        assert!(matches!(
            finder.find(&wrong_type, &parts),
            Err(ScriptError::PartNotFound(_))
        ));
    }

    #[test]
    fn numbers_outside_the_list_are_not_found() {
        let parts = layout();
        let mut source = FixedSource(0);
        let mut finder = PartFinder::new(&mut source);
        for number in [0, -1, 4] {
            let spec = PartSpecifier::by_number(PartType::Button, number);
            assert!(finder.find(&spec, &parts).is_err(), "button {}", number);
        }
        let any_card = PartSpecifier::by_ordinal(PartType::Card, Ordinal::Any);
        assert!(finder.find(&any_card, &parts).is_err());
    }

    #[test]
    fn position_prefers_the_top_most_part() {
        let parts = layout();
        let mut source = FixedSource(0);
        let mut finder = PartFinder::new(&mut source);
        let hit = finder.find(&PartSpecifier::at(Point::new(30, 30)), &parts).unwrap();
        assert_eq!(hit.id, 3);
        let bg_only = PartSpecifier::at(Point::new(30, 30)).on(Owner::Background);
        assert_eq!(finder.find(&bg_only, &parts).unwrap().id, 2);
        assert!(finder.find(&PartSpecifier::at(Point::new(500, 5)), &parts).is_err());
    }
}
