use std::fmt::Write;

use crate::items::PackItem;
use crate::packs::Pack;
use crate::weights::{compute_pack_weights, WeightUnit};

const PERSONA: &str = "You are PackRat, an assistant for hikers and backpackers. \
Give practical, safety-conscious advice about gear, packing and trip planning. \
Keep answers short and concrete.";

/// What the assistant is told about the user's situation.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub pack: Option<(&'a Pack, &'a [PackItem])>,
    pub item: Option<&'a PackItem>,
    pub weather: Option<String>,
}

fn describe_item(out: &mut String, item: &PackItem) {
    let _ = write!(
        out,
        "- {} ({} {}",
        item.name,
        item.weight,
        item.weight_unit.as_str()
    );
    if item.quantity != 1 {
        let _ = write!(out, " x{}", item.quantity);
    }
    if let Some(cat) = item.category.as_deref().filter(|c| !c.is_empty()) {
        let _ = write!(out, ", {cat}");
    }
    if item.consumable {
        out.push_str(", consumable");
    }
    if item.worn {
        out.push_str(", worn");
    }
    out.push_str(")\n");
}

pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::from(PERSONA);

    if let Some((pack, items)) = ctx.pack {
        let w = compute_pack_weights(items, WeightUnit::G);
        let _ = write!(
            out,
            "\n\nThe user is asking about their pack \"{}\" ({:?}). Base weight {} g, total weight {} g.",
            pack.name, pack.category, w.base_weight, w.total_weight
        );
        if let Some(desc) = pack.description.as_deref() {
            let _ = write!(out, " Description: {desc}");
        }
        if items.is_empty() {
            out.push_str("\nThe pack has no items yet.\n");
        } else {
            out.push_str("\nItems:\n");
            for item in items.iter().filter(|i| !i.deleted) {
                describe_item(&mut out, item);
            }
        }
    }

    if let Some(item) = ctx.item {
        out.push_str("\n\nThe user is asking about this item:\n");
        describe_item(&mut out, item);
        if let Some(notes) = item.notes.as_deref() {
            let _ = writeln!(out, "Notes: {notes}");
        }
    }

    if let Some(weather) = ctx.weather.as_deref() {
        let _ = write!(out, "\n\nCurrent conditions at the trip location. {weather}");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packs::PackCategory;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn pack() -> Pack {
        let now = OffsetDateTime::now_utc();
        Pack {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Weekend loop".into(),
            description: Some("Two nights in the Smokies".into()),
            category: PackCategory::Backpacking,
            is_public: false,
            image: None,
            tags: vec![],
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn plain_prompt_is_just_the_persona() {
        assert_eq!(build_system_prompt(&PromptContext::default()), PERSONA);
    }

    #[test]
    fn pack_context_lists_items_and_weights() {
        let p = pack();
        let mut water = PackItem::sample("Water", 2.0, WeightUnit::Kg);
        water.consumable = true;
        let mut stakes = PackItem::sample("Stakes", 10.0, WeightUnit::G);
        stakes.quantity = 6;
        let items = vec![water, stakes];
        let prompt = build_system_prompt(&PromptContext {
            pack: Some((&p, &items)),
            ..Default::default()
        });
        assert!(prompt.contains("\"Weekend loop\""));
        assert!(prompt.contains("Base weight 60 g, total weight 2060 g"));
        assert!(prompt.contains("- Water (2 kg, consumable)"));
        assert!(prompt.contains("- Stakes (10 g x6)"));
    }

    #[test]
    fn weather_and_item_are_appended() {
        let mut stove = PackItem::sample("Stove", 3.0, WeightUnit::Oz);
        stove.notes = Some("Canister, needs fuel".into());
        let prompt = build_system_prompt(&PromptContext {
            item: Some(&stove),
            weather: Some("Sunny, 20°C.".into()),
            ..Default::default()
        });
        assert!(prompt.contains("- Stove (3 oz)"));
        assert!(prompt.contains("Notes: Canister, needs fuel"));
        assert!(prompt.ends_with("Sunny, 20°C."));
    }
}
