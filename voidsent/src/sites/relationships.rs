use crate::{
    il::{
        analysis::CodeMatch,
        core::{MethodRef, Opcode},
        modification::{InsertionSearch, KeyExpr, OverrideBlock, PatchSpec},
    },
    sites::PatchSite,
};

/// (category, string the original code loads, base key of the override)
///
/// Listed in the order the categories appear in the patched methods.
pub const RELATIONSHIPS: &[(&str, &str, &str)] = &[
    (
        "housemate",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Housemate_Male",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Housemate",
    ),
    (
        "spouse",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Husband",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Spouse",
    ),
    (
        "partner",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Boyfriend",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Partner",
    ),
    (
        "ex-spouse",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_ExHusband",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_ExSpouse",
    ),
    (
        "single",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Single_Male",
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Single",
    ),
];

pub const PROFILE_MENU_PATCH: &str = "Voidsent.Patches.ProfileMenuPatch";
pub const SOCIAL_PAGE_PATCH: &str = "Voidsent.Patches.SocialPagePatch";

/// One spec per relationship category.
///
/// The original code picks between the gendered strings with
/// `ldloc <gender>; ldc.i4 1; beq`, and the override goes right in front of
/// that comparison. `entity_local` holds whatever the callbacks take as the
/// second argument (the NPC, or just its name).
pub fn relationship_specs(
    site: &str,
    callbacks_owner: &str,
    gender_local: u16,
    entity_local: u16,
) -> Vec<PatchSpec> {
    let check = MethodRef::new(callbacks_owner, "CheckForNamedString", 2);
    let fetch = MethodRef::new(callbacks_owner, "NamedString", 2);

    RELATIONSHIPS
        .iter()
        .map(|(category, search, base)| PatchSpec {
            name: format!("{site}/{category}"),
            anchor: vec![CodeMatch::ldstr(*search), CodeMatch::opcode(Opcode::Br)],
            insertion: InsertionSearch::Backward {
                pattern: vec![
                    CodeMatch::opcode(Opcode::Beq),
                    CodeMatch::ldc_i4(1),
                    CodeMatch::ldloc(gender_local),
                ],
            },
            block: OverrideBlock::Value {
                key: KeyExpr::new(*base, entity_local),
                check: check.clone(),
                fetch: fetch.clone(),
            },
        })
        .collect()
}

pub fn profile_menu() -> PatchSite {
    PatchSite {
        name: "profile-menu".into(),
        target: "StardewValley.Menus.ProfileMenu::_SetCharacter".into(),
        specs: relationship_specs("profile-menu", PROFILE_MENU_PATCH, 1, 0),
    }
}

pub fn social_page() -> PatchSite {
    PatchSite {
        name: "social-page".into(),
        target: "StardewValley.Menus.SocialPage::drawNPCSlot".into(),
        specs: relationship_specs("social-page", SOCIAL_PAGE_PATCH, 2, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_spec_per_category() {
        let site = social_page();
        assert_eq!(site.specs.len(), RELATIONSHIPS.len());
        assert_eq!(site.specs[1].name, "social-page/spouse");

        let OverrideBlock::Value { key, check, .. } = &site.specs[1].block else {
            panic!("relationship specs use value blocks");
        };
        assert_eq!(key.entity_local, 1);
        assert_eq!(key.base, "Strings\\StringsFromCSFiles:SocialPage_Relationship_Spouse");
        assert_eq!(check.owner, SOCIAL_PAGE_PATCH);
    }

    #[test]
    fn profile_menu_compares_second_local() {
        let site = profile_menu();
        let InsertionSearch::Backward { pattern } = &site.specs[0].insertion else {
            panic!("relationship specs search backward");
        };
        assert_eq!(pattern.last(), Some(&CodeMatch::ldloc(1)));
    }
}
