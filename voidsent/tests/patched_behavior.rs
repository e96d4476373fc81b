use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use voidsent::{
    config::PatcherSettings,
    il::{
        analysis::validate,
        core::{assemble, FieldRef, InstructionStream, MethodRef},
        exec::{execute, ExecError, Frame, Runtime, Value, DEFAULT_STEP_LIMIT},
        io::{patch_all, HostLoader, MemoryHost},
    },
    overrides::{OverrideCallbacks, StringTable, TENT_UNALLOWED},
    sites::{builtin_sites, relationships::RELATIONSHIPS, tent::TENT_KIT},
    types::SiteOutcome,
};

const PROFILE_MENU: &str = "StardewValley.Menus.ProfileMenu::_SetCharacter";
const PLACEMENT_ACTION: &str = "StardewValley.Object::placementAction";

/// `_SetCharacter` reduced to its relationship lookups: local 2 selects the
/// category, local 1 is the gender, local 0 the NPC.
fn profile_menu_listing() -> String {
    let mut out = String::new();
    for (idx, (category, search, _)) in RELATIONSHIPS.iter().enumerate() {
        let base = 10 + 3 * idx as u32;
        let (female, merge, next) = (base, base + 1, base + 2);
        if idx > 0 {
            out.push_str(&format!("L{}: ", base - 1));
        }
        out.push_str(&format!(
            r#"ldloc 2
ldc.i4 {idx}
bne L{next}
ldloc 1
ldc.i4 1
beq L{female}
ldsfld Game1::content
ldstr {search:?}
callvirt LocalizedContentManager::LoadString/1
br L{merge}
L{female}: ldsfld Game1::content
ldstr "{category} (female)"
callvirt LocalizedContentManager::LoadString/1
L{merge}: ret
"#
        ));
    }
    out.push_str("L24: ldstr \"unknown\"\nret\n");
    out
}

const PLACEMENT: &str = r#"
ldarg 0
ldstr "(O)TentKit"
call String::op_Equality/2
brtrue L0
ldc.i4 1
ret
L0: ldloc 0
ldfld DisplayClass401_0::location
brfalse L1
ldloc 0
ldfld DisplayClass401_0::location
ldfld GameLocation::IsOutdoors
brfalse L1
ldc.i4 1
ret
L1: ldc.i4 0
ret
"#;

/// The callbacks plus the one framework method the placement listing calls.
struct Game<'r> {
    callbacks: OverrideCallbacks<'r>,
}

impl Runtime for Game<'_> {
    fn load_static(&mut self, field: &FieldRef) -> Option<Value> {
        self.callbacks.load_static(field)
    }

    fn invoke(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>, ExecError> {
        if method.name == "op_Equality" {
            return Ok(Some(Value::bool(args[0] == args[1])));
        }
        self.callbacks.invoke(method, args)
    }
}

fn overrides() -> StringTable {
    [(
        "Strings\\StringsFromCSFiles:SocialPage_Relationship_Spouse_Krobus",
        "Roommate-for-life",
    )]
    .into_iter()
    .collect()
}

fn npc(name: &str) -> Value {
    Value::Object(BTreeMap::from([("Name".to_string(), Value::from(name))]))
}

fn object(fields: &[(&str, Value)]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
    )
}

fn run_profile(stream: &InstructionStream, table: &StringTable, who: &str, gender: i64, category: i64) -> Value {
    let mut game = Game {
        callbacks: OverrideCallbacks::new(table, PatcherSettings::default().tent_gate()),
    };
    let mut frame = Frame::with_locals(vec![npc(who), Value::Int(gender), Value::Int(category)]);
    execute(stream, &mut frame, &mut game, DEFAULT_STEP_LIMIT)
        .unwrap()
        .unwrap()
}

fn patched_host() -> MemoryHost {
    let mut host = MemoryHost::new()
        .with_method(PROFILE_MENU, assemble(&profile_menu_listing()).unwrap())
        .with_method(PLACEMENT_ACTION, assemble(PLACEMENT).unwrap());

    let report = patch_all(&mut host, &builtin_sites(), |_| {});
    assert!(matches!(
        report.outcome("profile-menu"),
        Some(SiteOutcome::Patched { inserted: 40, .. })
    ));
    assert!(matches!(report.outcome("tent"), Some(SiteOutcome::Patched { inserted: 7, .. })));
    assert!(matches!(report.outcome("social-page"), Some(SiteOutcome::Skipped { .. })));
    host
}

#[test]
fn override_replaces_relationship_text_when_present() {
    let mut host = patched_host();
    let patched = host.load(PROFILE_MENU).unwrap();
    assert!(validate(&patched).is_empty());

    let table = overrides();
    assert_eq!(run_profile(&patched, &table, "Krobus", 0, 1), Value::from("Roommate-for-life"));
    assert_eq!(run_profile(&patched, &table, "Krobus", 1, 1), Value::from("Roommate-for-life"));
}

#[test]
fn original_text_without_override() {
    let mut host = patched_host();
    let patched = host.load(PROFILE_MENU).unwrap();
    let original = assemble(&profile_menu_listing()).unwrap();
    let table = overrides();

    for category in 0..RELATIONSHIPS.len() as i64 {
        for gender in [0, 1] {
            assert_eq!(
                run_profile(&patched, &table, "Abigail", gender, category),
                run_profile(&original, &table, "Abigail", gender, category),
            );
        }
    }
    assert_eq!(
        run_profile(&patched, &table, "Abigail", 0, 1),
        Value::from("Strings\\StringsFromCSFiles:SocialPage_Relationship_Husband")
    );
    assert_eq!(run_profile(&patched, &table, "Abigail", 1, 3), Value::from("ex-spouse (female)"));
}

#[test]
fn unpatched_method_ignores_overrides() {
    let original = assemble(&profile_menu_listing()).unwrap();
    assert_eq!(
        run_profile(&original, &overrides(), "Krobus", 0, 1),
        Value::from("Strings\\StringsFromCSFiles:SocialPage_Relationship_Husband")
    );
}

#[test]
fn tent_guard_blocks_unsafe_locations() {
    let mut host = patched_host();
    let patched = host.load(PLACEMENT_ACTION).unwrap();
    let settings = PatcherSettings::default();
    let table = StringTable::new();
    let gate_field = settings.tent_gate().field_name();

    let location = |unsafe_flag: &str| {
        object(&[
            ("IsOutdoors", Value::Int(1)),
            (
                "CustomFields",
                object(&[(gate_field.as_str(), Value::from(unsafe_flag))]),
            ),
        ])
    };
    let place = |item: &str, location: Value| {
        let mut game = Game {
            callbacks: OverrideCallbacks::new(&table, settings.tent_gate()),
        };
        let mut frame = Frame {
            args: vec![Value::from(item)],
            locals: vec![object(&[("location", location)])],
        };
        let result = execute(&patched, &mut frame, &mut game, DEFAULT_STEP_LIMIT).unwrap();
        (result, game.callbacks.messages)
    };

    assert_eq!(
        place(TENT_KIT, location("True")),
        (Some(Value::Int(0)), vec![TENT_UNALLOWED.to_string()])
    );
    assert_eq!(place(TENT_KIT, location("False")), (Some(Value::Int(1)), vec![]));
    assert_eq!(place("(O)Torch", location("True")), (Some(Value::Int(1)), vec![]));
}
