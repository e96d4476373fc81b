use crate::{
    il::{
        analysis::CodeMatch,
        core::{MethodRef, Opcode},
        modification::{InsertionSearch, OverrideBlock, PatchSpec},
    },
    sites::PatchSite,
};

pub const TENT_PATCH: &str = "Voidsent.Patches.TentPatch";
pub const TENT_KIT: &str = "(O)TentKit";

/// Refuse tent placement in locations flagged unsafe.
///
/// The tent kit branch jumps to the null check of the placement location.
/// The guard loads the same location field and goes right after that
/// check, in front of the next `ldloc 0`.
pub fn tent_spec() -> PatchSpec {
    PatchSpec {
        name: "tent/placement".into(),
        anchor: vec![CodeMatch::ldstr(TENT_KIT), CodeMatch::opcode(Opcode::BrTrue)],
        insertion: InsertionSearch::FollowBranch {
            capture: CodeMatch::opcode(Opcode::LdFld),
            pattern: vec![CodeMatch::ldloc(0)],
        },
        block: OverrideBlock::Guard {
            subject_local: 0,
            check: MethodRef::new(TENT_PATCH, "LocationCheck", 1),
            notify: MethodRef::new(TENT_PATCH, "ShowMessage", 0).void(),
            result: 0,
        },
    }
}

pub fn tent() -> PatchSite {
    PatchSite {
        name: "tent".into(),
        target: "StardewValley.Object::placementAction".into(),
        specs: vec![tent_spec()],
    }
}
