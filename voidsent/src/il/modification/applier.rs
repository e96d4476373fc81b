use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::il::{
    analysis::{CodeMatch, Cursor},
    core::{FieldRef, InstructionStream, LabelId, OperandKind},
    error::{Direction, PatchError},
    modification::spec::{InsertionSearch, PatchSpec},
};

/// Progress of a single patch operation. `Inserted` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum PatchStage {
    #[strum(serialize = "searching for anchor")]
    Searching,
    #[strum(serialize = "anchor found")]
    AnchorFound,
    #[strum(serialize = "merge label captured")]
    MergeLabelCaptured,
    #[strum(serialize = "insertion point found")]
    InsertionPointFound,
    #[strum(serialize = "inserted")]
    Inserted,
}

/// A failed patch operation, with the patch spec and the last stage it reached.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("patch `{spec}` failed after stage '{stage}': {error}")]
pub struct PatchFailure {
    pub spec: String,
    pub stage: PatchStage,
    #[source]
    pub error: PatchError,
}

/// What a successful operation did to the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppliedPatch {
    pub spec: String,
    pub insertion_point: usize,
    pub block_len: usize,
    pub merge_label: LabelId,
    pub skip_label: LabelId,
    pub captured_field: Option<FieldRef>,
}

impl AppliedPatch {
    /// Where the instruction originally at the insertion point now sits.
    pub fn original_index(&self) -> usize {
        self.insertion_point + self.block_len
    }
}

/// Everything the search phase learned. Nothing has been edited yet.
struct Located {
    insertion_point: usize,
    merge: LabelId,
    field: Option<FieldRef>,
}

/// One run of one spec against one stream.
///
/// The search phase only reads the stream; the skip label is allocated and
/// the block spliced in a single step once every check has passed, so a
/// failure at any stage leaves the stream as it was.
struct PatchOperation<'a> {
    spec: &'a PatchSpec,
    stage: PatchStage,
    /// Off for the conflict probe, which only re-runs a search.
    log_stages: bool,
}

impl<'a> PatchOperation<'a> {
    fn new(spec: &'a PatchSpec) -> Self {
        Self {
            spec,
            stage: PatchStage::Searching,
            log_stages: true,
        }
    }

    fn probe(spec: &'a PatchSpec) -> Self {
        Self {
            log_stages: false,
            ..Self::new(spec)
        }
    }

    fn advance(&mut self, stage: PatchStage) {
        if self.log_stages {
            debug!(spec = %self.spec.name, from = %self.stage, to = %stage, "patch stage");
        }
        self.stage = stage;
    }

    fn fail(&self, error: PatchError) -> PatchFailure {
        debug!(spec = %self.spec.name, stage = %self.stage, %error, "patch failed");
        PatchFailure {
            spec: self.spec.name.clone(),
            stage: self.stage,
            error,
        }
    }

    fn run(mut self, stream: &mut InstructionStream) -> Result<AppliedPatch, PatchFailure> {
        let floor = stream.patch_floor();
        let located = match self.locate(stream, floor) {
            Ok(located) => located,
            Err(error) => return Err(self.fail(error)),
        };

        let skip = stream.new_label().map_err(|error| self.fail(error))?;
        let block = self
            .spec
            .block
            .build(located.merge, located.field.as_ref(), skip);
        let range = stream
            .insert_before(located.insertion_point, block)
            .and_then(|range| stream.attach_label(range.end, skip).map(|_| range))
            .map_err(|error| self.fail(error))?;
        stream.set_patch_floor(range.end);
        self.advance(PatchStage::Inserted);

        Ok(AppliedPatch {
            spec: self.spec.name.clone(),
            insertion_point: range.start,
            block_len: range.len(),
            merge_label: located.merge,
            skip_label: skip,
            captured_field: located.field,
        })
    }

    fn locate(
        &mut self,
        stream: &InstructionStream,
        floor: Option<usize>,
    ) -> Result<Located, PatchError> {
        let mut cursor = Cursor::at(stream, floor);
        if let Err(error) = cursor.match_forward_all(&self.spec.anchor) {
            return Err(self.conflict_or(stream, floor, error));
        }
        self.advance(PatchStage::AnchorFound);

        let merge = cursor.capture::<LabelId>()?;
        self.advance(PatchStage::MergeLabelCaptured);

        let field = match &self.spec.insertion {
            InsertionSearch::Backward { pattern } => {
                cursor.match_backward_all(pattern)?;
                None
            }
            InsertionSearch::FollowBranch { capture, pattern } => {
                cursor
                    .match_forward(&CodeMatch::carries(merge))?
                    .match_forward(capture)?;
                let field = cursor.capture::<FieldRef>()?;
                cursor.match_forward_all(pattern)?;
                Some(field)
            }
        };
        let insertion_point = cursor.position().ok_or(PatchError::PatternNotFound {
            pattern: "insertion point".to_string(),
            direction: Direction::Backward,
            from: None,
        })?;
        self.advance(PatchStage::InsertionPointFound);

        if let Some(floor) = floor {
            if insertion_point <= floor {
                return Err(PatchError::PatchConflict {
                    insertion_point,
                    floor,
                });
            }
        }
        if self.spec.block.needs_field() && field.is_none() {
            return Err(PatchError::OperandTypeMismatch {
                index: Some(insertion_point),
                expected: OperandKind::Field,
                found: OperandKind::None,
            });
        }

        Ok(Located {
            insertion_point,
            merge,
            field,
        })
    }

    /// The anchor is missing past the floor. If it still resolves when
    /// searched from the top, this spec targets code an earlier patch has
    /// already passed, which is a conflict rather than a missing pattern.
    fn conflict_or(
        &self,
        stream: &InstructionStream,
        floor: Option<usize>,
        error: PatchError,
    ) -> PatchError {
        let Some(floor) = floor else {
            return error;
        };
        match PatchOperation::probe(self.spec).locate(stream, None) {
            Ok(located) if located.insertion_point <= floor => PatchError::PatchConflict {
                insertion_point: located.insertion_point,
                floor,
            },
            _ => error,
        }
    }
}

/// Apply a single spec to `stream`.
///
/// The spec has to land strictly after the code any earlier patch on this
/// stream touched. On failure the stream is left exactly as it was.
pub fn apply(stream: &mut InstructionStream, spec: &PatchSpec) -> Result<AppliedPatch, PatchFailure> {
    PatchOperation::new(spec).run(stream)
}

/// Applies specs one after another to the same stream and keeps what each
/// of them did.
///
/// Specs must be listed in stream order, see [`apply`].
#[derive(Clone, Debug)]
pub struct Patcher {
    stream: InstructionStream,
    applied: Vec<AppliedPatch>,
}

impl Patcher {
    pub fn new(stream: InstructionStream) -> Self {
        Self {
            stream,
            applied: Vec::new(),
        }
    }

    pub fn apply(&mut self, spec: &PatchSpec) -> Result<&AppliedPatch, PatchFailure> {
        let applied = apply(&mut self.stream, spec)?;
        self.applied.push(applied);
        Ok(&self.applied[self.applied.len() - 1])
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn applied(&self) -> &[AppliedPatch] {
        &self.applied
    }

    pub fn into_stream(self) -> InstructionStream {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        io,
        sync::{Arc, Mutex},
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::il::{
        analysis::validate,
        core::{assemble, Instruction, MethodRef, Opcode, Operand},
        modification::spec::{KeyExpr, OverrideBlock},
    };
    use crate::sites::tent;

    const SCENARIO: &str = r#"
br L0
L0: ldstr "X"
beq L1
ldstr "search"
call Game::f/1
br L2
L1: ldstr "fallback"
L2: ret
"#;

    const TWO_SECTIONS: &str = r#"
L0: ldstr "X"
beq L1
ldstr "first"
br L2
L1: ldstr "first fallback"
L2: stloc 3
ldstr "X"
beq L3
ldstr "second"
br L4
L3: ldstr "second fallback"
L4: ret
"#;

    fn spec(name: &str, search: &str) -> PatchSpec {
        PatchSpec {
            name: name.to_string(),
            anchor: vec![CodeMatch::ldstr(search), CodeMatch::opcode(Opcode::Br)],
            insertion: InsertionSearch::Backward {
                pattern: vec![CodeMatch::opcode(Opcode::Beq), CodeMatch::ldstr("X")],
            },
            block: OverrideBlock::Value {
                key: KeyExpr::new("Base", 0),
                check: MethodRef::new("Patch", "CheckForNamedString", 2),
                fetch: MethodRef::new("Patch", "NamedString", 2),
            },
        }
    }

    /// Label -> the instruction it lands on, labels stripped.
    fn landings(stream: &InstructionStream) -> Vec<(LabelId, Instruction)> {
        stream
            .label_owners()
            .into_iter()
            .map(|(label, owners)| {
                let mut ix = stream.instructions()[owners[0]].clone();
                ix.labels.clear();
                (label, ix)
            })
            .collect()
    }

    #[test]
    fn scenario_inserts_block_before_comparison() {
        let mut stream = assemble(SCENARIO).unwrap();
        let before = stream.len();
        let applied = apply(&mut stream, &spec("scenario", "search")).unwrap();

        assert_eq!(applied.insertion_point, 1);
        assert_eq!(applied.block_len, 8);
        assert_eq!(applied.merge_label, LabelId(2));
        assert_eq!(stream.len(), before + 8);

        let first = stream.get(1).unwrap();
        assert_eq!(first.operand, Operand::Str("Base".into()));
        assert!(first.carries(LabelId(0)));

        let original = stream.get(applied.original_index()).unwrap();
        assert_eq!(original.operand, Operand::Str("X".into()));
        assert_eq!(original.labels.as_slice(), &[applied.skip_label]);
        assert_eq!(applied.skip_label, LabelId(3));

        assert_eq!(
            stream.get(8).unwrap(),
            &Instruction::branch(Opcode::Br, LabelId(2))
        );
        assert!(validate(&stream).is_empty());
    }

    #[test]
    fn labels_are_conserved() {
        let mut stream = assemble(SCENARIO).unwrap();
        let before: BTreeSet<LabelId> = stream.label_owners().into_keys().collect();
        let landed_before = landings(&stream);

        apply(&mut stream, &spec("scenario", "search")).unwrap();

        let after: BTreeSet<LabelId> = stream.label_owners().into_keys().collect();
        assert!(before.is_subset(&after));

        let landed_after = landings(&stream);
        for (label, ix) in landed_before {
            let now = &landed_after.iter().find(|(l, _)| *l == label).unwrap().1;
            if label == LabelId(0) {
                // moved onto the start of the inserted block
                assert_eq!(now, &Instruction::ldstr("Base"));
            } else {
                assert_eq!(now, &ix);
            }
        }
    }

    #[test]
    fn missing_anchor_leaves_stream_untouched() {
        let mut stream = assemble(&SCENARIO.replace("\"search\"", "\"other\"")).unwrap();
        let pristine = stream.clone();

        let failure = apply(&mut stream, &spec("scenario", "search")).unwrap_err();
        assert_eq!(failure.stage, PatchStage::Searching);
        assert!(matches!(failure.error, PatchError::PatternNotFound { .. }));
        assert_eq!(stream, pristine);
    }

    #[test]
    fn anchor_without_branch_operand_is_a_type_mismatch() {
        let mut stream = assemble(SCENARIO).unwrap();
        let pristine = stream.clone();
        let mut bad = spec("bad", "search");
        bad.anchor = vec![CodeMatch::ldstr("search"), CodeMatch::opcode(Opcode::Call)];

        let failure = apply(&mut stream, &bad).unwrap_err();
        assert_eq!(failure.stage, PatchStage::AnchorFound);
        assert_eq!(
            failure.error,
            PatchError::OperandTypeMismatch {
                index: Some(4),
                expected: OperandKind::Label,
                found: OperandKind::Method,
            }
        );
        assert_eq!(stream, pristine);
    }

    #[test]
    fn same_spec_twice_conflicts() {
        let mut patcher = Patcher::new(assemble(SCENARIO).unwrap());
        let first = patcher.apply(&spec("scenario", "search")).unwrap().clone();
        let snapshot = patcher.stream().clone();

        let failure = patcher.apply(&spec("scenario", "search")).unwrap_err();
        assert_eq!(failure.stage, PatchStage::InsertionPointFound);
        assert_eq!(
            failure.error,
            PatchError::PatchConflict {
                insertion_point: first.original_index(),
                floor: first.original_index(),
            }
        );
        assert_eq!(patcher.stream(), &snapshot);
    }

    #[test]
    fn specs_in_stream_order_both_apply() {
        let mut patcher = Patcher::new(assemble(TWO_SECTIONS).unwrap());
        patcher.apply(&spec("first", "first")).unwrap();
        patcher.apply(&spec("second", "second")).unwrap();

        assert_eq!(patcher.applied().len(), 2);
        assert_eq!(patcher.applied()[1].insertion_point, 14);
        assert!(validate(patcher.stream()).is_empty());
    }

    #[test]
    fn out_of_order_spec_conflicts() {
        let mut patcher = Patcher::new(assemble(TWO_SECTIONS).unwrap());
        patcher.apply(&spec("second", "second")).unwrap();
        let snapshot = patcher.stream().clone();

        let failure = patcher.apply(&spec("first", "first")).unwrap_err();
        assert_eq!(failure.stage, PatchStage::Searching);
        assert!(matches!(
            failure.error,
            PatchError::PatchConflict {
                insertion_point: 0,
                ..
            }
        ));
        assert_eq!(patcher.stream(), &snapshot);
    }

    #[test]
    fn genuinely_missing_pattern_after_floor_is_not_a_conflict() {
        let mut patcher = Patcher::new(assemble(TWO_SECTIONS).unwrap());
        patcher.apply(&spec("first", "first")).unwrap();

        let failure = patcher.apply(&spec("third", "third")).unwrap_err();
        assert!(matches!(failure.error, PatchError::PatternNotFound { .. }));
    }

    #[test]
    fn applying_twice_to_one_stream_conflicts() {
        let mut stream = assemble(SCENARIO).unwrap();
        let first = apply(&mut stream, &spec("scenario", "search")).unwrap();
        assert_eq!(stream.patch_floor(), Some(first.original_index()));
        let snapshot = stream.clone();

        let failure = apply(&mut stream, &spec("scenario", "search")).unwrap_err();
        assert_eq!(failure.stage, PatchStage::InsertionPointFound);
        assert_eq!(
            failure.error,
            PatchError::PatchConflict {
                insertion_point: 9,
                floor: 9,
            }
        );
        assert_eq!(stream, snapshot);
        assert_eq!(stream.len(), assemble(SCENARIO).unwrap().len() + 8);
    }

    #[test]
    fn exhausted_label_space_fails_without_editing() {
        let mut stream = assemble(&SCENARIO.replace("L2: ret", "L2: L4294967295: ret")).unwrap();
        let pristine = stream.clone();

        let failure = apply(&mut stream, &spec("scenario", "search")).unwrap_err();
        assert_eq!(failure.stage, PatchStage::InsertionPointFound);
        assert_eq!(failure.error, PatchError::LabelsExhausted);
        assert_eq!(stream, pristine);
        assert_eq!(stream.patch_floor(), None);
    }

    #[test]
    fn guard_block_needs_a_captured_field() {
        let mut stream = assemble(SCENARIO).unwrap();
        let pristine = stream.clone();
        let mut guard = spec("guard", "search");
        guard.block = OverrideBlock::Guard {
            subject_local: 0,
            check: MethodRef::new("Patch", "LocationCheck", 1),
            notify: MethodRef::new("Patch", "ShowMessage", 0).void(),
            result: 0,
        };

        let failure = apply(&mut stream, &guard).unwrap_err();
        assert_eq!(failure.stage, PatchStage::InsertionPointFound);
        assert_eq!(
            failure.error,
            PatchError::OperandTypeMismatch {
                index: Some(1),
                expected: OperandKind::Field,
                found: OperandKind::None,
            }
        );
        assert_eq!(stream, pristine);
    }

    #[test]
    fn followed_branch_must_land_somewhere() {
        let mut stream = assemble(
            r#"
ldstr "(O)TentKit"
brtrue L7
ret
L0: ldloc 0
ldfld D::location
brfalse L0
ldloc 0
ret
"#,
        )
        .unwrap();
        let pristine = stream.clone();

        let failure = apply(&mut stream, &tent::tent_spec()).unwrap_err();
        assert_eq!(failure.stage, PatchStage::MergeLabelCaptured);
        assert_eq!(
            failure.error,
            PatchError::PatternNotFound {
                pattern: "L7:".into(),
                direction: Direction::Forward,
                from: Some(1),
            }
        );
        assert_eq!(stream, pristine);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(run: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, run);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn conflict_check_does_not_log_stages_it_never_reached() {
        let mut patcher = Patcher::new(assemble(TWO_SECTIONS).unwrap());
        patcher.apply(&spec("second", "second")).unwrap();

        let logs = captured_logs(|| {
            let failure = patcher.apply(&spec("first", "first")).unwrap_err();
            assert!(matches!(failure.error, PatchError::PatchConflict { .. }));
        });
        assert!(logs.contains("patch failed"), "{logs}");
        assert!(!logs.contains("anchor found"), "{logs}");
        assert!(!logs.contains("insertion point found"), "{logs}");
    }
}
