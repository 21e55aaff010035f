//! Processor label anchoring.

use hoard::core::language::CompilerSpec;
use hoard::core::program::{Consumer, Program};
use hoard::loader::apply_processor_labels;
use hoard::loader::options::{ANCHOR_LABELS_OPTION_NAME, APPLY_LABELS_OPTION_NAME};
use hoard::LoadOption;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::common::*;

const DEFAULT_SYMBOLS: [&str; 3] = ["RESET", "INT0", "TIMER1_OVF"];

fn labelled(options: &[LoadOption]) -> Program {
    let mut program = Program::new(
        "p",
        Arc::new(avr_language()),
        CompilerSpec::new("gcc"),
        &Consumer::new(),
    );
    apply_processor_labels(options, &mut program).unwrap();
    program
}

fn default_symbol_names(program: &Program) -> BTreeSet<String> {
    program
        .symbol_table()
        .iter()
        .filter(|s| DEFAULT_SYMBOLS.contains(&s.name.as_str()))
        .map(|s| s.name.clone())
        .collect()
}

#[test]
fn anchoring_only_changes_pinning() {
    let apply = LoadOption::boolean(APPLY_LABELS_OPTION_NAME, true);
    let anchored = labelled(&[apply.clone(), LoadOption::boolean(ANCHOR_LABELS_OPTION_NAME, true)]);
    let loose = labelled(&[apply, LoadOption::boolean(ANCHOR_LABELS_OPTION_NAME, false)]);

    assert_eq!(default_symbol_names(&anchored), default_symbol_names(&loose));
    assert_eq!(default_symbol_names(&loose).len(), DEFAULT_SYMBOLS.len());

    let defaults = |p: &Program| -> Vec<bool> {
        p.symbol_table()
            .iter()
            .filter(|s| DEFAULT_SYMBOLS.contains(&s.name.as_str()))
            .map(|s| s.pinned)
            .collect()
    };
    assert!(defaults(&anchored).iter().all(|pinned| *pinned));
    assert!(defaults(&loose).iter().all(|pinned| !*pinned));

    // Register labels are pinned either way.
    for program in [&anchored, &loose] {
        let spl = program.symbol_table().symbols_named("SPL").next().unwrap();
        assert!(spl.pinned);
        assert!(spl.primary);
    }
}

#[test]
fn entry_and_primary_flags() {
    let program = labelled(&[LoadOption::boolean(APPLY_LABELS_OPTION_NAME, true)]);
    let table = program.symbol_table();
    let reset = table.symbols_named("RESET").next().unwrap();
    let int0 = table.symbols_named("INT0").next().unwrap();
    let timer = table.symbols_named("TIMER1_OVF").next().unwrap();

    assert!(table.is_external_entry_point(&reset.address));
    assert!(table.is_external_entry_point(&int0.address));
    assert!(!table.is_external_entry_point(&timer.address));
    assert_eq!(table.primary_symbol(&reset.address).unwrap().name, "RESET");
    assert_eq!(table.external_entry_points().count(), 2);
}

#[test]
fn disabled_default_labels_leave_only_registers() {
    let program = labelled(&[LoadOption::boolean(APPLY_LABELS_OPTION_NAME, false)]);
    assert!(default_symbol_names(&program).is_empty());
    let names: BTreeSet<_> = program.symbol_table().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, BTreeSet::from(["SPL", "SREG"]));
    assert!(!program.is_analyzed());
}

#[test]
fn absent_apply_option_defaults_to_applying() {
    let program = labelled(&[]);
    assert_eq!(default_symbol_names(&program).len(), DEFAULT_SYMBOLS.len());
}
