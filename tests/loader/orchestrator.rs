//! End-to-end behaviour of `load` and `load_into`.

use hoard::core::language::CompilerSpec;
use hoard::core::program::{Consumer, Program, ProgramEvent};
use hoard::io::MemoryByteProvider;
use hoard::loader::container::{MemoryContainer, ProgramContainer};
use hoard::loader::options::{
    default_options, validate_options, APPLY_LABELS_OPTION_NAME, COMMAND_LINE_ARG_PREFIX,
};
use hoard::loader::{load, load_into, LoadSpec, OptionType, OptionValue};
use hoard::{BinaryLoader, LoadOption, LoaderError, MessageLog, TaskMonitor};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::common::*;

fn source() -> MemoryByteProvider {
    MemoryByteProvider::new(FOX)
}

#[test]
fn incomplete_spec_loads_nothing() {
    let mut loader = ScriptedLoader::new(2);
    loader.override_primary = false;
    let container = ScriptedContainer::new();
    let spec = avr_spec();
    let incomplete = LoadSpec::incomplete(Arc::clone(&spec.language), spec.compiler_spec.clone());
    let mut log = MessageLog::new();

    let loaded = load(
        &loader,
        &source(),
        "foo",
        Some(container.clone()),
        &incomplete,
        &[],
        &mut log,
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap();

    assert!(loaded.is_empty());
    assert_eq!(container.calls(), 0);
    assert_eq!(loader.extract_calls.load(Ordering::SeqCst), 0);
    assert!(log.is_empty());
}

#[test]
fn primary_takes_caller_name() {
    let loader = ScriptedLoader::new(2);
    let container = MemoryContainer::new("/project");
    let consumer = Consumer::new();

    let loaded = load(
        &loader,
        &source(),
        "firmware",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &consumer,
        &TaskMonitor::new(),
    )
    .unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(container.file_names(), ["firmware", "firmware-part1"]);
    for l in &loaded {
        assert!(l.program.is_owned_by(&consumer));
        assert!(l.program.events_enabled());
        assert!(!l.program.has_transaction());
    }
    assert_eq!(loader.fixup_calls.load(Ordering::SeqCst), 1);
    assert!(loader.closed().is_empty());
}

#[test]
fn non_overriding_loader_saves_into_subfolder() {
    let mut loader = ScriptedLoader::new(2);
    loader.override_primary = false;
    let container = MemoryContainer::new("/project");

    load(
        &loader,
        &source(),
        "bundle",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap();

    assert!(container.file_names().is_empty());
    let folder = container.folder("bundle").unwrap();
    assert_eq!(folder.path(), "/project/bundle");
    assert_eq!(folder.file_names(), ["bundle", "bundle-part1"]);
}

#[test]
fn failed_save_is_isolated() {
    let loader = ScriptedLoader::new(3);
    let container = Arc::new(ScriptedContainer {
        reject: vec!["app-part1".to_string()],
        ..ScriptedContainer::plain()
    });
    let mut log = MessageLog::new();

    let loaded = load(
        &loader,
        &source(),
        "app",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut log,
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap();

    let names: Vec<&str> = loaded.iter().map(|l| l.program.name()).collect();
    assert_eq!(names, ["app", "app-part2"]);
    assert_eq!(container.file_names(), ["app", "app-part2"]);
    assert_eq!(loader.closed(), ["app-part1"]);
    assert_eq!(log.messages()[0], "Unexpected exception creating file: app-part1");
    assert!(log.messages()[1].contains("disk quota exceeded"));
}

#[test]
fn extraction_failure_propagates() {
    let mut loader = ScriptedLoader::new(2);
    loader.fail_extract = true;
    let container = ScriptedContainer::new();

    let err = load(
        &loader,
        &source(),
        "app",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap_err();

    assert!(matches!(err, LoaderError::Extraction(_)));
    assert!(err.to_string().contains("truncated header"));
    assert_eq!(container.create_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cancellation_after_first_save_releases_everything() {
    let loader = ScriptedLoader::new(2);
    let monitor = Arc::new(TaskMonitor::new());
    let container = Arc::new(ScriptedContainer {
        cancel_after_save: Some(Arc::clone(&monitor)),
        ..ScriptedContainer::plain()
    });

    let err = load(
        &loader,
        &source(),
        "app",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &Consumer::new(),
        &monitor,
    )
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(container.file_names(), ["app"]);
    assert_eq!(container.create_calls.load(Ordering::SeqCst), 1);
    let mut closed = loader.closed();
    closed.sort();
    assert_eq!(closed, ["app", "app-part1"]);
    assert_eq!(loader.fixup_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cancelled_before_start_saves_nothing() {
    let loader = ScriptedLoader::new(1);
    let container = ScriptedContainer::new();
    let monitor = TaskMonitor::new();
    monitor.cancel();

    let err = load(
        &loader,
        &source(),
        "app",
        Some(container.clone()),
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &Consumer::new(),
        &monitor,
    )
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(container.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(loader.closed(), ["app"]);
}

#[test]
fn programs_without_destination_stay_in_memory() {
    let loader = ScriptedLoader::new(2);
    let loaded = load(
        &loader,
        &source(),
        "app",
        None,
        &avr_spec(),
        &[],
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap();

    assert_eq!(loaded.len(), 2);
    assert!(loaded.iter().all(|l| l.destination.is_none()));
    // Register labels are always applied.
    let sreg: Vec<_> = loaded[0].program.symbol_table().symbols_named("SREG").collect();
    assert_eq!(sreg.len(), 1);
    assert!(sreg[0].pinned);
}

#[test]
fn non_boolean_label_option_is_rejected_before_loading() {
    let loader = ScriptedLoader::new(1);
    let container = ScriptedContainer::new();
    let options = vec![LoadOption::new(
        APPLY_LABELS_OPTION_NAME,
        OptionValue::String("yes".into()),
        OptionType::String,
    )];

    let message = validate_options(&options).unwrap_err();
    assert!(!message.is_empty());

    let err = load(
        &loader,
        &source(),
        "app",
        Some(container.clone()),
        &avr_spec(),
        &options,
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap_err();

    match err {
        LoaderError::InvalidOption(msg) => assert_eq!(msg, message),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(loader.extract_calls.load(Ordering::SeqCst), 0);
    assert_eq!(container.calls(), 0);
}

fn existing_program() -> (Program, Consumer) {
    let consumer = Consumer::new();
    let spec = avr_spec();
    let program = Program::new("target", spec.language, CompilerSpec::new("gcc"), &consumer);
    (program, consumer)
}

#[test]
fn load_into_commits_successful_merge() {
    let (mut program, _owner) = existing_program();
    let events = record_events(&mut program);
    let mut log = MessageLog::new();

    let merged = load_into(
        &BinaryLoader::new(),
        &MemoryByteProvider::new(vec![0x0cu8, 0x94, 0x34, 0x00]),
        &avr_spec(),
        &[],
        &mut log,
        &mut program,
        &TaskMonitor::new(),
    )
    .unwrap();

    assert!(merged);
    assert_eq!(program.memory().len(), 1);
    assert!(program.events_enabled());
    assert!(!program.has_transaction());
    assert_eq!(*events.lock().unwrap(), vec![ProgramEvent::Restored]);
}

#[test]
fn repeated_merges_append_distinct_blocks() {
    let (mut program, _owner) = existing_program();
    let mut log = MessageLog::new();
    let source = MemoryByteProvider::new(vec![0xffu8; 4]);

    for _ in 0..3 {
        let merged = load_into(
            &BinaryLoader::new(),
            &source,
            &avr_spec(),
            &[],
            &mut log,
            &mut program,
            &TaskMonitor::new(),
        )
        .unwrap();
        assert!(merged);
    }

    assert!(!log.has_messages());
    let blocks: Vec<(&str, u64)> = program
        .memory()
        .blocks()
        .iter()
        .map(|b| (b.name.as_str(), b.start.offset))
        .collect();
    assert_eq!(blocks, [("merged", 0), ("merged_1", 4), ("merged_2", 8)]);
}

#[test]
fn load_into_rolls_back_rejected_merge() {
    let (mut program, _owner) = existing_program();
    let mut log = MessageLog::new();

    let merged = load_into(
        &ScriptedLoader::new(1),
        &source(),
        &avr_spec(),
        &[],
        &mut log,
        &mut program,
        &TaskMonitor::new(),
    )
    .unwrap();

    assert!(!merged);
    assert!(program.property("Scripted Merge").is_none());
    assert!(program.events_enabled());
    assert_eq!(log.messages(), ["merge rejected"]);
}

#[test]
fn load_into_with_incomplete_spec_is_a_no_op() {
    let (mut program, _owner) = existing_program();
    let spec = avr_spec();
    let incomplete = LoadSpec::incomplete(spec.language, spec.compiler_spec);
    let merged = load_into(
        &BinaryLoader::new(),
        &source(),
        &incomplete,
        &[],
        &mut MessageLog::new(),
        &mut program,
        &TaskMonitor::new(),
    )
    .unwrap();
    assert!(!merged);
    assert!(program.memory().is_empty());
}

#[test]
fn default_options_list_both_label_flags() {
    let opts = default_options(false, COMMAND_LINE_ARG_PREFIX);
    let args: Vec<_> = opts.iter().filter_map(|o| o.arg.as_deref()).collect();
    assert_eq!(args, ["-loader-applyLabels", "-loader-anchorLabels"]);
}
