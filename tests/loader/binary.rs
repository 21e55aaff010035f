//! The raw binary loader driven through the full protocol.

use hoard::core::program::info_keys;
use hoard::loader::binary::{BASE_ADDRESS_OPTION_NAME, BINARY_FORMAT};
use hoard::loader::container::{DirectoryContainer, ProgramContainer};
use hoard::loader::options::{parse_option_args, APPLY_LABELS_OPTION_NAME};
use hoard::loader::{load, OptionValue, ProgramLoader};
use hoard::{BinaryLoader, ByteProvider, Consumer, LoaderConfig, MessageLog, TaskMonitor};

use crate::common::test_utils::{create_patterned_file, create_temp_file};
use crate::common::*;

#[test]
fn loads_file_into_directory_container() {
    let file = create_temp_file(FOX);
    let loader = BinaryLoader::new();
    let provider = loader.open_source(file.path()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let container = DirectoryContainer::open(dir.path()).unwrap();
    let spec = avr_spec();

    let mut options = loader.default_options(&provider, &spec, false);
    let args: Vec<String> = ["-loader-applyLabels", "true", "-loader-baseAddr", "256"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    parse_option_args(&args, &mut options, "-loader").unwrap();
    assert_eq!(
        options.iter().find(|o| o.name == BASE_ADDRESS_OPTION_NAME).unwrap().value,
        OptionValue::Int(256)
    );

    let consumer = Consumer::new();
    let mut log = MessageLog::new();
    for _ in 0..2 {
        let loaded = load(
            &loader,
            &provider,
            "fox",
            Some(container.clone()),
            &spec,
            &options,
            &mut log,
            &consumer,
            &TaskMonitor::new(),
        )
        .unwrap();
        assert_eq!(loaded.len(), 1);
    }

    assert!(log.is_empty());
    assert_eq!(container.file_names(), ["fox", "fox0"]);
    let snapshot = container.snapshot("fox").unwrap();
    assert_eq!(snapshot.properties[info_keys::EXECUTABLE_FORMAT], BINARY_FORMAT);
    assert_eq!(snapshot.properties[info_keys::EXECUTABLE_MD5], FOX_MD5);
    assert_eq!(snapshot.blocks.len(), 1);
    assert_eq!(snapshot.blocks[0].start.offset, 0x100);
    assert_eq!(snapshot.blocks[0].length, provider.len());
    assert!(snapshot.symbols.iter().any(|s| s.name == "RESET" && s.pinned));
    assert!(!snapshot.analyzed);
}

#[test]
fn configured_labels_apply_without_options() {
    let mut config = LoaderConfig::default();
    config.labels.apply_by_default = true;
    let loader = BinaryLoader::with_config(config);
    let provider = hoard::MemoryByteProvider::new(FOX);
    let spec = avr_spec();
    let options = loader.default_options(&provider, &spec, false);
    assert!(options
        .iter()
        .any(|o| o.name == APPLY_LABELS_OPTION_NAME && o.value == OptionValue::Bool(true)));

    let loaded = load(
        &loader,
        &provider,
        "fox",
        None,
        &spec,
        &options,
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    )
    .unwrap();
    let table = loaded[0].program.symbol_table();
    assert!(table.symbols_named("RESET").next().is_some());
}

#[test]
fn file_size_limit_comes_from_config() {
    let file = create_patterned_file(4096);
    let mut config = LoaderConfig::default();
    config.io.max_file_size = 1024;
    let err = BinaryLoader::with_config(config).open_source(file.path()).unwrap_err();
    assert!(err.to_string().contains("exceeds the maximum"));
}

#[test]
fn oversized_image_is_an_extraction_error() {
    // 64KB of ram cannot hold 0x10000 bytes above base 0x100.
    let file = create_patterned_file(0x10000);
    let loader = BinaryLoader::new();
    let provider = loader.open_source(file.path()).unwrap();
    let spec = avr_spec();
    let mut options = loader.default_options(&provider, &spec, false);
    for o in &mut options {
        if o.name == BASE_ADDRESS_OPTION_NAME {
            o.value = OptionValue::Int(0x100);
        }
    }
    let dir = tempfile::tempdir().unwrap();
    let container = DirectoryContainer::open(dir.path()).unwrap();

    let result = load(
        &loader,
        &provider,
        "big",
        Some(container.clone()),
        &spec,
        &options,
        &mut MessageLog::new(),
        &Consumer::new(),
        &TaskMonitor::new(),
    );
    assert!(result.is_err());
    assert!(container.file_names().is_empty());
}
