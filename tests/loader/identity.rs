//! Content identity recorded on new programs.

use hoard::core::address::Address;
use hoard::core::language::CompilerSpec;
use hoard::core::program::{info_keys, Consumer};
use hoard::io::{FileByteProvider, Fsrl};
use hoard::loader::create_program;
use std::sync::Arc;

use crate::common::test_utils::create_temp_file;
use crate::common::*;

const PRECOMPUTED_MD5: &str = "00112233445566778899aabbccddeeff";

#[test]
fn precomputed_md5_is_reused_and_sha256_is_not() {
    let fsrl = Fsrl::from_path("/fw/boot.bin").with_md5(PRECOMPUTED_MD5);
    let provider = CountingProvider::new(FOX, Some(fsrl.clone()));

    let program = create_program(
        &provider,
        "fallback",
        None,
        None,
        Arc::new(avr_language()),
        CompilerSpec::new("gcc"),
        &Consumer::new(),
    )
    .unwrap();

    // One pass for SHA-256, none for MD5.
    assert_eq!(provider.streams(), 1);
    assert_eq!(program.executable_md5(), Some(PRECOMPUTED_MD5));
    assert_eq!(program.executable_sha256(), Some(FOX_SHA256));
    assert_eq!(program.source_fsrl(), Some(fsrl.to_string().as_str()));
}

#[test]
fn missing_md5_is_computed_and_recorded_in_locator() {
    let provider = CountingProvider::new(FOX, Some(Fsrl::from_path("/fw/boot.bin")));

    let program = create_program(
        &provider,
        "fallback",
        None,
        None,
        Arc::new(avr_language()),
        CompilerSpec::new("gcc"),
        &Consumer::new(),
    )
    .unwrap();

    assert_eq!(provider.streams(), 2);
    assert_eq!(program.executable_md5(), Some(FOX_MD5));
    let stored: Fsrl = program.source_fsrl().unwrap().parse().unwrap();
    assert_eq!(stored.md5(), Some(FOX_MD5));
    assert_eq!(stored.path(), "/fw/boot.bin");
}

#[test]
fn identity_round_trips_from_file() {
    let file = create_temp_file(FOX);
    let provider = FileByteProvider::open(file.path()).unwrap();
    let expected_path = std::fs::canonicalize(file.path()).unwrap();
    let language = Arc::new(avr_language());
    let base = Address::new(language.default_address_space().unwrap(), 0x100).unwrap();

    let program = create_program(
        &provider,
        "fallback",
        Some(base.clone()),
        Some("Intel Hex"),
        Arc::clone(&language),
        CompilerSpec::new("gcc"),
        &Consumer::new(),
    )
    .unwrap();

    assert_eq!(program.executable_path(), Some(expected_path.to_str().unwrap()));
    assert_eq!(program.executable_format(), Some("Intel Hex"));
    assert_eq!(program.executable_md5(), Some(FOX_MD5));
    assert_eq!(program.executable_sha256(), Some(FOX_SHA256));
    assert_eq!(program.image_base(), Some(&base));
    assert_eq!(
        program.name(),
        expected_path.file_name().unwrap().to_str().unwrap()
    );
    assert!(program.property(info_keys::DATE_CREATED).is_some());
}

#[test]
fn source_without_locator_uses_fallback_name() {
    let provider = CountingProvider::new(FOX, None);
    let program = create_program(
        &provider,
        "fallback",
        None,
        Some("Raw Binary"),
        Arc::new(avr_language()),
        CompilerSpec::new("gcc"),
        &Consumer::new(),
    )
    .unwrap();

    assert_eq!(program.name(), "fallback");
    assert!(program.source_fsrl().is_none());
    assert!(program.executable_path().is_none());
    assert_eq!(program.executable_md5(), Some(FOX_MD5));
}
