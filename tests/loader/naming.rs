//! Collision handling when saving programs.

use hoard::core::language::CompilerSpec;
use hoard::core::program::{Consumer, Program};
use hoard::loader::container::{DirectoryContainer, MemoryContainer, ProgramContainer};
use hoard::loader::create_program_file;
use hoard::{MessageLog, TaskMonitor};
use std::sync::Arc;

use crate::common::*;

fn program(name: &str) -> Program {
    Program::new(name, Arc::new(avr_language()), CompilerSpec::new("gcc"), &Consumer::new())
}

fn save_twice(container: &dyn ProgramContainer) -> MessageLog {
    let monitor = TaskMonitor::new();
    let mut log = MessageLog::new();
    assert!(create_program_file(&program("first"), container, "foo", &mut log, &monitor).unwrap());
    assert!(create_program_file(&program("second"), container, "foo", &mut log, &monitor).unwrap());
    log
}

#[test]
fn second_foo_becomes_foo0_in_memory() {
    let container = MemoryContainer::new("/");
    let log = save_twice(container.as_ref());
    assert!(log.is_empty());
    assert_eq!(container.file_names(), ["foo", "foo0"]);
    assert_eq!(container.snapshot("foo").unwrap().unwrap().name, "first");
    assert_eq!(container.snapshot("foo0").unwrap().unwrap().name, "second");
}

#[test]
fn second_foo_becomes_foo0_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let container = DirectoryContainer::open(dir.path()).unwrap();
    save_twice(container.as_ref());
    assert_eq!(container.file_names(), ["foo", "foo0"]);
    assert_eq!(container.snapshot("foo").unwrap().name, "first");
    assert_eq!(container.snapshot("foo0").unwrap().name, "second");
}
