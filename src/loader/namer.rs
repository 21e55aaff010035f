//! Saving programs under collision-free names.

use tracing::{info, warn};

use crate::core::program::Program;
use crate::error::{cause_chain, LoaderError, Result};
use crate::loader::container::ProgramContainer;
use crate::loader::message_log::MessageLog;
use crate::loader::monitor::TaskMonitor;

/// Save `program` into `container` as `name`, or `name0`, `name1`, ... when
/// the name is taken.
///
/// Returns `Ok(false)` after logging when storage fails for any other
/// reason; the caller then releases the program. Cancellation is checked
/// before every attempt and returned as `Err(LoaderError::Cancelled)`.
pub fn create_program_file(
    program: &Program,
    container: &dyn ProgramContainer,
    name: &str,
    log: &mut MessageLog,
    monitor: &TaskMonitor,
) -> Result<bool> {
    let mut unique_name = name.to_string();
    let mut index: u64 = 0;
    loop {
        monitor.check_cancelled()?;
        match container.create_file(&unique_name, program, monitor) {
            Ok(()) => {
                info!(container = %container.path(), name = %unique_name, "Saved program");
                return Ok(true);
            }
            Err(LoaderError::DuplicateName(_)) => {
                unique_name = format!("{}{}", name, index);
                index += 1;
            }
            Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
            Err(e) => {
                warn!(
                    name = %unique_name,
                    error = %cause_chain(&e),
                    "Failed to create program file"
                );
                log.append_msg(format!("Unexpected exception creating file: {}", unique_name));
                log.append_exception(&e);
                return Ok(false);
            }
        }
    }
}
