//! Append-only diagnostic log returned to the caller of a load.

use std::error::Error as StdError;
use std::fmt;
use tracing::warn;

use crate::error::cause_chain;

/// Ordered, non-failing accumulator of loader diagnostics.
///
/// Every message is also emitted as a `tracing` warning under the
/// `hoard::message_log` target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_msg(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "hoard::message_log", "{}", message);
        self.messages.push(message);
    }

    /// Append an error together with its full cause chain.
    pub fn append_exception(&mut self, err: &(dyn StdError + 'static)) {
        self.append_msg(cause_chain(err));
    }

    /// Append every message of another log, preserving order.
    pub fn copy_from(&mut self, other: &MessageLog) {
        self.messages.extend(other.messages.iter().cloned());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl fmt::Display for MessageLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.messages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", m)?;
        }
        Ok(())
    }
}
