//! Record Status
//!
//! A status combines one core state (`EMPTY`, `READY`, `DESTROYED`,
//! `NON_EXISTENT`) with independent flags (`LOADING`, `COMMITTING`, `NEW`,
//! `DIRTY`, `OBSOLETE`).

use std::fmt;

use bitflags::bitflags;

use crate::reactive::Value;

bitflags! {
    /// Lifecycle bitmask shared by records and queries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        const EMPTY = 1;
        const READY = 2;
        const DESTROYED = 4;
        const NON_EXISTENT = 8;
        const LOADING = 16;
        const COMMITTING = 32;
        const NEW = 64;
        const DIRTY = 128;
        const OBSOLETE = 256;
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::empty()
    }
}

impl Status {
    /// The mutually exclusive core states.
    pub const CORE: Status = Status::EMPTY
        .union(Status::READY)
        .union(Status::DESTROYED)
        .union(Status::NON_EXISTENT);

    /// Flags that only make sense while a nested store holds local data.
    pub const LOCAL: Status = Status::NEW.union(Status::COMMITTING).union(Status::DIRTY);

    /// Flags a nested store mirrors from its parent.
    pub const INHERITED: Status = Status::OBSOLETE.union(Status::LOADING);

    /// The core state without flags.
    pub fn core(self) -> Status {
        self & Status::CORE
    }

    pub fn is_ready(self) -> bool {
        self.contains(Status::READY)
    }

    pub fn is_empty_record(self) -> bool {
        self.contains(Status::EMPTY)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        bitflags::parser::to_writer(self, f)
    }
}

impl From<Status> for Value {
    fn from(status: Status) -> Self {
        Value::Int(i64::from(status.bits()))
    }
}

impl From<&Value> for Status {
    fn from(value: &Value) -> Self {
        value
            .as_i64()
            .and_then(|bits| u32::try_from(bits).ok())
            .map(Status::from_bits_truncate)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_match_the_shared_vocabulary() {
        assert_eq!(Status::EMPTY.bits(), 1);
        assert_eq!(Status::NON_EXISTENT.bits(), 8);
        assert_eq!(Status::OBSOLETE.bits(), 256);
    }

    #[test]
    fn core_strips_flags() {
        let status = Status::READY | Status::DIRTY | Status::OBSOLETE;
        assert_eq!(status.core(), Status::READY);
        assert!(status.is_ready());
        assert_eq!(status - Status::LOCAL, Status::READY | Status::OBSOLETE);
    }

    #[test]
    fn display_names_every_flag() {
        let status = Status::READY | Status::LOADING;
        assert_eq!(status.to_string(), "READY | LOADING");
        assert_eq!(Status::empty().to_string(), "(none)");
    }

    #[test]
    fn value_conversion_round_trips_through_ints() {
        let value = Value::from(Status::EMPTY | Status::LOADING);
        assert_eq!(value, Value::Int(17));
        assert_eq!(Status::from(&value), Status::EMPTY | Status::LOADING);
        assert_eq!(Status::from(&Value::Undefined), Status::empty());
    }
}
