//! Per-item access instrumentation.

use std::fmt;

/// Outcome of a single read or write against a config item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Value read through the matching accessor.
    ReadOk,
    /// Value read through an accessor the kind does not support.
    ReadErr,
    /// Value changed.
    WriteOk,
    /// Write rejected (invalid value or wrong accessor).
    WriteErr,
    /// First successful write to a lazily created item.
    CreateOk,
    /// Loaded text could not be parsed for the item's kind.
    FormatErr,
}

impl Access {
    /// All outcomes in display order.
    pub const ALL: [Access; 6] = [
        Access::ReadOk,
        Access::ReadErr,
        Access::WriteOk,
        Access::WriteErr,
        Access::CreateOk,
        Access::FormatErr,
    ];

    /// Short label used in summaries.
    pub fn label(self) -> &'static str {
        match self {
            Access::ReadOk => "read_ok",
            Access::ReadErr => "read_err",
            Access::WriteOk => "write_ok",
            Access::WriteErr => "write_err",
            Access::CreateOk => "create_ok",
            Access::FormatErr => "format_err",
        }
    }
}

/// Tally of access outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounter {
    pub read_ok: u64,
    pub read_err: u64,
    pub write_ok: u64,
    pub write_err: u64,
    pub create_ok: u64,
    pub format_err: u64,
}

impl AccessCounter {
    /// Record one outcome.
    pub fn record(&mut self, access: Access) {
        *self.slot(access) += 1;
    }

    /// Count for one outcome.
    pub fn get(&self, access: Access) -> u64 {
        match access {
            Access::ReadOk => self.read_ok,
            Access::ReadErr => self.read_err,
            Access::WriteOk => self.write_ok,
            Access::WriteErr => self.write_err,
            Access::CreateOk => self.create_ok,
            Access::FormatErr => self.format_err,
        }
    }

    fn slot(&mut self, access: Access) -> &mut u64 {
        match access {
            Access::ReadOk => &mut self.read_ok,
            Access::ReadErr => &mut self.read_err,
            Access::WriteOk => &mut self.write_ok,
            Access::WriteErr => &mut self.write_err,
            Access::CreateOk => &mut self.create_ok,
            Access::FormatErr => &mut self.format_err,
        }
    }

    /// Total reads, successful or not.
    pub fn reads(&self) -> u64 {
        self.read_ok + self.read_err
    }

    /// Total successful writes, including creation.
    pub fn writes(&self) -> u64 {
        self.write_ok + self.create_ok
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        Access::ALL.iter().all(|a| self.get(*a) == 0)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for AccessCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for access in Access::ALL {
            let n = self.get(access);
            if n == 0 {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={n}", access.label())?;
            first = false;
        }
        Ok(())
    }
}
