//! Reassembly configuration.
//!
//! A [`ReassemblyConfig`] is an immutable value handed to
//! [`crate::BatchReassembler::new`] or [`crate::consume`]. The defaults favour
//! throughput: cells are zero-copy views into the batch buffers and empty cells
//! are stored as delivered.

/// How grid cells hold on to their values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueMode {
    /// Cells are slices of the batch buffer they arrived in. The buffer stays
    /// allocated for as long as any cell from it is alive.
    #[default]
    View,
    /// Cells are copied out of the batch as it is consumed so the batch buffer
    /// is released immediately.
    Copy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReassemblyConfig {
    pub value_mode: ValueMode,
    /// Fail with [`crate::ReassemblyError::EmptyCell`] instead of storing an
    /// empty sequence.
    pub reject_empty_cells: bool,
}

impl ReassemblyConfig {
    /// Zero-copy views, empty cells kept.
    pub const fn new() -> Self {
        Self {
            value_mode: ValueMode::View,
            reject_empty_cells: false,
        }
    }

    /// Shorthand for a config that copies every cell.
    pub const fn copying() -> Self {
        Self::new().with_value_mode(ValueMode::Copy)
    }

    /// Sets how cells hold on to their values.
    #[must_use]
    pub const fn with_value_mode(mut self, value_mode: ValueMode) -> Self {
        self.value_mode = value_mode;
        self
    }

    #[must_use]
    pub const fn with_reject_empty_cells(mut self, reject: bool) -> Self {
        self.reject_empty_cells = reject;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        assert_eq!(ReassemblyConfig::new(), ReassemblyConfig::default());
        let config = ReassemblyConfig::copying().with_reject_empty_cells(true);
        assert_eq!(config.value_mode, ValueMode::Copy);
        assert!(config.reject_empty_cells);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_config_fills_defaults() {
        let config: ReassemblyConfig = serde_json::from_str(r#"{"value_mode":"copy"}"#).unwrap();
        assert_eq!(config, ReassemblyConfig::copying());

        let json = serde_json::to_string(&ReassemblyConfig::new()).unwrap();
        assert_eq!(json, r#"{"value_mode":"view","reject_empty_cells":false}"#);
    }
}
