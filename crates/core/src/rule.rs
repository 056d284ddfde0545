use std::num::NonZeroU32;

/// An error that occurs when a defect rule is built from invalid values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    /// The step must be `-1` (disabled) or a non-negative number.
    #[error("invalid step for {kind}: {value} (expected -1 or a value >= 0)")]
    Step {
        /// The defect the value was meant for.
        kind: DefectKind,
        /// The rejected value.
        value: i64,
    },
    /// The count must be at least one.
    #[error("invalid count for {kind}: {value} (expected a value >= 1)")]
    Count {
        /// The defect the value was meant for.
        kind: DefectKind,
        /// The rejected value.
        value: i64,
    },
}

/// The kinds of defect the pipeline can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
    /// An input packet is never handed to the decoder.
    DropInputPacket,
    /// An encoded packet is never handed to the muxer.
    DropOutputPacket,
    /// The presentation timestamp of a frame is rewritten before encoding.
    PtsDrop,
    /// A decoded frame is interpreted with the wrong pixel format.
    ChangePixelFormat,
}

impl DefectKind {
    /// All kinds, in pipeline order.
    pub const ALL: [DefectKind; 4] = [
        DefectKind::DropInputPacket,
        DefectKind::ChangePixelFormat,
        DefectKind::PtsDrop,
        DefectKind::DropOutputPacket,
    ];

    /// The name used for the `--<name>_step` / `--<name>_count` flag pair.
    pub const fn as_str(self) -> &'static str {
        match self {
            DefectKind::DropInputPacket => "drop_input_packet",
            DefectKind::DropOutputPacket => "drop_output_packet",
            DefectKind::PtsDrop => "pts_drop",
            DefectKind::ChangePixelFormat => "change_pixel_format",
        }
    }
}

impl std::fmt::Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When and how often a defect fires.
///
/// A rule waits `activation_offset` queries, then fires `repeat_count`
/// queries in a row, then starts over. A rule without an offset never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectRule {
    activation_offset: Option<u32>,
    repeat_count: NonZeroU32,
}

impl Default for DefectRule {
    fn default() -> Self {
        Self::DISABLED
    }
}

impl DefectRule {
    /// A rule that never fires.
    pub const DISABLED: DefectRule = DefectRule {
        activation_offset: None,
        repeat_count: NonZeroU32::MIN,
    };

    /// Creates an enabled rule.
    pub const fn enabled(activation_offset: u32, repeat_count: NonZeroU32) -> Self {
        Self {
            activation_offset: Some(activation_offset),
            repeat_count,
        }
    }

    /// Builds a rule from the raw `step` / `count` pair, where a step of `-1` disables the rule.
    pub fn new(kind: DefectKind, step: i64, count: i64) -> Result<Self, RuleError> {
        let repeat_count = u32::try_from(count)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(RuleError::Count { kind, value: count })?;

        let activation_offset = match step {
            -1 => None,
            step => Some(u32::try_from(step).map_err(|_| RuleError::Step { kind, value: step })?),
        };

        Ok(Self {
            activation_offset,
            repeat_count,
        })
    }

    /// The number of passing queries before the rule starts firing, `None` when disabled.
    pub const fn activation_offset(&self) -> Option<u32> {
        self.activation_offset
    }

    /// The number of consecutive firings per cycle.
    pub const fn repeat_count(&self) -> NonZeroU32 {
        self.repeat_count
    }

    /// Returns true if the rule can ever fire.
    pub const fn is_enabled(&self) -> bool {
        self.activation_offset.is_some()
    }
}

/// One rule per defect kind. Immutable once the pipeline starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct DefectRuleSet {
    #[builder(default)]
    drop_input_packet: DefectRule,
    #[builder(default)]
    drop_output_packet: DefectRule,
    #[builder(default)]
    pts_drop: DefectRule,
    #[builder(default)]
    change_pixel_format: DefectRule,
}

impl DefectRuleSet {
    /// Returns the rule configured for `kind`.
    pub const fn get(&self, kind: DefectKind) -> DefectRule {
        match kind {
            DefectKind::DropInputPacket => self.drop_input_packet,
            DefectKind::DropOutputPacket => self.drop_output_packet,
            DefectKind::PtsDrop => self.pts_drop,
            DefectKind::ChangePixelFormat => self.change_pixel_format,
        }
    }

    /// Returns a copy with the rule for `kind` replaced.
    pub fn with(mut self, kind: DefectKind, rule: DefectRule) -> Self {
        match kind {
            DefectKind::DropInputPacket => self.drop_input_packet = rule,
            DefectKind::DropOutputPacket => self.drop_output_packet = rule,
            DefectKind::PtsDrop => self.pts_drop = rule,
            DefectKind::ChangePixelFormat => self.change_pixel_format = rule,
        }

        self
    }
}
