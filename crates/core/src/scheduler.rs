use crate::rule::{DefectKind, DefectRule, DefectRuleSet};

/// The outcome of a single scheduler query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The defect does not apply to the current unit.
    Pass,
    /// The defect applies to the current unit.
    Fire {
        /// How many times the rule already fired in the current active cycle.
        fired_before: u32,
    },
}

impl Decision {
    /// Returns true if the defect applies.
    pub const fn fires(self) -> bool {
        matches!(self, Decision::Fire { .. })
    }
}

/// A countdown state machine deciding when a [`DefectRule`] fires.
///
/// While counting down each query passes and decrements the offset; the query
/// that reaches zero still passes. After that every query fires and consumes
/// one repeat. Once the repeats are used up the state is reloaded from the
/// rule and the cycle starts over. A disabled rule never fires and the state
/// never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectScheduler {
    rule: DefectRule,
    offset_remaining: u32,
    repeats_remaining: u32,
}

impl DefectScheduler {
    /// Creates a scheduler in the counting down phase of its first cycle.
    pub const fn new(rule: DefectRule) -> Self {
        Self {
            rule,
            offset_remaining: match rule.activation_offset() {
                Some(offset) => offset,
                None => 0,
            },
            repeats_remaining: rule.repeat_count().get(),
        }
    }

    /// The rule this scheduler was built from.
    pub const fn rule(&self) -> DefectRule {
        self.rule
    }

    /// Queries left until the rule becomes active.
    pub const fn offset_remaining(&self) -> u32 {
        self.offset_remaining
    }

    /// Firings left in the current cycle.
    pub const fn repeats_remaining(&self) -> u32 {
        self.repeats_remaining
    }

    /// Decides whether the defect applies to the current unit and advances the state.
    pub fn query(&mut self) -> Decision {
        let Some(offset) = self.rule.activation_offset() else {
            return Decision::Pass;
        };

        if self.offset_remaining > 0 {
            self.offset_remaining -= 1;
            return Decision::Pass;
        }

        let repeat_count = self.rule.repeat_count().get();
        let fired_before = repeat_count - self.repeats_remaining;

        self.repeats_remaining -= 1;
        if self.repeats_remaining == 0 {
            self.offset_remaining = offset;
            self.repeats_remaining = repeat_count;
        }

        Decision::Fire { fired_before }
    }
}

/// The four independent schedulers, one per [`DefectKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectSchedulers {
    drop_input_packet: DefectScheduler,
    drop_output_packet: DefectScheduler,
    pts_drop: DefectScheduler,
    change_pixel_format: DefectScheduler,
}

impl DefectSchedulers {
    /// Creates fresh schedulers for every rule in the set.
    pub const fn new(rules: &DefectRuleSet) -> Self {
        Self {
            drop_input_packet: DefectScheduler::new(rules.get(DefectKind::DropInputPacket)),
            drop_output_packet: DefectScheduler::new(rules.get(DefectKind::DropOutputPacket)),
            pts_drop: DefectScheduler::new(rules.get(DefectKind::PtsDrop)),
            change_pixel_format: DefectScheduler::new(rules.get(DefectKind::ChangePixelFormat)),
        }
    }

    /// Returns the scheduler for `kind`.
    pub const fn get(&self, kind: DefectKind) -> &DefectScheduler {
        match kind {
            DefectKind::DropInputPacket => &self.drop_input_packet,
            DefectKind::DropOutputPacket => &self.drop_output_packet,
            DefectKind::PtsDrop => &self.pts_drop,
            DefectKind::ChangePixelFormat => &self.change_pixel_format,
        }
    }

    fn get_mut(&mut self, kind: DefectKind) -> &mut DefectScheduler {
        match kind {
            DefectKind::DropInputPacket => &mut self.drop_input_packet,
            DefectKind::DropOutputPacket => &mut self.drop_output_packet,
            DefectKind::PtsDrop => &mut self.pts_drop,
            DefectKind::ChangePixelFormat => &mut self.change_pixel_format,
        }
    }

    /// Queries the scheduler for `kind`. Other kinds are left untouched.
    pub fn query(&mut self, kind: DefectKind) -> Decision {
        let decision = self.get_mut(kind).query();

        if let Decision::Fire { fired_before } = decision {
            tracing::debug!(defect = %kind, fired_before, "defect fired");
        }

        decision
    }
}
