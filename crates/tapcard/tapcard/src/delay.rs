//! Security delay display policy
//!
//! The session reports every remaining-delay value the card sends. Whether and how to show a
//! countdown is decided here, so shells only render what [`DelayCountdown`] tells them.

/// Below this first report no countdown is shown
pub const DELAY_DISPLAY_FLOOR_MS: u32 = 5_000;

/// What a shell should render after a delay report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayDisplay {
    /// Render nothing
    Hidden,
    /// Render a countdown with this many milliseconds left
    Countdown(u32),
}

/// Countdown state for one card operation
///
/// Visibility is decided once, at the first report. The displayed value never increases, with
/// one exception: when the shell started from an estimate and the card's first measurement is
/// larger, the countdown is re-based to the measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayCountdown {
    floor_ms: u32,
    estimate_ms: Option<u32>,
    visible: Option<bool>,
    displayed_ms: Option<u32>,
}

impl Default for DelayCountdown {
    fn default() -> Self {
        Self::new(DELAY_DISPLAY_FLOOR_MS)
    }
}

impl DelayCountdown {
    /// Countdown with a display floor
    pub const fn new(floor_ms: u32) -> Self {
        Self {
            floor_ms,
            estimate_ms: None,
            visible: None,
            displayed_ms: None,
        }
    }

    /// Start from an optimistic estimate, such as the card's configured pause before PIN2
    pub const fn with_estimate(mut self, estimate_ms: u32) -> Self {
        self.estimate_ms = Some(estimate_ms);
        self
    }

    /// Value shown before the card reported anything
    pub const fn initial(&self) -> DelayDisplay {
        match self.estimate_ms {
            Some(estimate) if estimate >= self.floor_ms => DelayDisplay::Countdown(estimate),
            _ => DelayDisplay::Hidden,
        }
    }

    /// Feed one card report
    pub fn report(&mut self, remaining_ms: u32) -> DelayDisplay {
        let visible = *self.visible.get_or_insert(remaining_ms >= self.floor_ms);

        let displayed = match self.displayed_ms {
            None => match self.estimate_ms {
                Some(estimate) if remaining_ms > estimate => remaining_ms,
                Some(estimate) => remaining_ms.min(estimate),
                None => remaining_ms,
            },
            Some(previous) => previous.min(remaining_ms),
        };
        self.displayed_ms = Some(displayed);

        if visible {
            DelayDisplay::Countdown(displayed)
        } else {
            DelayDisplay::Hidden
        }
    }

    /// Whether the countdown is shown, once decided
    pub const fn is_visible(&self) -> Option<bool> {
        self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_decides_visibility() {
        let mut shown = DelayCountdown::new(5_000);
        assert_eq!(shown.report(6_000), DelayDisplay::Countdown(6_000));

        let mut hidden = DelayCountdown::new(5_000);
        assert_eq!(hidden.report(3_000), DelayDisplay::Hidden);
        assert_eq!(hidden.report(9_000), DelayDisplay::Hidden);
        assert_eq!(hidden.is_visible(), Some(false));
    }

    #[test]
    fn test_monotonic_after_first_report() {
        let mut countdown = DelayCountdown::default();
        assert_eq!(countdown.report(9_000), DelayDisplay::Countdown(9_000));
        assert_eq!(countdown.report(8_000), DelayDisplay::Countdown(8_000));
        assert_eq!(countdown.report(8_500), DelayDisplay::Countdown(8_000));
        assert_eq!(countdown.report(1_000), DelayDisplay::Countdown(1_000));
    }

    #[test]
    fn test_single_upward_rebase_from_estimate() {
        let mut countdown = DelayCountdown::default().with_estimate(10_000);
        assert_eq!(countdown.initial(), DelayDisplay::Countdown(10_000));
        assert_eq!(countdown.report(15_000), DelayDisplay::Countdown(15_000));
        assert_eq!(countdown.report(20_000), DelayDisplay::Countdown(15_000));
        assert_eq!(countdown.report(14_000), DelayDisplay::Countdown(14_000));
    }
}
