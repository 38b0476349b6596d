use crate::domain::Signal;
use crate::engine::kernel::KernelEstimates;

/// Bars since an event, or `Never` if it has not happened yet.
///
/// `Never` compares as larger than any finite count, matching an infinite
/// counter: `Never > n` holds, `n > Never` and `Never > Never` do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recency {
    #[default]
    Never,
    Bars(usize),
}

impl Recency {
    pub fn reset(&mut self) {
        *self = Recency::Bars(0);
    }

    pub fn tick(&mut self) {
        if let Recency::Bars(n) = self {
            *n += 1;
        }
    }

    /// Strictly longer ago than `other`.
    pub fn older_than(self, other: Recency) -> bool {
        match (self, other) {
            (Recency::Never, Recency::Bars(_)) => true,
            (Recency::Bars(a), Recency::Bars(b)) => a > b,
            (_, Recency::Never) => false,
        }
    }
}

/// Forces a signal to neutral when the kernel turns against the last entry.
///
/// Entries count from the bar after a directional signal; exits count from
/// the bar after a kernel change event. A long is exited on a bearish kernel
/// change once the last bullish change is older than the last long entry,
/// and symmetrically for shorts.
#[derive(Debug, Clone, Default)]
pub struct DynamicExitManager {
    green_entry: Recency,
    red_entry: Recency,
    green_exit: Recency,
    red_exit: Recency,
    last_direction: Signal,
}

impl DynamicExitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply exits to a filtered signal series. Reads the input series only,
    /// so an exit at bar `i` never feeds back into the entry counters. Only a
    /// signal in the exited direction is dropped; a reversal on the exit bar
    /// survives.
    pub fn apply(signals: &[Signal], kernels: &KernelEstimates) -> Vec<Signal> {
        let mut manager = Self::new();
        let mut out = signals.to_vec();
        for i in 2..signals.len() {
            if manager.step(signals[i - 1], kernels, i) == Some(signals[i]) {
                out[i] = Signal::Neutral;
            }
        }
        out
    }

    /// Advance to bar `i` given the previous bar's filtered signal. Returns
    /// the direction being exited at `i`, if any.
    pub fn step(&mut self, previous: Signal, kernels: &KernelEstimates, i: usize) -> Option<Signal> {
        match previous {
            Signal::Long => {
                self.green_entry.reset();
                self.last_direction = Signal::Long;
            }
            Signal::Short => {
                self.red_entry.reset();
                self.last_direction = Signal::Short;
            }
            Signal::Neutral => {}
        }

        if kernels.bullish_change(i - 1) {
            self.green_exit.reset();
        }
        if kernels.bearish_change(i - 1) {
            self.red_exit.reset();
        }

        self.green_entry.tick();
        self.red_entry.tick();
        self.green_exit.tick();
        self.red_exit.tick();

        let long_exit = self.green_exit.older_than(self.green_entry);
        let short_exit = self.red_exit.older_than(self.red_entry);

        match self.last_direction {
            Signal::Long if kernels.bearish_change(i) && long_exit => Some(Signal::Long),
            Signal::Short if kernels.bullish_change(i) && short_exit => Some(Signal::Short),
            _ => None,
        }
    }
}
