//! Adaptive column-count controller for pinch gestures.
//!
//! Continuous pinch input is folded into discrete steps through the allowed
//! column counts. Fast gestures get a smaller threshold, a shorter debounce
//! interval and a bigger step, so a quick flick can jump several densities
//! while a slow pinch moves one column set at a time.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::{debug, trace};

use crate::config::GalleryConfig;

/// Recognizer phase carried by a pinch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchPhase {
    Began,
    Changed,
    Ended,
    Cancelled,
}

/// One pinch update. `scale` is relative to the previous event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchEvent {
    pub phase: PinchPhase,
    pub scale: f64,
    pub velocity: f64,
}

impl PinchEvent {
    pub fn began() -> Self {
        Self {
            phase: PinchPhase::Began,
            scale: 1.0,
            velocity: 0.0,
        }
    }

    pub fn changed(scale: f64, velocity: f64) -> Self {
        Self {
            phase: PinchPhase::Changed,
            scale,
            velocity,
        }
    }

    pub fn ended() -> Self {
        Self {
            phase: PinchPhase::Ended,
            scale: 1.0,
            velocity: 0.0,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            phase: PinchPhase::Cancelled,
            scale: 1.0,
            velocity: 0.0,
        }
    }
}

/// Step threshold and debounce interval for one velocity band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomParameters {
    /// Distance from 1.0 the accumulated scale must exceed.
    pub threshold: f64,
    /// Minimum time between two steps.
    pub min_interval: Duration,
}

/// `(upper bound, parameters)`; the last band is open-ended.
const VELOCITY_BANDS: [(f64, ZoomParameters); 4] = [
    (
        2.0,
        ZoomParameters {
            threshold: 0.15,
            min_interval: Duration::from_millis(400),
        },
    ),
    (
        4.0,
        ZoomParameters {
            threshold: 0.12,
            min_interval: Duration::from_millis(250),
        },
    ),
    (
        7.0,
        ZoomParameters {
            threshold: 0.08,
            min_interval: Duration::from_millis(150),
        },
    ),
    (
        f64::INFINITY,
        ZoomParameters {
            threshold: 0.05,
            min_interval: Duration::from_millis(80),
        },
    ),
];

/// Band lookup for an average gesture velocity.
pub fn parameters_for_velocity(velocity: f64) -> ZoomParameters {
    let velocity = if velocity.is_nan() { 0.0 } else { velocity.abs() };
    VELOCITY_BANDS
        .iter()
        .find(|(upper, _)| velocity < *upper)
        .map(|(_, params)| *params)
        .unwrap_or(VELOCITY_BANDS[VELOCITY_BANDS.len() - 1].1)
}

/// How many allowed column counts one step moves.
pub fn step_multiplier(average_velocity: f64) -> usize {
    if average_velocity <= 5.0 {
        1
    } else if average_velocity <= 8.0 {
        2
    } else {
        3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Tracking,
}

/// What one event did to the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomOutcome {
    pub previous_columns: u32,
    pub columns: u32,
    /// The event's scale was folded in; the recognizer should reset to 1.0.
    pub scale_consumed: bool,
    /// Band used for this update, if it was a tracked update.
    pub parameters: Option<ZoomParameters>,
}

impl ZoomOutcome {
    pub fn changed(&self) -> bool {
        self.previous_columns != self.columns
    }
}

/// Maps pinch deltas to a column count from a fixed ascending set.
#[derive(Debug, Clone)]
pub struct ColumnDensityController {
    allowed: Vec<u32>,
    index: usize,
    phase: GesturePhase,
    accumulated_scale: f64,
    last_change: Option<Instant>,
    velocities: VecDeque<f64>,
    window: usize,
}

impl ColumnDensityController {
    pub fn new(allowed: Vec<u32>, initial: u32, window: usize) -> Result<Self> {
        if allowed.is_empty() {
            bail!("allowed column counts must not be empty");
        }
        if allowed.windows(2).any(|w| w[0] >= w[1]) {
            bail!("allowed column counts must be strictly ascending: {:?}", allowed);
        }
        let Some(index) = allowed.iter().position(|&c| c == initial) else {
            bail!("initial column count {} is not one of {:?}", initial, allowed);
        };

        let window = window.max(1);
        Ok(Self {
            allowed,
            index,
            phase: GesturePhase::Idle,
            accumulated_scale: 1.0,
            last_change: None,
            velocities: VecDeque::with_capacity(window),
            window,
        })
    }

    pub fn from_config(config: &GalleryConfig) -> Result<Self> {
        Self::new(
            config.column_counts.clone(),
            config.initial_columns,
            config.velocity_window,
        )
    }

    pub fn columns(&self) -> u32 {
        self.allowed[self.index]
    }

    pub fn allowed(&self) -> &[u32] {
        &self.allowed
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn accumulated_scale(&self) -> f64 {
        self.accumulated_scale
    }

    pub fn last_change(&self) -> Option<Instant> {
        self.last_change
    }

    /// Mean of the recent velocity window, 0 when empty.
    pub fn average_velocity(&self) -> f64 {
        if self.velocities.is_empty() {
            return 0.0;
        }
        self.velocities.iter().sum::<f64>() / self.velocities.len() as f64
    }

    /// Feeds one pinch event observed at `now`.
    pub fn handle(&mut self, event: PinchEvent, now: Instant) -> ZoomOutcome {
        let previous_columns = self.columns();
        let mut outcome = ZoomOutcome {
            previous_columns,
            columns: previous_columns,
            scale_consumed: false,
            parameters: None,
        };

        match event.phase {
            PinchPhase::Began => {
                self.reset_gesture();
                self.phase = GesturePhase::Tracking;
                trace!(columns = previous_columns, "Pinch began");
            }
            PinchPhase::Ended | PinchPhase::Cancelled => {
                self.reset_gesture();
                self.phase = GesturePhase::Idle;
                trace!(columns = previous_columns, phase = ?event.phase, "Pinch finished");
            }
            PinchPhase::Changed => {
                if self.phase == GesturePhase::Idle {
                    trace!("Ignoring pinch update outside a gesture");
                    return outcome;
                }
                outcome.parameters = Some(self.update(event, now));
                outcome.scale_consumed = true;
                outcome.columns = self.columns();
            }
        }

        outcome
    }

    fn reset_gesture(&mut self) {
        self.accumulated_scale = 1.0;
        self.velocities.clear();
    }

    fn update(&mut self, event: PinchEvent, now: Instant) -> ZoomParameters {
        let velocity = if event.velocity.is_finite() {
            event.velocity.abs()
        } else {
            0.0
        };
        if self.velocities.len() == self.window {
            self.velocities.pop_front();
        }
        self.velocities.push_back(velocity);

        if event.scale.is_finite() && event.scale > 0.0 {
            self.accumulated_scale *= event.scale;
        }

        let average = self.average_velocity();
        let params = parameters_for_velocity(average);

        let debounced = match self.last_change {
            Some(last) => now.saturating_duration_since(last) <= params.min_interval,
            None => false,
        };
        if debounced {
            return params;
        }

        let step = step_multiplier(average);
        let target = if self.accumulated_scale > 1.0 + params.threshold {
            // Spreading fingers: fewer, larger cells.
            Some(self.index.checked_sub(step))
        } else if self.accumulated_scale < 1.0 - params.threshold {
            let next = self.index + step;
            Some((next < self.allowed.len()).then_some(next))
        } else {
            None
        };

        if let Some(target) = target {
            let from = self.columns();
            match target {
                Some(index) => self.index = index,
                None => trace!(columns = from, step, "Column step out of range, keeping"),
            }
            self.accumulated_scale = 1.0;
            self.last_change = Some(now);
            debug!(
                from,
                to = self.columns(),
                step,
                average_velocity = average,
                threshold = params.threshold,
                "Column density step"
            );
        }

        params
    }
}
