//! The simulated clock.
//!
//! Time is minutes since midnight, wrapping at 1440. The clock never owns
//! a timer: the caller feeds it elapsed real seconds and a speed factor
//! decides how many simulated minutes that is worth. A separate monotonic
//! total is kept for debounce logic, immune to the midnight wrap.

/// Minutes in one simulated day.
pub const MINUTES_PER_DAY: f32 = 1440.0;

#[derive(Debug, Clone)]
pub struct SimClock {
    /// Minutes since midnight, in [0, 1440).
    minutes: f32,
    /// Total simulated minutes since live mode started. Monotonic.
    total_minutes: f64,
    /// Whether ticks advance time.
    playing: bool,
    /// Simulated minutes per real second.
    speed: f32,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            minutes: 8.0 * 60.0, // simulations start at 08:00
            total_minutes: 0.0,
            playing: false,
            speed: 60.0,
        }
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `elapsed_secs` real seconds and returns the
    /// simulated minutes covered. Returns 0 while paused.
    pub fn tick(&mut self, elapsed_secs: f32) -> f32 {
        if !self.playing || elapsed_secs <= 0.0 {
            return 0.0;
        }
        let dt_min = elapsed_secs * self.speed;
        self.minutes = (self.minutes + dt_min) % MINUTES_PER_DAY;
        self.total_minutes += dt_min as f64;
        dt_min
    }

    /// Minutes since midnight, in [0, 1440).
    pub fn minutes(&self) -> f32 {
        self.minutes
    }

    /// Monotonic total simulated minutes since the clock was last reset.
    pub fn total_minutes(&self) -> f64 {
        self.total_minutes
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Jumps to a time of day without touching the monotonic total.
    pub fn seek(&mut self, minutes: f32) {
        self.minutes = minutes.rem_euclid(MINUTES_PER_DAY);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Sets the speed in simulated minutes per real second. Non-positive
    /// values are ignored.
    pub fn set_speed(&mut self, speed: f32) {
        if speed > 0.0 {
            self.speed = speed;
        }
    }

    /// Restarts at the given time of day with the total zeroed.
    pub fn reset(&mut self, minutes: f32) {
        self.minutes = minutes.rem_euclid(MINUTES_PER_DAY);
        self.total_minutes = 0.0;
    }

    /// Time of day formatted as `HH:MM`.
    pub fn formatted(&self) -> String {
        let m = self.minutes as u32;
        format!("{:02}:{:02}", m / 60, m % 60)
    }
}
