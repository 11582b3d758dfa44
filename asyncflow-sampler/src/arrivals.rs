//! Compound inter-arrival process driving the generator runtime (spec §4.2):
//! every `user_sampling_window` seconds, resample an active-user count `U` and
//! derive a Poisson rate `Λ = U · rpm / 60`; inside the window, draw gaps as
//! `Exp(Λ)` via inverse-CDF. Whether this behaves as "Poisson–Poisson" or
//! "Gaussian–Poisson" falls out of `active_users.distribution` (`poisson` or
//! `normal`) — the window-resampling logic itself is identical either way.

use crate::distributions;
use asyncflow_core::model::RVConfig;
use rand::Rng;

pub struct InterArrivalProcess {
    active_users: RVConfig,
    rpm_mean: f64,
    window_s: f64,
    horizon: f64,
    window_end: f64,
    lambda: f64,
}

impl InterArrivalProcess {
    pub fn new(active_users: RVConfig, rpm_mean: f64, window_s: f64, horizon: f64) -> Self {
        Self {
            active_users,
            rpm_mean,
            window_s: window_s.max(f64::EPSILON),
            horizon,
            // Forces a resample on the very first call: no window has been
            // entered yet at t=0.
            window_end: 0.0,
            lambda: 0.0,
        }
    }

    fn resample_window(&mut self, window_start: f64, rng: &mut impl Rng) {
        let active_users = distributions::sample(&self.active_users, rng);
        self.lambda = (active_users * self.rpm_mean / 60.0).max(0.0);
        self.window_end = window_start + self.window_s;
    }

    /// Advance from `now` to the next arrival's absolute time, or `None` once
    /// the simulation horizon is exceeded.
    pub fn next_arrival(&mut self, now: f64, rng: &mut impl Rng) -> Option<f64> {
        let mut t = now;
        loop {
            if t >= self.window_end {
                self.resample_window(t, rng);
            }
            if t > self.horizon {
                return None;
            }
            if self.lambda <= 0.0 {
                // "If Λ ≤ 0, jump to the next window."
                t = self.window_end;
                continue;
            }
            let u = rng.gen::<f64>().max(f64::EPSILON);
            let gap = -u.ln() / self.lambda;
            let candidate = t + gap;
            if candidate >= self.window_end {
                // Gap reaches or crosses the window boundary: advance to the
                // boundary and resample rather than returning this candidate.
                t = self.window_end;
                continue;
            }
            if candidate > self.horizon {
                return None;
            }
            return Some(candidate);
        }
    }
}
