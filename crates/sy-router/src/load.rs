//! Load Monitor - utilization, blended system load and threshold hysteresis

use sy_common::{LoadConfig, LoadSignal};

/// Band the monitor currently believes the system is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLevel {
    Normal,
    High,
    Critical,
}

pub struct LoadMonitor {
    config: LoadConfig,
    level: LoadLevel,
    utilization: f64,
    system_load: f64,
}

impl LoadMonitor {
    pub fn new(config: LoadConfig) -> Self {
        Self {
            config,
            level: LoadLevel::Normal,
            utilization: 0.0,
            system_load: 0.0,
        }
    }

    /// Fraction of online worker capacity in use.
    ///
    /// With no online capacity this is 0 when idle and 1 when anything is
    /// still active.
    pub fn compute_utilization(&mut self, active: usize, online_capacity: u64) -> f64 {
        self.utilization = if online_capacity == 0 {
            if active == 0 { 0.0 } else { 1.0 }
        } else {
            active as f64 / online_capacity as f64
        };
        self.utilization
    }

    /// Weighted blend of utilization and queue pressure.
    pub fn compute_system_load(&mut self, utilization: f64, queued: usize, queue_capacity: usize) -> f64 {
        let pressure = if queue_capacity == 0 {
            0.0
        } else {
            queued as f64 / queue_capacity as f64
        };
        let wu = self.config.utilization_weight;
        let wq = self.config.queue_weight;
        self.system_load = (wu * utilization + wq * pressure) / (wu + wq);
        self.system_load
    }

    /// Advance the hysteresis state machine, returning a signal only on a
    /// transition that callers must act on.
    ///
    /// Leaving a band requires dropping below its entry threshold minus the
    /// hysteresis, so jitter around a threshold never re-fires a signal.
    pub fn check_thresholds(&mut self, load: f64) -> Option<LoadSignal> {
        let high = self.config.high_threshold;
        let critical = self.config.critical_threshold;
        let eps = self.config.hysteresis;

        let (next, signal) = match self.level {
            LoadLevel::Normal if load >= critical => (LoadLevel::Critical, Some(LoadSignal::CriticalLoad)),
            LoadLevel::Normal if load >= high => (LoadLevel::High, Some(LoadSignal::HighLoad)),
            LoadLevel::High if load >= critical => (LoadLevel::Critical, Some(LoadSignal::CriticalLoad)),
            LoadLevel::High | LoadLevel::Critical if load < high - eps => {
                (LoadLevel::Normal, Some(LoadSignal::Recovered))
            }
            // Step down quietly; HighLoad already fired on the way up
            LoadLevel::Critical if load < critical - eps => (LoadLevel::High, None),
            level => (level, None),
        };
        self.level = next;
        signal
    }

    pub fn level(&self) -> LoadLevel {
        self.level
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn system_load(&self) -> f64 {
        self.system_load
    }
}
