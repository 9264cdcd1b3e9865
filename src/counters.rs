use crate::compartment::CompartmentId;
use stats::OnlineStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerCounts {
    pub deaths: u64,
    pub tests: u64,
    pub infections: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmissionRoutes {
    pub town_to_town: u64,
    pub town_to_village: u64,
    pub village_to_town: u64,
    pub village_to_village: u64,
}

impl TransmissionRoutes {
    pub fn record(&mut self, from: CompartmentId, to: CompartmentId) {
        match (from.is_town(), to.is_town()) {
            (true, true) => self.town_to_town += 1,
            (true, false) => self.town_to_village += 1,
            (false, true) => self.village_to_town += 1,
            (false, false) => self.village_to_village += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.town_to_town + self.town_to_village + self.village_to_town + self.village_to_village
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    pub infections: u64,
    pub adjusted_infections: u64,
    pub current_infections: u64,
    pub new_infections: u64,
    pub ill: u64,
    pub deaths: u64,
    pub deaths_town: u64,
    pub deaths_village: u64,
    pub new_deaths: u64,
    pub recoveries: u64,
    pub quarantines: u64,
    pub tests: u64,
    pub tests_town: u64,
    pub tests_village: u64,
    pub new_tests: u64,
    /// Detected seroconversions, net of those that decayed below detection.
    pub seroconversions: u64,
    pub seroconversions_town: u64,
    pub seroconversions_village: u64,
    /// Seroconversions whether or not they were detectable.
    pub conversions: u64,
    pub vulnerable_town: u64,
    pub vulnerable_village: u64,
    pub infectious: u64,
    pub routes: TransmissionRoutes,
}

impl Counters {
    pub fn start_day(&mut self) {
        self.new_infections = 0;
        self.new_deaths = 0;
        self.new_tests = 0;
        self.infectious = 0;
        self.routes = TransmissionRoutes::default();
    }

    pub fn triggers(&self) -> TriggerCounts {
        TriggerCounts {
            deaths: self.deaths,
            tests: self.tests,
            infections: self.infections,
        }
    }

    pub fn record_infection(&mut self) {
        self.infections += 1;
        self.adjusted_infections += 1;
        self.current_infections += 1;
        self.new_infections += 1;
    }

    pub fn record_death(&mut self, compartment: CompartmentId) {
        self.deaths += 1;
        self.new_deaths += 1;
        self.current_infections = self.current_infections.saturating_sub(1);
        if compartment.is_town() {
            self.deaths_town += 1;
        } else {
            self.deaths_village += 1;
        }
    }

    pub fn record_recovery(&mut self) {
        self.recoveries += 1;
        self.current_infections = self.current_infections.saturating_sub(1);
    }

    pub fn record_test(&mut self, compartment: CompartmentId) {
        self.tests += 1;
        self.new_tests += 1;
        if compartment.is_town() {
            self.tests_town += 1;
        } else {
            self.tests_village += 1;
        }
    }

    pub fn record_seroconversion(&mut self, compartment: CompartmentId, detectable: bool) {
        self.conversions += 1;
        if !detectable {
            return;
        }
        self.seroconversions += 1;
        if compartment.is_town() {
            self.seroconversions_town += 1;
        } else {
            self.seroconversions_village += 1;
        }
    }

    pub fn record_lost_detection(&mut self, compartment: CompartmentId) {
        self.seroconversions = self.seroconversions.saturating_sub(1);
        if compartment.is_town() {
            self.seroconversions_town = self.seroconversions_town.saturating_sub(1);
        } else {
            self.seroconversions_village = self.seroconversions_village.saturating_sub(1);
        }
    }

    pub fn record_waning(&mut self, compartment: CompartmentId) {
        self.adjusted_infections = self.adjusted_infections.saturating_sub(1);
        if compartment.is_town() {
            self.vulnerable_town += 1;
        } else {
            self.vulnerable_village += 1;
        }
    }
}

pub struct RunningAverages {
    pub time_to_death: OnlineStats,
    pub time_to_recovery: OnlineStats,
    pub time_to_test: OnlineStats,
    pub time_to_seroconversion: OnlineStats,
    pub realized_r0: OnlineStats,
}

impl RunningAverages {
    pub fn new() -> RunningAverages {
        RunningAverages {
            time_to_death: OnlineStats::new(),
            time_to_recovery: OnlineStats::new(),
            time_to_test: OnlineStats::new(),
            time_to_seroconversion: OnlineStats::new(),
            realized_r0: OnlineStats::new(),
        }
    }
}

impl Default for RunningAverages {
    fn default() -> Self {
        RunningAverages::new()
    }
}
