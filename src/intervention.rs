use crate::compartment::Population;
use crate::counters::TriggerCounts;
use log::{debug, info};
use serde::Serialize;

/// Count thresholds; a non-positive threshold never fires.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Triggers {
    pub deaths: i64,
    pub tests: i64,
    pub infections: i64,
}

impl Triggers {
    pub fn disabled() -> Triggers {
        Triggers {
            deaths: -1,
            tests: -1,
            infections: -1,
        }
    }

    pub fn met(&self, counts: TriggerCounts) -> bool {
        let reached = |at: i64, count: u64| at > 0 && count >= at as u64;
        reached(self.deaths, counts.deaths)
            || reached(self.tests, counts.tests)
            || reached(self.infections, counts.infections)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixingReduction {
    pub town: f64,
    pub village: f64,
    pub mixed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distancing {
    pub triggers: Triggers,
    pub mixing: MixingReduction,
}

/// Absolute population added back each lockdown day in
/// `start_day..start_day + len`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeakWindow {
    pub amount: f64,
    pub start_day: i32,
    pub len: i32,
}

impl LeakWindow {
    pub fn contains(&self, lockdown_day: i32) -> bool {
        lockdown_day >= self.start_day && lockdown_day <= self.start_day + self.len - 1
    }

    fn amount_on(&self, lockdown_day: i32) -> f64 {
        if self.contains(lockdown_day) {
            self.amount
        } else {
            0.
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lockdown {
    pub length: i32,
    pub infectible_town: f64,
    pub infectible_village: f64,
    pub mixing: MixingReduction,
    pub leak_town: LeakWindow,
    pub leak_village: LeakWindow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondLockdown {
    // Lockdown 2 may start once lockdown 1's day counter reaches this.
    pub start_day: i32,
    pub lockdown: Lockdown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterventionPolicy {
    pub distancing: Option<Distancing>,
    pub lockdown_triggers: Triggers,
    pub lockdown: Option<Lockdown>,
    pub second_lockdown: Option<SecondLockdown>,
}

impl InterventionPolicy {
    pub fn none() -> InterventionPolicy {
        InterventionPolicy {
            distancing: None,
            lockdown_triggers: Triggers::disabled(),
            lockdown: None,
            second_lockdown: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Normal,
    Distancing,
    Lockdown1,
    Lockdown2,
}

// Day counters of the two lockdowns. Lockdown 1's counter keeps running
// after it ends so lockdown 2 can be scheduled relative to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterventionState {
    pub lockdown1_day: i32,
    pub lockdown2_day: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectiveChange {
    Unchanged,
    Restrict { town: f64, village: f64 },
    Leak { town: f64, village: f64 },
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayPlan {
    pub phase: Phase,
    pub effective: EffectiveChange,
    /// `None` means contacts are never suppressed today.
    pub mixing: Option<MixingReduction>,
    pub next: InterventionState,
    pub lockdown_ended: bool,
}

pub fn plan(policy: &InterventionPolicy, state: InterventionState, counts: TriggerCounts) -> DayPlan {
    let distancing = policy
        .distancing
        .as_ref()
        .filter(|d| d.triggers.met(counts));
    let distancing_mixing = distancing.map(|d| d.mixing);
    let quiet_phase = if distancing.is_some() {
        Phase::Distancing
    } else {
        Phase::Normal
    };

    let lockdown = match policy.lockdown.as_ref() {
        None => {
            return DayPlan {
                phase: quiet_phase,
                effective: EffectiveChange::Unchanged,
                mixing: distancing_mixing,
                next: state,
                lockdown_ended: false,
            }
        }
        Some(lockdown) => lockdown,
    };

    let mut next = state;
    if let Some(second) = policy.second_lockdown.as_ref() {
        if state.lockdown1_day >= second.start_day && state.lockdown2_day < second.lockdown.length {
            next.lockdown2_day += 1;
            return DayPlan {
                phase: Phase::Lockdown2,
                effective: lockdown_day_change(&second.lockdown, state.lockdown2_day),
                mixing: Some(second.lockdown.mixing),
                next,
                lockdown_ended: false,
            };
        }
    }

    if policy.lockdown_triggers.met(counts) && state.lockdown1_day < lockdown.length {
        next.lockdown1_day += 1;
        return DayPlan {
            phase: Phase::Lockdown1,
            effective: lockdown_day_change(lockdown, state.lockdown1_day),
            mixing: Some(lockdown.mixing),
            next,
            lockdown_ended: false,
        };
    }

    let ended = state.lockdown1_day >= lockdown.length;
    if ended {
        next.lockdown1_day += 1;
    }
    DayPlan {
        phase: quiet_phase,
        effective: EffectiveChange::Restore,
        mixing: distancing_mixing,
        next,
        lockdown_ended: ended && state.lockdown1_day == lockdown.length,
    }
}

fn lockdown_day_change(lockdown: &Lockdown, day: i32) -> EffectiveChange {
    if day == 0 {
        EffectiveChange::Restrict {
            town: lockdown.infectible_town,
            village: lockdown.infectible_village,
        }
    } else {
        EffectiveChange::Leak {
            town: lockdown.leak_town.amount_on(day),
            village: lockdown.leak_village.amount_on(day),
        }
    }
}

impl DayPlan {
    pub fn apply(&self, population: &mut Population, state: &mut InterventionState) {
        match self.effective {
            EffectiveChange::Unchanged => {}
            EffectiveChange::Restrict { town, village } => {
                population.restrict_effective(town, village);
                info!(
                    "{:?} starts. Effective population now {:.0} (town), {:.0} (villages)",
                    self.phase,
                    population.town().effective_population,
                    population.village_effective_population()
                );
            }
            EffectiveChange::Leak { town, village } => {
                if town > 0. {
                    population.leak_town(town);
                }
                if village > 0. {
                    population.leak_villages(village);
                }
                debug!(
                    "In {:?}. Effective population now {:.0} (town), {:.0} (villages)",
                    self.phase,
                    population.town().effective_population,
                    population.village_effective_population()
                );
            }
            EffectiveChange::Restore => population.restore_effective(),
        }
        if self.lockdown_ended {
            info!(
                "Lockdown finished. Effective population now {:.0} (town), {:.0} (villages)",
                population.town().effective_population,
                population.village_effective_population()
            );
        }
        if let Some(m) = self.mixing {
            debug!(
                "physical distancing = {:.2} (town), {:.2} (villages), {:.2} (mixed)",
                m.town, m.village, m.mixed
            );
        }
        *state = self.next;
    }
}
