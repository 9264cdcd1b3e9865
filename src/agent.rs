use crate::arena::AgentArena;
use crate::compartment::{CompartmentId, Population};
use crate::counters::{Counters, RunningAverages};
use crate::distributions::{DayOffset, Sampler};
use crate::error::Result;
use hashbag::HashBag;

pub const MAX_AGE: i32 = 100;

// What a new infection inherits from the compartment it happened in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpiProfile {
    pub infection_scale: f64,
    pub percent_quarantined: f64,
    // Of the quarantined.
    pub percent_tested: f64,
    // Of the seriously ill.
    pub percent_death: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfectionTiming {
    Uniform { start: i32, end: i32 },
    Gamma { shape: f64, scale: f64 },
}

impl InfectionTiming {
    fn sample_day(&self, sampler: &mut Sampler) -> Result<i32> {
        match *self {
            InfectionTiming::Uniform { start, end } => Ok(sampler.uniform_int(start, end)),
            InfectionTiming::Gamma { shape, scale } => {
                let day = sampler.gamma(shape, scale)?.round() as i32;
                Ok(day.clamp(1, MAX_AGE - 1))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestDelay {
    Fixed(f64),
    Gamma { shape: f64, scale: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerologySettings {
    pub peak_mean: f64,
    pub peak_sd: f64,
    pub final_mean: f64,
    pub final_sd: f64,
    pub half_life: f64,
    pub detection_threshold: i32,
    pub reinfection_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseTimeline {
    pub infection_shape: f64,
    pub max_secondary_infections: u32,
    pub timing: InfectionTiming,
    pub percent_ill: f64,
    pub time_to_death: f64,
    pub death_offset: DayOffset,
    pub time_to_recovery: f64,
    pub recovery_offset: DayOffset,
    pub time_to_sero: f64,
    pub sero_offset: DayOffset,
    pub quarantine_day: f64,
    pub quarantine_offset: DayOffset,
    pub test_delay: TestDelay,
    pub serology: SerologySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Illness {
    /// Never seriously ill; the recovery day marks the end of infectiousness.
    NotIll { recovery_day: i32 },
    Recovers { recovery_day: i32 },
    Dies { death_day: i32 },
}

impl Illness {
    pub fn outcome_day(&self) -> i32 {
        match *self {
            Illness::NotIll { recovery_day } | Illness::Recovers { recovery_day } => recovery_day,
            Illness::Dies { death_day } => death_day,
        }
    }

    pub fn dies(&self) -> bool {
        matches!(self, Illness::Dies { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub age: i32,
    pub compartment: CompartmentId,
    pub illness: Illness,
    pub secondary_infections: u32,
    // age -> transmission attempts that day
    pub schedule: HashBag<i32>,
    pub quarantine_day: Option<i32>,
    pub test_day: Option<i32>,
    /// The agent is destroyed when its age reaches this day.
    pub last_operation_day: i32,
    pub quarantined: bool,
    pub tested: bool,
    pub outcome_recorded: bool,
}

impl Agent {
    pub fn attempts_on(&self, age: i32) -> usize {
        self.schedule.contains(&age)
    }

    pub fn can_transmit(&self) -> bool {
        !self.quarantined && self.age < MAX_AGE && self.age < self.illness.outcome_day()
    }
}

/// Antibody record of one slot. It outlives the agent record, so decay and
/// loss of protection keep being tracked after the agent is destroyed.
#[derive(Debug, Clone, PartialEq)]
pub struct Serology {
    pub sero_day: i32,
    pub peak: i32,
    pub floor: i32,
    pub current: i32,
    days_since_conversion: Option<i32>,
    protective: bool,
}

// Each crossing happens at most once per slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerologyChange {
    pub lost_detection: bool,
    pub lost_protection: bool,
}

impl Serology {
    pub fn new(sero_day: i32, peak: i32, floor: i32) -> Serology {
        Serology {
            sero_day,
            peak,
            floor,
            current: 0,
            days_since_conversion: None,
            protective: true,
        }
    }

    pub fn converted(&self) -> bool {
        self.days_since_conversion.is_some()
    }

    pub fn protective(&self) -> bool {
        self.protective
    }

    pub fn convert(&mut self) {
        self.days_since_conversion = Some(0);
        self.current = self.peak;
    }

    pub fn advance(&mut self, settings: &SerologySettings) -> SerologyChange {
        let days = match self.days_since_conversion.as_mut() {
            None => return SerologyChange::default(),
            Some(days) => {
                *days += 1;
                *days
            }
        };
        let previous = self.current;
        self.current = antibody_level(self.peak, self.floor, settings.half_life, days);

        let detection = settings.detection_threshold;
        let lost_detection = previous >= detection && self.current < detection;

        let reinfection = settings.reinfection_threshold;
        let lost_protection = self.protective
            && f64::from(previous) >= reinfection
            && f64::from(self.current) < reinfection;
        if lost_protection {
            self.protective = false;
        }
        SerologyChange {
            lost_detection,
            lost_protection,
        }
    }
}

pub fn antibody_level(peak: i32, floor: i32, half_life: f64, days: i32) -> i32 {
    let k = std::f64::consts::LN_2 / half_life;
    let (peak, floor) = (f64::from(peak), f64::from(floor));
    (floor + (peak - floor) * (-k * f64::from(days)).exp()).round() as i32
}

pub struct Bookkeeping<'a> {
    pub arena: &'a mut AgentArena,
    pub population: &'a mut Population,
    pub counters: &'a mut Counters,
    pub averages: &'a mut RunningAverages,
}

/// Infects someone in `compartment` and draws their timeline.
///
/// Draw order: secondary-infection count, seroconversion day, antibody peak
/// and floor, illness, quarantine and testing, then the transmission days.
pub fn create(
    books: &mut Bookkeeping<'_>,
    sampler: &mut Sampler,
    compartment: CompartmentId,
    profile: &EpiProfile,
    timeline: &DiseaseTimeline,
) -> Result<usize> {
    let drawn = sampler
        .gamma(timeline.infection_shape, profile.infection_scale)?
        .round();
    let secondary_infections = (drawn as u32).min(timeline.max_secondary_infections);

    let sero_day = timeline.sero_offset.sample_day(timeline.time_to_sero, sampler)?;
    let serology = &timeline.serology;
    let peak = sampler.normal(serology.peak_mean, serology.peak_sd)?.round() as i32;
    let floor = sampler.normal(serology.final_mean, serology.final_sd)?.round() as i32;

    let illness = if sampler.chance(timeline.percent_ill) {
        books.counters.ill += 1;
        if sampler.chance(profile.percent_death) {
            Illness::Dies {
                death_day: timeline
                    .death_offset
                    .sample_day(timeline.time_to_death, sampler)?,
            }
        } else {
            Illness::Recovers {
                recovery_day: sample_recovery_day(timeline, sampler)?,
            }
        }
    } else {
        Illness::NotIll {
            recovery_day: sample_recovery_day(timeline, sampler)?,
        }
    };

    let mut quarantine_day = None;
    let mut test_day = None;
    if sampler.chance(profile.percent_quarantined) {
        let quar = timeline
            .quarantine_offset
            .sample_day(timeline.quarantine_day, sampler)?;
        quarantine_day = Some(quar);
        if sampler.chance(profile.percent_tested) {
            let delay = match timeline.test_delay {
                TestDelay::Fixed(days) => days,
                TestDelay::Gamma { shape, scale } => sampler.gamma(shape, scale)?.round(),
            };
            test_day = Some((f64::from(quar) + delay.max(0.)) as i32);
        }
    }

    let mut last = illness.outcome_day();
    last = last.max(quarantine_day.unwrap_or(last));
    last = last.max(test_day.unwrap_or(last));
    if !illness.dies() {
        last = last.max(sero_day);
    }
    // Every agent gets at least one visit, so events due on day 0 or earlier still fire.
    let last_operation_day = (last + 1).max(2);

    let mut schedule = HashBag::new();
    for _ in 0..secondary_infections {
        schedule.insert(timeline.timing.sample_day(sampler)?);
    }

    let agent = Agent {
        age: 0,
        compartment,
        illness,
        secondary_infections,
        schedule,
        quarantine_day,
        test_day,
        last_operation_day,
        quarantined: false,
        tested: false,
        outcome_recorded: false,
    };
    let idx = books.arena.allocate(agent, Serology::new(sero_day, peak, floor))?;

    books.population.record_infection(compartment);
    books.counters.record_infection();
    books.averages.realized_r0.add(secondary_infections);
    Ok(idx)
}

fn sample_recovery_day(timeline: &DiseaseTimeline, sampler: &mut Sampler) -> Result<i32> {
    timeline
        .recovery_offset
        .sample_day(timeline.time_to_recovery, sampler)
}

// The serology record stays behind.
pub fn die(arena: &mut AgentArena, idx: usize) {
    arena.free(idx);
}
