use crate::agent::{self, Bookkeeping};
use crate::arena::{AgentArena, Occupancy};
use crate::compartment::{CompartmentId, HerdLevels, Population};
use crate::config::SimulationConfig;
use crate::counters::{Counters, RunningAverages};
use crate::distributions::Sampler;
use crate::error::Result;
use crate::intervention::{self, InterventionState, MixingReduction, Phase};
use crate::metrics::DayRecord;
use crate::transmission;
use itertools::Itertools;
use log::{debug, info};

/// State of one run: the arena, the compartments, and every counter.
///
/// The sampler survives [`Simulation::reset`], so consecutive runs continue
/// one random stream.
pub struct Simulation {
    config: SimulationConfig,
    sampler: Sampler,
    arena: AgentArena,
    population: Population,
    interventions: InterventionState,
    counters: Counters,
    averages: RunningAverages,
    run: usize,
    day: i32,
    phase: Phase,
    mixing: Option<MixingReduction>,
    herd: HerdLevels,
}

impl Simulation {
    pub fn new(config: SimulationConfig, seed: u64) -> Simulation {
        let population = Population::new(
            config.population.total,
            config.population.town_fraction,
            config.population.villages,
        );
        Simulation {
            arena: AgentArena::with_capacity(config.run.max_infections),
            sampler: Sampler::seeded(seed),
            population,
            interventions: InterventionState::default(),
            counters: Counters::default(),
            averages: RunningAverages::new(),
            run: 0,
            day: 0,
            phase: Phase::Normal,
            mixing: None,
            herd: HerdLevels::default(),
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn sampler(&mut self) -> &mut Sampler {
        &mut self.sampler
    }

    pub fn arena(&self) -> &AgentArena {
        &self.arena
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn averages(&self) -> &RunningAverages {
        &self.averages
    }

    pub fn run(&self) -> usize {
        self.run
    }

    pub fn day(&self) -> i32 {
        self.day
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reset(&mut self, run: usize) {
        self.arena.reset();
        self.population.reset();
        self.interventions = InterventionState::default();
        self.counters = Counters::default();
        self.averages = RunningAverages::new();
        self.run = run;
        self.day = 0;
        self.phase = Phase::Normal;
        self.mixing = None;
    }

    pub fn seed_infections(&mut self) -> Result<()> {
        let profile = self.config.town;
        for _ in 0..self.config.run.initial_infections {
            self.infect(CompartmentId::Town, &profile)?;
        }
        Ok(())
    }

    fn infect(&mut self, compartment: CompartmentId, profile: &agent::EpiProfile) -> Result<usize> {
        let mut books = Bookkeeping {
            arena: &mut self.arena,
            population: &mut self.population,
            counters: &mut self.counters,
            averages: &mut self.averages,
        };
        agent::create(&mut books, &mut self.sampler, compartment, profile, &self.config.timeline)
    }

    /// Advances every slot by one day and reports the day.
    ///
    /// Only slots that existed when the day started are visited, so agents
    /// infected today start at age 0 and are first aged tomorrow.
    pub fn step_day(&mut self) -> Result<DayRecord> {
        self.counters.start_day();
        self.population.start_day();

        let plan = intervention::plan(
            &self.config.interventions,
            self.interventions,
            self.counters.triggers(),
        );
        plan.apply(&mut self.population, &mut self.interventions);
        self.phase = plan.phase;
        self.mixing = plan.mixing;

        let existing = self.arena.len();
        for idx in 0..existing {
            self.step_slot(idx)?;
        }

        let routes = self.counters.routes;
        debug!(
            "towntotown={} towntovillage={} villagetotown={} villagetovillage={} reinf_vul_town={} reinf_vul_village={}",
            routes.town_to_town,
            routes.town_to_village,
            routes.village_to_town,
            routes.village_to_village,
            self.counters.vulnerable_town,
            self.counters.vulnerable_village
        );

        let record = self.day_record();
        debug!(
            "day {} new infections by village: {}",
            record.day,
            record.village_new.iter().join(",")
        );
        info!(
            "{},town_IR={:.4}, village_IR={:.4}, IR={:.4}",
            record.day, record.town_rate, record.village_rate, record.overall_rate
        );
        self.day += 1;
        Ok(record)
    }

    fn step_slot(&mut self, idx: usize) -> Result<()> {
        let compartment = match self.arena.occupancy(idx) {
            Occupancy::NeverUsed => return Ok(()),
            Occupancy::Active(c) | Occupancy::Free(c) => c,
        };
        let serology_settings = self.config.timeline.serology;

        if let Some(serology) = self.arena.serology_mut(idx) {
            let change = serology.advance(&serology_settings);
            if change.lost_detection {
                self.counters.record_lost_detection(compartment);
            }
            if change.lost_protection {
                self.counters.record_waning(compartment);
                self.population.record_waning(compartment);
            }
        }

        let Some((agent, serology)) = self.arena.records_mut(idx) else {
            return Ok(());
        };
        agent.age += 1;
        let age = agent.age;
        if age >= agent.last_operation_day {
            agent::die(&mut self.arena, idx);
            return Ok(());
        }

        if age >= self.config.infectious_start && age <= self.config.infectious_end {
            self.counters.infectious += 1;
        }

        // Events fire on the first visit at or after their day, so a day-0
        // quarantine still lands before the first transmission.
        if !serology.converted() && serology.sero_day <= age {
            serology.convert();
            let detectable = serology.current >= serology_settings.detection_threshold;
            self.counters.record_seroconversion(compartment, detectable);
            self.averages.time_to_seroconversion.add(age);
        }

        if !agent.quarantined && agent.quarantine_day.map_or(false, |q| q <= age) {
            agent.quarantined = true;
            self.counters.quarantines += 1;
        }

        if !agent.tested && agent.test_day.map_or(false, |t| t <= age) {
            agent.tested = true;
            self.counters.record_test(compartment);
            self.averages.time_to_test.add(age);
        }

        if !agent.outcome_recorded && agent.illness.outcome_day() <= age {
            agent.outcome_recorded = true;
            if agent.illness.dies() {
                self.counters.record_death(compartment);
                self.averages.time_to_death.add(age);
            } else {
                self.counters.record_recovery();
                self.averages.time_to_recovery.add(age);
            }
            return Ok(());
        }

        if !agent.can_transmit() {
            return Ok(());
        }
        let attempts = agent.attempts_on(age);
        if attempts == 0 {
            return Ok(());
        }
        self.population.snapshot_herd_levels(&mut self.herd);
        for _ in 0..attempts {
            let target = transmission::resolve(
                &mut self.sampler,
                compartment,
                &self.herd,
                self.mixing.as_ref(),
                &self.config.contacts,
            );
            if let Some(target) = target {
                self.counters.routes.record(compartment, target);
                let profile = if target.is_town() {
                    self.config.town
                } else {
                    self.config.village
                };
                self.infect(target, &profile)?;
            }
        }
        Ok(())
    }

    pub fn day_record(&self) -> DayRecord {
        let rates = self.population.infection_rates();
        let villages = self.population.villages();
        DayRecord {
            run: self.run,
            day: self.day,
            infections: self.counters.infections,
            new_infections: self.counters.new_infections,
            current_infections: self.counters.current_infections,
            deaths: self.counters.deaths,
            new_deaths: self.counters.new_deaths,
            tests: self.counters.tests,
            new_tests: self.counters.new_tests,
            infectious: self.counters.infectious,
            seroconversions: self.counters.seroconversions,
            quarantines: self.counters.quarantines,
            town_new_infections: self.population.town().new_infections,
            village_new_infections: self.population.village_new_infections(),
            town_rate: rates.town,
            village_rate: rates.village,
            overall_rate: rates.overall,
            effective_town_population: self.population.town().effective_population,
            phase: self.phase,
            routes: self.counters.routes,
            village_new: villages.iter().map(|v| v.new_infections).collect(),
            village_cumulative: villages.iter().map(|v| v.cumulative_infections).collect(),
        }
    }
}
