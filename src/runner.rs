use crate::config::{EarlyStop, SimulationConfig, StopTrigger};
use crate::counters::Counters;
use crate::distributions::Sampler;
use crate::error::Result;
use crate::metrics::{BatchSummary, MetricsSink, RunSummary};
use crate::simulation::Simulation;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

/// Mean of `samples` rounded draws of the secondary-infection distribution.
pub fn estimate_true_r0(sampler: &mut Sampler, shape: f64, scale: f64, samples: usize) -> Result<f64> {
    if samples == 0 {
        return Ok(0.);
    }
    let mut total = 0.;
    for _ in 0..samples {
        total += sampler.gamma(shape, scale)?.round();
    }
    Ok(total / samples as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopEvent {
    pub start_infections: u64,
    pub end_infections: u64,
    pub doubling_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopClock {
    days: i32,
    start_infections: u64,
}

impl StopClock {
    pub fn observe(&mut self, stop: &EarlyStop, counters: &Counters) -> Option<StopEvent> {
        let holds = match stop.trigger {
            StopTrigger::Infections(n) => counters.infections >= n,
            StopTrigger::Deaths(n) => counters.deaths >= n,
        };
        if holds {
            if self.days == 0 {
                self.start_infections = counters.infections;
            }
            self.days += 1;
        }
        if self.days != stop.present_day + 1 {
            return None;
        }
        let (start, end) = (self.start_infections, counters.infections);
        let doubling_time = (stop.present_day > 0 && start > 0 && end != start).then(|| {
            std::f64::consts::LN_2 * f64::from(stop.present_day) / ((end as f64).ln() - (start as f64).ln())
        });
        Some(StopEvent {
            start_infections: start,
            end_infections: end,
            doubling_time,
        })
    }
}

pub struct Runner {
    simulation: Simulation,
    show_progress: bool,
}

impl Runner {
    pub fn new(config: SimulationConfig, seed: u64) -> Runner {
        Runner {
            simulation: Simulation::new(config, seed),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Runner {
        self.show_progress = show_progress;
        self
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    fn progress_bar(&self, runs: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(runs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] run {pos}/{len} ({eta})")
                .progress_chars("#>-"),
        );
        pb
    }

    pub fn run_batch(&mut self, sink: &mut dyn MetricsSink) -> Result<BatchSummary> {
        let config = self.simulation.config().clone();
        let shape = config.timeline.infection_shape;
        let samples = config.run.true_r0_samples;
        let sampler = self.simulation.sampler();
        let true_r0_town = estimate_true_r0(sampler, shape, config.town.infection_scale, samples)?;
        let true_r0_village = estimate_true_r0(sampler, shape, config.village.infection_scale, samples)?;
        info!("trueR0_town={:.4}, trueR0_village={:.4}", true_r0_town, true_r0_village);

        let pb = self.progress_bar(config.run.runs);
        let mut summaries = Vec::with_capacity(config.run.runs);
        for run in 0..config.run.runs {
            let summary = self.run_once(run, sink)?;
            info!(
                "run {}: {} days, actualR0={:.4}, town_IR={:.4}, village_IR={:.4}, IR={:.4}",
                run + 1,
                summary.days,
                summary.realized_r0,
                summary.town_rate,
                summary.village_rate,
                summary.overall_rate
            );
            summaries.push(summary);
            pb.inc(1);
        }
        pb.finish_with_message("simulation complete");

        let batch = summarize(&summaries, true_r0_town, true_r0_village);
        info!(
            "town_IR_av={:.4}, village_IR_av={:.4}, IR_av={:.4}",
            batch.mean_town_rate, batch.mean_village_rate, batch.mean_overall_rate
        );
        if config.early_stop.is_some() {
            info!(
                "avinfs={:.4}, avdeaths={:.4}, av. doubling time={}",
                batch.mean_infections_at_stop.unwrap_or(0.),
                batch.mean_deaths_at_stop.unwrap_or(0.),
                batch
                    .mean_doubling_time
                    .map_or_else(|| "n/a".to_string(), |d| format!("{:.4}", d))
            );
        }
        sink.record_batch(&batch)?;
        Ok(batch)
    }

    pub fn run_once(&mut self, run: usize, sink: &mut dyn MetricsSink) -> Result<RunSummary> {
        let days = self.simulation.config().run.days;
        let early_stop = self.simulation.config().early_stop;

        self.simulation.reset(run);
        self.simulation.seed_infections()?;
        let mut clock = StopClock::default();
        let mut stop = None;
        for _ in 0..days {
            let record = self.simulation.step_day()?;
            sink.record_day(&record)?;
            if let Some(early_stop) = early_stop.as_ref() {
                if let Some(event) = clock.observe(early_stop, self.simulation.counters()) {
                    info!(
                        "model run {}: {} {} {}",
                        run, event.start_infections, event.end_infections, early_stop.present_day
                    );
                    if let Some(d) = event.doubling_time {
                        info!("doubling={:.4}", d);
                    }
                    stop = Some(event);
                    break;
                }
            }
        }

        let summary = self.summarize_run(stop);
        sink.record_run(&summary)?;
        Ok(summary)
    }

    fn summarize_run(&self, stop: Option<StopEvent>) -> RunSummary {
        let sim = &self.simulation;
        let averages = sim.averages();
        let rates = sim.population().infection_rates();
        RunSummary {
            run: sim.run(),
            days: sim.day(),
            realized_r0: averages.realized_r0.mean(),
            mean_time_to_death: averages.time_to_death.mean(),
            mean_time_to_recovery: averages.time_to_recovery.mean(),
            mean_time_to_test: averages.time_to_test.mean(),
            mean_time_to_seroconversion: averages.time_to_seroconversion.mean(),
            town_rate: rates.town,
            village_rate: rates.village,
            overall_rate: rates.overall,
            infections: sim.counters().infections,
            deaths: sim.counters().deaths,
            stopped_early: stop.is_some(),
            doubling_time: stop.and_then(|s| s.doubling_time),
        }
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        None
    } else {
        Some(stats::mean(values.into_iter()))
    }
}

pub fn summarize(runs: &[RunSummary], true_r0_town: f64, true_r0_village: f64) -> BatchSummary {
    let stopped = || runs.iter().filter(|r| r.stopped_early);
    BatchSummary {
        runs: runs.len(),
        true_r0_town,
        true_r0_village,
        mean_town_rate: mean_of(runs.iter().map(|r| r.town_rate)).unwrap_or(0.),
        mean_village_rate: mean_of(runs.iter().map(|r| r.village_rate)).unwrap_or(0.),
        mean_overall_rate: mean_of(runs.iter().map(|r| r.overall_rate)).unwrap_or(0.),
        mean_infections_at_stop: mean_of(stopped().map(|r| r.infections as f64)),
        mean_deaths_at_stop: mean_of(stopped().map(|r| r.deaths as f64)),
        mean_doubling_time: mean_of(runs.iter().filter_map(|r| r.doubling_time)),
    }
}
