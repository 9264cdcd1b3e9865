use crate::config::{SimulationConfig, TextParameters};
use crate::error::SimError;
use crate::metrics::{CsvSink, MemorySink};
use crate::runner::Runner;
use crate::simulation::Simulation;
use crate::Phase;
use assert_float_eq::*;

fn config(options: &str) -> SimulationConfig {
    SimulationConfig::from_source(&TextParameters::parse(options)).unwrap()
}

fn started(options: &str, seed: u64) -> Simulation {
    let mut sim = Simulation::new(config(options), seed);
    sim.reset(0);
    sim.seed_infections().unwrap();
    sim
}

const DOUBLING: &str = "
population 1e15
numvillages 1
initial_infections 1
infshp 1000000
R0_town 2
R0_townvillage 0
inf_start 1
inf_end 1
percentage_ill 0
death_rate_town 0
percentage_quarantined_town 0
percentage_tested_town 0
max_infections 200000
";

#[test]
fn fixed_offspring_doubles_every_day() {
    let mut sim = started(DOUBLING, 17);
    let mut expected_new = 1u64;
    let mut expected_total = 1u64;
    for _ in 0..15 {
        let record = sim.step_day().unwrap();
        expected_new *= 2;
        expected_total += expected_new;
        assert_eq!(record.new_infections, expected_new, "day {}", record.day);
        assert_eq!(record.infections, expected_total);
        assert_eq!(record.routes.town_to_town, expected_new);
        assert_eq!(record.village_new_infections, 0);
    }
    assert_float_absolute_eq!(sim.averages().realized_r0.mean(), 2.0, 1e-3);
}

const QUARANTINE: &str = "
population 1000000
numvillages 10
initial_infections 20
R0_town 5
quardate 1
dist_on_quardate 0
inf_start 2
inf_end 9
percentage_tested_town 0
";

#[test]
fn quarantine_before_infectious_window_stops_town_spread() {
    let mut sim = started(&format!("{}percentage_quarantined_town 100\n", QUARANTINE), 3);
    for _ in 0..30 {
        let record = sim.step_day().unwrap();
        assert_eq!(record.routes.town_to_town, 0);
        assert_eq!(record.routes.total(), 0);
    }
    assert_eq!(sim.counters().infections, 20);
    assert_eq!(sim.counters().quarantines, 20);

    let mut control = started(&format!("{}percentage_quarantined_town 0\n", QUARANTINE), 3);
    let spread: u64 = (0..30)
        .map(|_| control.step_day().unwrap().routes.town_to_town)
        .sum();
    assert!(spread > 0);
}

#[test]
fn quarantine_on_the_day_of_infection_stops_town_spread() {
    let mut sim = started(
        "population 1000000\nnumvillages 10\ninitial_infections 20\nR0_town 5\nR0_townvillage 0\n\
         quardate 0\ndist_on_quardate 0\ninf_start 1\ninf_end 9\npercentage_quarantined_town 100",
        3,
    );
    for _ in 0..30 {
        let record = sim.step_day().unwrap();
        assert_eq!(record.routes.town_to_town, 0);
    }
    assert_eq!(sim.counters().infections, 20);
    assert_eq!(sim.counters().quarantines, 20);
    assert_eq!(sim.counters().tests, 20);
}

#[test]
fn antibodies_halve_toward_floor_every_half_life() {
    let mut sim = started(
        "initial_infections 1\nR0_town 0\ndeath_rate_town 0\npercentage_quarantined_town 0\n\
         sero_peak 1000\nsero_peak_sd 0\nsero_final 100\nsero_final_sd 0\nsero_half_life 30\n\
         time_to_sero 14\ndist_on_sero 0",
        9,
    );
    let mut levels = vec![0];
    for _ in 0..74 {
        sim.step_day().unwrap();
        levels.push(sim.arena().serology(0).unwrap().current);
    }
    assert_eq!(levels[13], 0);
    assert_eq!(levels[14], 1000);
    assert_eq!(levels[44], 550);
    assert_eq!(levels[74], 325);
    // The agent itself is long gone by then.
    assert!(sim.arena().agent(0).is_none());
    assert_eq!(sim.counters().seroconversions, 1);
}

#[test]
fn lockdown_leak_raises_effective_population_inside_window_only() {
    let mut sim = started(
        "population 1000000\nnumvillages 4\ninitial_infections 5\nhaslockdown 1\nlockdown_at_inf 1\n\
         lockdownlen 20\ninfectible_proportion_town 0.05555\npopleak_frac_town 1\n\
         popleak_start_day_town 5\npopleak_len_town 6",
        4,
    );
    let records: Vec<_> = (0..25).map(|_| sim.step_day().unwrap()).collect();
    let town_total = 500_000.;
    assert_float_absolute_eq!(records[0].effective_town_population, town_total * 0.05555, 1e-6);
    for day in 1..20 {
        let (prev, cur) = (
            records[day - 1].effective_town_population,
            records[day].effective_town_population,
        );
        if (5..=10).contains(&day) {
            assert_float_absolute_eq!(cur - prev, 5000., 1e-6);
        } else {
            assert_float_absolute_eq!(cur, prev);
        }
        assert_eq!(records[day].phase, Phase::Lockdown1);
    }
    for record in &records[20..] {
        assert_float_absolute_eq!(record.effective_town_population, town_total);
        assert_eq!(record.phase, Phase::Normal);
    }
}

#[test]
fn waning_moves_infections_into_the_vulnerable_pool_once() {
    let mut sim = started(
        "population 100000\nnumvillages 3\ninitial_infections 10\nR0_town 1.5\nR0_village 1.5\n\
         sero_reinfect_mult -20\nsero_half_life 10",
        12,
    );
    for _ in 0..120 {
        sim.step_day().unwrap();
        let c = sim.counters();
        let town = sim.population().town();
        assert_eq!(town.cumulative_infections - town.adjusted_infections, c.vulnerable_town);
        let villages = sim.population().villages();
        let lost: u64 = villages
            .iter()
            .map(|v| v.cumulative_infections - v.adjusted_infections)
            .sum();
        assert_eq!(lost, c.vulnerable_village);
        assert_eq!(c.infections - c.adjusted_infections, c.vulnerable_town + c.vulnerable_village);
        assert!(c.vulnerable_town + c.vulnerable_village <= c.conversions);
    }
    assert!(sim.counters().vulnerable_town > 0);
}

#[test]
fn arena_overflow_is_fatal() {
    let mut runner = Runner::new(
        config("population 1e9\ninitial_infections 10\nR0_town 20\nmax_infections 50\ntrue_r0_samples 0"),
        1,
    );
    let mut sink = MemorySink::default();
    match runner.run_batch(&mut sink) {
        Err(SimError::ArenaFull { capacity }) => assert_eq!(capacity, 50),
        other => panic!("expected ArenaFull, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn parameter_file_to_csv_output() {
    let dir = tempfile::tempdir().unwrap();
    let params = dir.path().join("params.txt");
    std::fs::write(
        &params,
        "// small batch\nnumber_of_runs 2\ntotdays 10\npopulation 20000\nnumvillages 3\ntrue_r0_samples 100\n",
    )
    .unwrap();
    let source = crate::config::load_parameters(&params).unwrap();
    let config = SimulationConfig::from_source(source.as_ref()).unwrap();
    let prefix = dir.path().join("out").join("outfile");
    let mut sink = CsvSink::create(&prefix).unwrap();
    let batch = Runner::new(config, 99).run_batch(&mut sink).unwrap();
    drop(sink);
    assert_eq!(batch.runs, 2);

    let daily = std::fs::read_to_string(dir.path().join("out").join("outfile_daily.csv")).unwrap();
    assert_eq!(daily.lines().count(), 1 + 20);
    let runs = std::fs::read_to_string(dir.path().join("out").join("outfile_runs.csv")).unwrap();
    assert_eq!(runs.lines().count(), 1 + 2);
    let villages =
        std::fs::read_to_string(dir.path().join("out").join("outfile_villages.csv")).unwrap();
    assert!(villages.starts_with("run,day,town_rate,village_rate,town,village_0,village_1,village_2"));
}

#[test]
fn runs_with_the_same_seed_are_reproducible() {
    let batch = |seed| {
        let mut sink = MemorySink::default();
        Runner::new(
            config("number_of_runs 2\ntotdays 40\npopulation 200000\nnumvillages 8\ntrue_r0_samples 10"),
            seed,
        )
        .run_batch(&mut sink)
        .unwrap();
        sink.days
    };
    assert_eq!(batch(2024), batch(2024));
}
