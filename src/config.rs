use crate::agent::{
    DiseaseTimeline, EpiProfile, InfectionTiming, SerologySettings, TestDelay, MAX_AGE,
};
use crate::distributions::DayOffset;
use crate::error::{Result, SimError};
use crate::intervention::{
    Distancing, InterventionPolicy, LeakWindow, Lockdown, MixingReduction, SecondLockdown, Triggers,
};
use crate::transmission::ContactModel;
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const MAX_VALUE_LEN: usize = 199;

pub trait ParameterSource {
    /// Raw value of `name` at `position` (0 for the first value, 1 for the
    /// lockdown-2 value). `None` when absent, `Err` when present but unusable.
    fn lookup(&self, name: &str, position: usize) -> Option<Result<f64, String>>;

    fn describe(&self) -> String;
}

/// The plain-text format: one `name value [second_value]` per line.
///
/// Blank lines and lines starting with `/` or `#` are ignored. The first
/// line naming an option wins.
#[derive(Debug, Clone, Default)]
pub struct TextParameters {
    origin: String,
    lines: Vec<(String, Vec<String>)>,
}

impl TextParameters {
    pub fn parse(text: &str) -> TextParameters {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('/') && !line.starts_with('#'))
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                let name = words.next()?.to_string();
                Some((name, words.map(str::to_string).collect()))
            })
            .collect();
        TextParameters {
            origin: "<text>".to_string(),
            lines,
        }
    }

    pub fn from_path(path: &Path) -> Result<TextParameters> {
        let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let mut params = TextParameters::parse(&text);
        params.origin = path.display().to_string();
        Ok(params)
    }
}

fn parse_number(raw: &str) -> Result<f64, String> {
    if raw.chars().count() >= MAX_VALUE_LEN {
        return Err(format!("value is too long ({} characters)", raw.chars().count()));
    }
    raw.trim()
        .parse::<f64>()
        .map_err(|_| format!("value \"{}\" is not a number", raw))
}

impl ParameterSource for TextParameters {
    fn lookup(&self, name: &str, position: usize) -> Option<Result<f64, String>> {
        let (_, values) = self.lines.iter().find(|(n, _)| n == name)?;
        values.get(position).map(|raw| parse_number(raw))
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

/// A JSON object of options. Values are numbers, numeric strings, or a
/// two-element array whose second element configures lockdown 2.
#[derive(Debug, Clone)]
pub struct JsonParameters {
    origin: String,
    values: serde_json::Map<String, Value>,
}

impl JsonParameters {
    pub fn parse(text: &str) -> Result<JsonParameters> {
        let values = match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => map,
            other => {
                return Err(SimError::Json(serde::de::Error::custom(format!(
                    "expected a JSON object of options, found {}",
                    other
                ))))
            }
        };
        Ok(JsonParameters {
            origin: "<json>".to_string(),
            values,
        })
    }

    pub fn from_path(path: &Path) -> Result<JsonParameters> {
        let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let mut params = JsonParameters::parse(&text)?;
        params.origin = path.display().to_string();
        Ok(params)
    }
}

fn json_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is out of range", n)),
        Value::String(s) => parse_number(s),
        other => Err(format!("expected a number, found {}", other)),
    }
}

impl ParameterSource for JsonParameters {
    fn lookup(&self, name: &str, position: usize) -> Option<Result<f64, String>> {
        match (self.values.get(name)?, position) {
            (Value::Array(items), _) => items.get(position).map(json_number),
            (value, 0) => Some(json_number(value)),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

pub fn load_parameters(path: &Path) -> Result<Box<dyn ParameterSource>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Box::new(JsonParameters::from_path(path)?)),
        _ => Ok(Box::new(TextParameters::from_path(path)?)),
    }
}

pub struct Parameters<'a> {
    source: &'a dyn ParameterSource,
}

impl<'a> Parameters<'a> {
    pub fn new(source: &'a dyn ParameterSource) -> Parameters<'a> {
        Parameters { source }
    }

    fn resolve(&self, name: &str, position: usize, default: f64) -> f64 {
        match self.source.lookup(name, position) {
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                warn!(
                    "option {} in {}: {}; using default {}",
                    name,
                    self.source.describe(),
                    e,
                    default
                );
                default
            }
            None => {
                warn!(
                    "option {} not found in {}; using default {}",
                    name,
                    self.source.describe(),
                    default
                );
                default
            }
        }
    }

    pub fn int(&self, name: &str, default: i64) -> i64 {
        let v = self.resolve(name, 0, default as f64) as i64;
        info!("{} = {}", name, v);
        v
    }

    pub fn float(&self, name: &str, default: f64) -> f64 {
        let v = self.resolve(name, 0, default);
        info!("{} = {:.4}", name, v);
        v
    }

    pub fn int2(&self, name: &str, default: i64) -> i64 {
        let v = self.resolve(name, 1, default as f64) as i64;
        info!("{} (2) = {}", name, v);
        v
    }

    pub fn float2(&self, name: &str, default: f64) -> f64 {
        let v = self.resolve(name, 1, default);
        info!("{} (2) = {:.4}", name, v);
        v
    }

    pub fn selector(&self, name: &str, default: f64) -> Result<DayOffset> {
        DayOffset::from_selector(self.float(name, default))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub runs: usize,
    pub days: i32,
    pub initial_infections: u32,
    // Arena capacity.
    pub max_infections: usize,
    pub seed: Option<u64>,
    pub true_r0_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSettings {
    pub total: f64,
    pub town_fraction: f64,
    pub villages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    Infections(u64),
    Deaths(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStop {
    pub trigger: StopTrigger,
    pub present_day: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub run: RunSettings,
    pub population: PopulationSettings,
    pub timeline: DiseaseTimeline,
    pub infectious_start: i32,
    pub infectious_end: i32,
    pub town: EpiProfile,
    pub village: EpiProfile,
    pub contacts: ContactModel,
    pub interventions: InterventionPolicy,
    pub early_stop: Option<EarlyStop>,
}

impl SimulationConfig {
    pub fn from_source(source: &dyn ParameterSource) -> Result<SimulationConfig> {
        let p = Parameters::new(source);

        let runs = p.int("number_of_runs", 10).max(0) as usize;
        let mut villages = p.int("numvillages", 100);
        if villages < 1 {
            warn!("numvillages = {} is not usable; simulating 1 village", villages);
            villages = 1;
        }
        let town_fraction = p.float("townprop", 0.5);
        let death_rate_town = p.float("death_rate_town", 0.5);
        let death_rate_village = p.float("death_rate_village", 0.5);
        let r0_town = p.float("R0_town", 5.0);
        let r0_village = p.float("R0_village", 2.8);
        let r0_townvillage = p.float("R0_townvillage", 0.8);
        let infection_shape = p.float("infshp", 0.1);
        let days = p.int("totdays", 150) as i32;
        let total = p.float("population", 13_000_000.);

        let gamma_timing = p.int("inf_gam", 0) != 0;
        let mut inf_start = p.int("inf_start", 2) as i32;
        if inf_start < 1 {
            warn!("inf_start = {} is before the first day of infection; using 1", inf_start);
            inf_start = 1;
        }
        let mut inf_end = p.int("inf_end", 9) as i32;
        if inf_end < inf_start {
            warn!("inf_end = {} precedes inf_start; using {}", inf_end, inf_start);
            inf_end = inf_start;
        }
        let inf_mid = p.float("inf_mid", 6.);
        let inf_tm_shp = p.float("inf_tm_shp", 4.);
        let timing = if gamma_timing {
            InfectionTiming::Gamma {
                shape: inf_tm_shp,
                scale: inf_mid / inf_tm_shp,
            }
        } else {
            InfectionTiming::Uniform {
                start: inf_start,
                end: inf_end,
            }
        };

        let time_to_death = p.float("time_to_death", 17.);
        let death_offset = p.selector("dist_on_death", -3.)?;
        let time_to_recovery = p.float("time_to_recovery", 20.);
        let recovery_offset = p.selector("dist_on_recovery", -2.)?;
        let time_to_sero = p.float("time_to_sero", 14.);
        let sero_offset = p.selector("dist_on_sero", -3.)?;
        let sero_reinfect_mult = p.float("sero_reinfect_mult", 5.);
        let initial_infections = p.int("initial_infections", 10).max(0) as u32;

        let quarantine_town = p.float("percentage_quarantined_town", 4.);
        let quarantine_village = p.float("percentage_quarantined_village", 4.);
        let tested_town = p.float("percentage_tested_town", 100.);
        let tested_village = p.float("percentage_tested_village", 100.);
        let quardate = p.float("quardate", 12.);
        let quarantine_offset = p.selector("dist_on_quardate", -3.)?;
        let testdelay = p.float("testdelay", 0.);
        let testdelay_shp = p.float("testdelay_shp", -1.);
        let test_delay = if testdelay == 0. || testdelay_shp <= 0. {
            TestDelay::Fixed(testdelay)
        } else {
            TestDelay::Gamma {
                shape: testdelay_shp,
                scale: testdelay / testdelay_shp,
            }
        };

        let percent_ill = p.float("percentage_ill", 20.);
        let sero_final = p.float("sero_final", 100.);
        let sero_final_sd = p.float("sero_final_sd", 20.);
        let serology = SerologySettings {
            peak_mean: p.float("sero_peak", 1000.),
            peak_sd: p.float("sero_peak_sd", 20.),
            final_mean: sero_final,
            final_sd: sero_final_sd,
            half_life: p.float("sero_half_life", 30.),
            detection_threshold: p.int("sero_threshold", 200) as i32,
            reinfection_threshold: sero_final - sero_reinfect_mult * sero_final_sd,
        };

        let timeline = DiseaseTimeline {
            infection_shape,
            max_secondary_infections: p.int("max_secondary_infections", 99).clamp(0, i64::from(u32::MAX)) as u32,
            timing,
            percent_ill,
            time_to_death,
            death_offset,
            time_to_recovery,
            recovery_offset,
            time_to_sero,
            sero_offset,
            quarantine_day: quardate,
            quarantine_offset,
            test_delay,
            serology,
        };

        let percent_death = |rate: f64| {
            if percent_ill > 0. {
                rate * 100. / percent_ill
            } else {
                0.
            }
        };
        let town = EpiProfile {
            infection_scale: r0_town / infection_shape,
            percent_quarantined: quarantine_town,
            percent_tested: tested_town,
            percent_death: percent_death(death_rate_town),
        };
        let village = EpiProfile {
            infection_scale: r0_village / infection_shape,
            percent_quarantined: quarantine_village,
            percent_tested: tested_village,
            percent_death: percent_death(death_rate_village),
        };

        let population = PopulationSettings {
            total,
            town_fraction,
            villages: villages as usize,
        };
        let interventions = read_interventions(&p, &population);

        let seed = match source.lookup("seed", 0) {
            Some(Ok(v)) if v >= 0. => Some(p.int("seed", 0) as u64),
            _ => None,
        };
        let run = RunSettings {
            runs,
            days,
            initial_infections,
            max_infections: p.int("max_infections", 2_000_000).max(1) as usize,
            seed,
            true_r0_samples: p.int("true_r0_samples", 1_000_000).max(0) as usize,
        };

        let early_stop = if p.int("topresent", 0) != 0 {
            let trigger_infs = p.int("trigger_infs", 1000);
            let trigger = if trigger_infs != 0 {
                StopTrigger::Infections(trigger_infs.max(0) as u64)
            } else {
                StopTrigger::Deaths(p.int("trigger_dths", 1).max(0) as u64)
            };
            Some(EarlyStop {
                trigger,
                present_day: p.int("presentday", 1) as i32,
            })
        } else {
            None
        };

        Ok(SimulationConfig {
            run,
            population,
            timeline,
            infectious_start: inf_start,
            infectious_end: inf_end.min(MAX_AGE),
            town,
            village,
            contacts: ContactModel::from_r0(
                r0_town,
                r0_village,
                r0_townvillage,
                p.int("intervillage_mixing", 0) != 0,
            ),
            interventions,
            early_stop,
        })
    }

    pub fn defaults() -> Result<SimulationConfig> {
        SimulationConfig::from_source(&TextParameters::default())
    }

    pub fn town_total(&self) -> f64 {
        self.population.town_fraction * self.population.total
    }

    pub fn village_total(&self) -> f64 {
        (self.population.total - self.town_total()) / self.population.villages as f64
    }
}

fn read_interventions(p: &Parameters<'_>, population: &PopulationSettings) -> InterventionPolicy {
    let town_total = population.town_fraction * population.total;
    let village_total = (population.total - town_total) / population.villages as f64;

    let has_lockdown = p.int("haslockdown", 0);
    let lockdown_triggers = Triggers {
        deaths: p.int("lockdown_at_dth", -1),
        tests: p.int("lockdown_at_test", -1),
        infections: p.int("lockdown_at_inf", -1),
    };
    let lockdown = Lockdown {
        length: p.int("lockdownlen", 0) as i32,
        infectible_town: p.float("infectible_proportion_town", 0.05555),
        infectible_village: p.float("infectible_proportion_village", 0.05555),
        mixing: MixingReduction {
            town: p.float("pdeff_lockdown_town", 60.),
            village: p.float("pdeff_lockdown_village", 60.),
            mixed: p.float("pdeff_lockdown_mixed", 60.),
        },
        leak_town: LeakWindow {
            amount: 0.01 * p.float("popleak_frac_town", 0.) * town_total,
            len: p.int("popleak_len_town", 0) as i32,
            start_day: p.int("popleak_start_day_town", 0) as i32,
        },
        leak_village: LeakWindow {
            amount: 0.01 * p.float("popleak_frac_village", 0.) * village_total,
            len: p.int("popleak_len_village", 0) as i32,
            start_day: p.int("popleak_start_day_village", 0) as i32,
        },
    };

    let second_lockdown = if has_lockdown == 2 {
        let start_day = p.int("lockdown2startday", 0) as i32;
        Some(SecondLockdown {
            start_day,
            lockdown: Lockdown {
                length: p.int2("lockdownlen", 0) as i32,
                infectible_town: p.float2("infectible_proportion_town", 0.05555),
                infectible_village: p.float2("infectible_proportion_village", 0.05555),
                mixing: MixingReduction {
                    town: p.float2("pdeff_lockdown_town", 60.),
                    village: p.float2("pdeff_lockdown_village", 60.),
                    mixed: p.float2("pdeff_lockdown_mixed", 60.),
                },
                leak_town: LeakWindow {
                    amount: 0.01 * p.float2("popleak_frac_town", 0.) * town_total,
                    len: p.int2("popleak_len_town", 0) as i32,
                    start_day: p.int2("popleak_start_day_town", 0) as i32,
                },
                leak_village: LeakWindow {
                    amount: 0.01 * p.float2("popleak_frac_village", 0.) * village_total,
                    len: p.int2("popleak_len_village", 0) as i32,
                    start_day: p.int2("popleak_start_day_village", 0) as i32,
                },
            },
        })
    } else {
        None
    };

    let distancing = if p.int("physical_distancing", 0) != 0 {
        Some(Distancing {
            triggers: Triggers {
                deaths: p.int("pd_at_dth", -1),
                tests: p.int("pd_at_test", -1),
                infections: p.int("pd_at_inf", -1),
            },
            mixing: MixingReduction {
                town: p.float("pdeff1_town", 30.),
                village: p.float("pdeff1_village", 30.),
                mixed: p.float("pdeff1_mixed", 30.),
            },
        })
    } else {
        None
    };

    InterventionPolicy {
        distancing,
        lockdown_triggers,
        lockdown: (has_lockdown != 0).then_some(lockdown),
        second_lockdown,
    }
}
