use assert_float_eq::*;
use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CompartmentId {
    Town,
    Village(usize),
}

impl CompartmentId {
    /// Numeric code used in output files: 1 for the town, `k + 2` for village `k`.
    pub fn code(&self) -> usize {
        match self {
            CompartmentId::Town => 1,
            CompartmentId::Village(k) => k + 2,
        }
    }

    pub fn is_town(&self) -> bool {
        matches!(self, CompartmentId::Town)
    }
}

impl Display for CompartmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompartmentId::Town => write!(f, "town"),
            CompartmentId::Village(k) => write!(f, "village {}", k),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    pub total_population: f64,
    pub effective_population: f64,
    pub cumulative_infections: u64,
    /// Cumulative infections minus those whose antibodies fell below the
    /// reinfection threshold.
    pub adjusted_infections: u64,
    pub new_infections: u64,
}

impl Compartment {
    fn new(total_population: f64) -> Compartment {
        Compartment {
            total_population,
            effective_population: total_population,
            cumulative_infections: 0,
            adjusted_infections: 0,
            new_infections: 0,
        }
    }

    fn reset(&mut self) {
        *self = Compartment::new(self.total_population);
    }

    pub fn herd_level(&self) -> f64 {
        if self.effective_population <= 0. {
            return 100.;
        }
        100. * self.adjusted_infections as f64 / self.effective_population
    }

    fn leak(&mut self, amount: f64) {
        self.effective_population = (self.effective_population + amount).min(self.total_population);
    }
}

// Frozen once per infector so all of its attempts that day see the same levels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HerdLevels {
    pub town: f64,
    pub villages: Vec<f64>,
}

impl HerdLevels {
    pub fn get(&self, id: CompartmentId) -> f64 {
        match id {
            CompartmentId::Town => self.town,
            CompartmentId::Village(k) => self.villages[k],
        }
    }

    pub fn num_villages(&self) -> usize {
        self.villages.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InfectionRates {
    pub town: f64,
    pub village: f64,
    pub overall: f64,
}

#[derive(Debug, Clone)]
pub struct Population {
    total: f64,
    town: Compartment,
    villages: Vec<Compartment>,
}

impl Population {
    pub fn new(total: f64, town_fraction: f64, num_villages: usize) -> Population {
        assert!(num_villages > 0, "a population needs at least one village");
        let town_total = town_fraction * total;
        let village_total = (total - town_total) / num_villages as f64;
        let p = Population {
            total,
            town: Compartment::new(town_total),
            villages: vec![Compartment::new(village_total); num_villages],
        };
        let sum: f64 = p.town.total_population
            + p.villages.iter().map(|v| v.total_population).sum::<f64>();
        assert_float_absolute_eq!(sum, total, 1e-3 * total.max(1.));
        p
    }

    pub fn reset(&mut self) {
        self.town.reset();
        self.villages.iter_mut().for_each(Compartment::reset);
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn town(&self) -> &Compartment {
        &self.town
    }

    pub fn villages(&self) -> &[Compartment] {
        &self.villages
    }

    pub fn num_villages(&self) -> usize {
        self.villages.len()
    }

    pub fn get(&self, id: CompartmentId) -> &Compartment {
        match id {
            CompartmentId::Town => &self.town,
            CompartmentId::Village(k) => &self.villages[k],
        }
    }

    pub fn get_mut(&mut self, id: CompartmentId) -> &mut Compartment {
        match id {
            CompartmentId::Town => &mut self.town,
            CompartmentId::Village(k) => &mut self.villages[k],
        }
    }

    pub fn herd_level(&self, id: CompartmentId) -> f64 {
        self.get(id).herd_level()
    }

    pub fn snapshot_herd_levels(&self, levels: &mut HerdLevels) {
        levels.town = self.town.herd_level();
        levels.villages.clear();
        levels
            .villages
            .extend(self.villages.iter().map(Compartment::herd_level));
    }

    pub fn record_infection(&mut self, id: CompartmentId) {
        let c = self.get_mut(id);
        c.cumulative_infections += 1;
        c.adjusted_infections += 1;
        c.new_infections += 1;
    }

    pub fn record_waning(&mut self, id: CompartmentId) {
        let c = self.get_mut(id);
        c.adjusted_infections = c.adjusted_infections.saturating_sub(1);
    }

    pub fn start_day(&mut self) {
        self.town.new_infections = 0;
        for v in self.villages.iter_mut() {
            v.new_infections = 0;
        }
    }

    pub fn restore_effective(&mut self) {
        self.town.effective_population = self.town.total_population;
        for v in self.villages.iter_mut() {
            v.effective_population = v.total_population;
        }
    }

    pub fn restrict_effective(&mut self, town_proportion: f64, village_proportion: f64) {
        self.town.effective_population = self.town.total_population * town_proportion;
        for v in self.villages.iter_mut() {
            v.effective_population = v.total_population * village_proportion;
        }
    }

    pub fn leak_town(&mut self, amount: f64) {
        self.town.leak(amount);
    }

    pub fn leak_villages(&mut self, amount: f64) {
        for v in self.villages.iter_mut() {
            v.leak(amount);
        }
    }

    pub fn village_total_population(&self) -> f64 {
        self.total - self.town.total_population
    }

    pub fn village_effective_population(&self) -> f64 {
        self.villages.iter().map(|v| v.effective_population).sum()
    }

    pub fn village_infections(&self) -> u64 {
        self.villages.iter().map(|v| v.cumulative_infections).sum()
    }

    pub fn village_new_infections(&self) -> u64 {
        self.villages.iter().map(|v| v.new_infections).sum()
    }

    pub fn infection_rates(&self) -> InfectionRates {
        let town = self.town.cumulative_infections as f64;
        let village = self.village_infections() as f64;
        InfectionRates {
            town: percentage(town, self.town.total_population),
            village: percentage(village, self.village_total_population()),
            overall: percentage(town + village, self.total),
        }
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0. {
        0.
    } else {
        100. * part / whole
    }
}
