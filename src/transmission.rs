use crate::compartment::{CompartmentId, HerdLevels};
use crate::distributions::Sampler;
use crate::intervention::MixingReduction;

/// How contacts split between the town and the villages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModel {
    pub town_cross_percent: f64,
    pub village_cross_percent: f64,
    // Within-village contacts pick any village instead of staying home.
    pub intervillage_mixing: bool,
}

impl ContactModel {
    pub fn from_r0(r0_town: f64, r0_village: f64, r0_townvillage: f64, intervillage_mixing: bool) -> ContactModel {
        ContactModel {
            town_cross_percent: cross_percent(r0_townvillage, r0_town),
            village_cross_percent: cross_percent(r0_townvillage, r0_village),
            intervillage_mixing,
        }
    }
}

fn cross_percent(r0_cross: f64, r0_own: f64) -> f64 {
    if r0_own > 0. {
        100. * r0_cross / r0_own
    } else {
        0.
    }
}

/// Compartment of the new infection, or `None` when the contact was
/// suppressed or met someone already immune.
pub fn resolve(
    sampler: &mut Sampler,
    from: CompartmentId,
    herd: &HerdLevels,
    mixing: Option<&MixingReduction>,
    contacts: &ContactModel,
) -> Option<CompartmentId> {
    let target = match from {
        CompartmentId::Town => {
            if sampler.chance(contacts.town_cross_percent) {
                if !unsuppressed(sampler, mixing.map(|m| m.mixed)) {
                    return None;
                }
                CompartmentId::Village(sampler.index(herd.num_villages()))
            } else {
                if !unsuppressed(sampler, mixing.map(|m| m.town)) {
                    return None;
                }
                CompartmentId::Town
            }
        }
        CompartmentId::Village(home) => {
            if sampler.chance(contacts.village_cross_percent) {
                if !unsuppressed(sampler, mixing.map(|m| m.mixed)) {
                    return None;
                }
                CompartmentId::Town
            } else {
                if !unsuppressed(sampler, mixing.map(|m| m.village)) {
                    return None;
                }
                if contacts.intervillage_mixing {
                    CompartmentId::Village(sampler.index(herd.num_villages()))
                } else {
                    CompartmentId::Village(home)
                }
            }
        }
    };

    if sampler.chance(100. - herd.get(target)) {
        Some(target)
    } else {
        None
    }
}

fn unsuppressed(sampler: &mut Sampler, percent: Option<f64>) -> bool {
    match percent {
        None => true,
        Some(p) => sampler.chance(100. - p),
    }
}
