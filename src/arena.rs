use crate::agent::{Agent, Serology};
use crate::compartment::CompartmentId;
use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    NeverUsed,
    Active(CompartmentId),
    Free(CompartmentId),
}

#[derive(Debug)]
struct Slot {
    occupancy: Occupancy,
    agent: Option<Agent>,
    serology: Serology,
}

#[derive(Debug)]
pub struct AgentArena {
    capacity: usize,
    slots: Vec<Slot>,
    active: usize,
}

impl AgentArena {
    pub fn with_capacity(capacity: usize) -> AgentArena {
        AgentArena {
            capacity,
            slots: Vec::new(),
            active: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    // Overflow is fatal: the capacity is an operator-set limit.
    pub fn allocate(&mut self, agent: Agent, serology: Serology) -> Result<usize> {
        if self.slots.len() >= self.capacity {
            return Err(SimError::ArenaFull {
                capacity: self.capacity,
            });
        }
        let idx = self.slots.len();
        self.slots.push(Slot {
            occupancy: Occupancy::Active(agent.compartment),
            agent: Some(agent),
            serology,
        });
        self.active += 1;
        Ok(idx)
    }

    pub fn free(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        match slot.occupancy {
            Occupancy::Active(compartment) => {
                slot.occupancy = Occupancy::Free(compartment);
                slot.agent = None;
                self.active -= 1;
            }
            other => panic!("slot {} freed while {:?}", idx, other),
        }
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.active = 0;
    }

    pub fn occupancy(&self, idx: usize) -> Occupancy {
        match self.slots.get(idx) {
            None => Occupancy::NeverUsed,
            Some(slot) => slot.occupancy,
        }
    }

    pub fn agent(&self, idx: usize) -> Option<&Agent> {
        self.slots.get(idx).and_then(|s| s.agent.as_ref())
    }

    pub fn serology(&self, idx: usize) -> Option<&Serology> {
        self.slots.get(idx).map(|s| &s.serology)
    }

    pub fn serology_mut(&mut self, idx: usize) -> Option<&mut Serology> {
        self.slots.get_mut(idx).map(|s| &mut s.serology)
    }

    pub fn records_mut(&mut self, idx: usize) -> Option<(&mut Agent, &mut Serology)> {
        let slot = self.slots.get_mut(idx)?;
        let agent = slot.agent.as_mut()?;
        Some((agent, &mut slot.serology))
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &Agent)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.agent.as_ref().map(|a| (idx, a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{dummy_agent, dummy_serology};

    #[test]
    fn slots_are_handed_out_in_order() {
        let mut arena = AgentArena::with_capacity(4);
        assert_eq!(arena.occupancy(0), Occupancy::NeverUsed);
        let a = arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()).unwrap();
        let b = arena
            .allocate(dummy_agent(CompartmentId::Village(2)), dummy_serology())
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(arena.occupancy(1), Occupancy::Active(CompartmentId::Village(2)));
        assert_eq!(arena.occupancy(2), Occupancy::NeverUsed);
        assert_eq!(arena.active(), 2);
    }

    #[test]
    fn freed_slot_remembers_compartment_and_is_not_reused() {
        let mut arena = AgentArena::with_capacity(4);
        let a = arena
            .allocate(dummy_agent(CompartmentId::Village(5)), dummy_serology())
            .unwrap();
        arena.free(a);
        assert_eq!(arena.occupancy(a), Occupancy::Free(CompartmentId::Village(5)));
        assert!(arena.agent(a).is_none());
        assert!(arena.serology(a).is_some());
        let b = arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.active(), 1);
        assert_eq!(arena.iter_active().map(|(i, _)| i).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    #[should_panic]
    fn double_free_panics() {
        let mut arena = AgentArena::with_capacity(4);
        let a = arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()).unwrap();
        arena.free(a);
        arena.free(a);
    }

    #[test]
    fn capacity_is_a_hard_limit() {
        let mut arena = AgentArena::with_capacity(2);
        for _ in 0..2 {
            arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()).unwrap();
        }
        match arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()) {
            Err(SimError::ArenaFull { capacity }) => assert_eq!(capacity, 2),
            other => panic!("expected ArenaFull, got {:?}", other.map(|_| ())),
        }
        arena.reset();
        assert!(arena.is_empty());
        assert_eq!(arena.occupancy(0), Occupancy::NeverUsed);
        assert!(arena.allocate(dummy_agent(CompartmentId::Town), dummy_serology()).is_ok());
    }
}
