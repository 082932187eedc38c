// ⚔️ Combat - Initiative tracker
//
// Turn order is initiative descending; ties go to the higher initiative
// bonus, then alphabetically. Defeated monsters are skipped, defeated
// players still get their turn (death saves).

use crate::dice::DiceExpr;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub name: String,
    pub initiative: i32,
    pub initiative_bonus: i32,
    pub hit_points: u32,
    pub max_hit_points: u32,
    pub is_player: bool,
}

impl Combatant {
    pub fn new(name: &str, initiative: i32, max_hit_points: u32, is_player: bool) -> Self {
        Combatant {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            initiative,
            initiative_bonus: 0,
            hit_points: max_hit_points,
            max_hit_points,
            is_player,
        }
    }

    pub fn with_bonus(mut self, bonus: i32) -> Self {
        self.initiative_bonus = bonus;
        self
    }

    pub fn is_defeated(&self) -> bool {
        self.hit_points == 0
    }

    /// Whether this combatant still takes turns
    fn acts(&self) -> bool {
        self.is_player || !self.is_defeated()
    }

    fn turn_order(a: &Combatant, b: &Combatant) -> Ordering {
        b.initiative
            .cmp(&a.initiative)
            .then(b.initiative_bonus.cmp(&a.initiative_bonus))
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// 1d20 + bonus
pub fn roll_initiative<R: Rng>(bonus: i32, rng: &mut R) -> i32 {
    let roll = DiceExpr::d20().with_modifier(bonus).roll(rng);
    roll.total as i32
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub name: String,
    combatants: Vec<Combatant>,
    current_id: Option<String>,
    round: u32,
}

impl Encounter {
    pub fn new(name: &str) -> Self {
        Encounter {
            name: name.to_string(),
            ..Encounter::default()
        }
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    /// 0 until the encounter is started
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn add(&mut self, combatant: Combatant) -> &Combatant {
        let id = combatant.id.clone();
        self.combatants.push(combatant);
        self.combatants.sort_by(Combatant::turn_order);

        let idx = self.index_of(&id).unwrap_or(0);
        &self.combatants[idx]
    }

    pub fn get(&self, id: &str) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.combatants.iter().position(|c| c.id == id)
    }

    /// Begin round 1 with the highest initiative
    pub fn start(&mut self) -> Option<&Combatant> {
        self.round = 1;
        self.current_id = self.combatants.iter().find(|c| c.acts()).map(|c| c.id.clone());
        self.current()
    }

    pub fn current(&self) -> Option<&Combatant> {
        self.current_id.as_deref().and_then(|id| self.get(id))
    }

    /// Advance to the next combatant who still acts, wrapping into a new round
    pub fn next_turn(&mut self) -> Option<&Combatant> {
        if self.round == 0 {
            return self.start();
        }

        let start = self
            .current_id
            .as_deref()
            .and_then(|id| self.index_of(id))
            .unwrap_or(self.combatants.len().saturating_sub(1));

        let n = self.combatants.len();
        for step in 1..=n {
            let idx = (start + step) % n;
            if start + step == n {
                self.round += 1;
            }
            if self.combatants[idx].acts() {
                self.current_id = Some(self.combatants[idx].id.clone());
                return self.current();
            }
        }

        self.current_id = None;
        None
    }

    /// Remove a combatant; if it was their turn, the turn passes on
    pub fn remove(&mut self, id: &str) -> Option<Combatant> {
        let idx = self.index_of(id)?;

        if self.current_id.as_deref() == Some(id) {
            self.next_turn();
            if self.current_id.as_deref() == Some(id) {
                self.current_id = None;
            }
        }

        Some(self.combatants.remove(idx))
    }

    pub fn damage(&mut self, id: &str, amount: u32) -> Option<&Combatant> {
        let idx = self.index_of(id)?;
        let c = &mut self.combatants[idx];
        c.hit_points = c.hit_points.saturating_sub(amount);
        Some(&self.combatants[idx])
    }

    pub fn heal(&mut self, id: &str, amount: u32) -> Option<&Combatant> {
        let idx = self.index_of(id)?;
        let c = &mut self.combatants[idx];
        c.hit_points = c.hit_points.saturating_add(amount).min(c.max_hit_points);
        Some(&self.combatants[idx])
    }

    /// Over when every non-player combatant is down
    pub fn is_over(&self) -> bool {
        self.combatants
            .iter()
            .filter(|c| !c.is_player)
            .all(|c| c.is_defeated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn names(e: &Encounter) -> Vec<&str> {
        e.combatants().iter().map(|c| c.name.as_str()).collect()
    }

    fn skirmish() -> Encounter {
        let mut e = Encounter::new("Goblin ambush");
        e.add(Combatant::new("Aria", 15, 20, true).with_bonus(3));
        e.add(Combatant::new("Goblin", 15, 7, false).with_bonus(2));
        e.add(Combatant::new("Bram", 8, 30, true));
        e.add(Combatant::new("Wolf", 18, 11, false));
        e
    }

    #[test]
    fn test_turn_order() {
        assert_eq!(names(&skirmish()), vec!["Wolf", "Aria", "Goblin", "Bram"]);
    }

    #[test]
    fn test_name_breaks_full_ties() {
        let mut e = Encounter::new("tie");
        e.add(Combatant::new("Zed", 10, 5, false));
        e.add(Combatant::new("Abe", 10, 5, false));
        assert_eq!(names(&e), vec!["Abe", "Zed"]);
    }

    #[test]
    fn test_rounds_advance_on_wrap() {
        let mut e = skirmish();
        assert_eq!(e.round(), 0);

        assert_eq!(e.start().unwrap().name, "Wolf");
        assert_eq!(e.next_turn().unwrap().name, "Aria");
        assert_eq!(e.next_turn().unwrap().name, "Goblin");
        assert_eq!(e.next_turn().unwrap().name, "Bram");
        assert_eq!(e.round(), 1);

        assert_eq!(e.next_turn().unwrap().name, "Wolf");
        assert_eq!(e.round(), 2);
    }

    #[test]
    fn test_defeated_monsters_are_skipped_players_are_not() {
        let mut e = skirmish();
        e.start();

        let goblin = e.combatants()[2].id.clone();
        let bram = e.combatants()[3].id.clone();
        e.damage(&goblin, 100);
        e.damage(&bram, 100);

        assert_eq!(e.next_turn().unwrap().name, "Aria");
        assert_eq!(e.next_turn().unwrap().name, "Bram");
    }

    #[test]
    fn test_heal_is_capped() {
        let mut e = skirmish();
        let wolf = e.combatants()[0].id.clone();

        e.damage(&wolf, 5);
        assert_eq!(e.get(&wolf).unwrap().hit_points, 6);
        e.heal(&wolf, 50);
        assert_eq!(e.get(&wolf).unwrap().hit_points, 11);
    }

    #[test]
    fn test_remove_current_passes_turn() {
        let mut e = skirmish();
        e.start();
        e.next_turn();

        let aria = e.current().unwrap().id.clone();
        let removed = e.remove(&aria).unwrap();

        assert_eq!(removed.name, "Aria");
        assert_eq!(e.current().unwrap().name, "Goblin");
        assert_eq!(e.combatants().len(), 3);
    }

    #[test]
    fn test_added_mid_round_keeps_current_turn() {
        let mut e = skirmish();
        e.start();
        e.next_turn();
        e.add(Combatant::new("Ogre", 20, 59, false));

        assert_eq!(e.current().unwrap().name, "Aria");
        assert_eq!(e.combatants()[0].name, "Ogre");
    }

    #[test]
    fn test_encounter_over() {
        let mut e = skirmish();
        assert!(!e.is_over());

        let ids: Vec<String> = e.combatants().iter().filter(|c| !c.is_player).map(|c| c.id.clone()).collect();
        for id in ids {
            e.damage(&id, 1000);
        }
        assert!(e.is_over());
    }

    #[test]
    fn test_roll_initiative_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let init = roll_initiative(2, &mut rng);
            assert!((3..=22).contains(&init));
        }
    }

    #[test]
    fn test_encounter_serializes() {
        let mut e = skirmish();
        e.start();

        let json = serde_json::to_string(&e).unwrap();
        let restored: Encounter = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.current().unwrap().name, "Wolf");
        assert_eq!(restored.round(), 1);
    }
}
