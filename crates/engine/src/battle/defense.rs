use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;

use super::EntityId;

bitflags! {
    /// Properties an incoming hit carries into the defense judge.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct HitFlags: u32 {
        const RETAIN_INTANGIBLE = 1 << 0;
        const FLINCH            = 1 << 1;
        const SHAKE             = 1 << 2;
        const PIERCE_GUARD      = 1 << 3;
        const IMPACT            = 1 << 4;
        const DRAG              = 1 << 5;
        const NO_COUNTER        = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: i32,
    pub flags: HitFlags,
    pub aggressor: Option<EntityId>,
    /// Collision hits come from spells touching the defender; the rest is direct damage.
    pub collision: bool,
}

impl Hit {
    pub fn new(damage: i32, flags: HitFlags) -> Self {
        Self {
            damage,
            flags,
            aggressor: None,
            collision: true,
        }
    }

    pub fn from_aggressor(mut self, aggressor: EntityId) -> Self {
        self.aggressor = Some(aggressor);
        self
    }

    pub fn direct(mut self) -> Self {
        self.collision = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefensePriority {
    Internal,
    Barrier,
    Body,
    CardAction,
    Trap,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefenseOrder {
    Always,
    CollisionOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefenseJudge {
    pub damage_blocked: bool,
    pub impact_blocked: bool,
}

impl DefenseJudge {
    pub fn block_damage(&mut self) {
        self.damage_blocked = true;
    }

    pub fn block_impact(&mut self) {
        self.impact_blocked = true;
    }
}

pub trait DefenseRule {
    fn priority(&self) -> DefensePriority;

    fn order(&self) -> DefenseOrder {
        DefenseOrder::Always
    }

    fn can_block(&mut self, judge: &mut DefenseJudge, hit: &Hit, defender: EntityId);

    fn filter_statuses(&mut self, _hit: &mut Hit) {}

    /// Called on the rule being displaced by a newer rule of equal priority.
    fn on_replace(&mut self) {}
}

pub type SharedDefenseRule = Rc<RefCell<dyn DefenseRule>>;

fn same_rule(a: &SharedDefenseRule, b: &SharedDefenseRule) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Defense rules of one character, sorted by priority with at most one rule per priority
/// except `Last`.
#[derive(Default, Clone)]
pub struct DefenseRuleList {
    rules: Vec<SharedDefenseRule>,
}

impl std::fmt::Debug for DefenseRuleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let priorities: Vec<DefensePriority> = self
            .rules
            .iter()
            .map(|rule| rule.borrow().priority())
            .collect();
        f.debug_struct("DefenseRuleList")
            .field("priorities", &priorities)
            .finish()
    }
}

impl DefenseRuleList {
    pub fn add(&mut self, rule: SharedDefenseRule) {
        let priority = rule.borrow().priority();
        if priority == DefensePriority::Last {
            self.rules.push(rule);
            return;
        }

        let Some(index) = self
            .rules
            .iter()
            .position(|existing| existing.borrow().priority() >= priority)
        else {
            self.rules.push(rule);
            return;
        };

        if self.rules[index].borrow().priority() > priority {
            self.rules.insert(index, rule);
        } else {
            let replaced = std::mem::replace(&mut self.rules[index], rule);
            replaced.borrow_mut().on_replace();
        }
    }

    pub fn remove(&mut self, rule: &SharedDefenseRule) -> bool {
        match self.rules.iter().position(|existing| same_rule(existing, rule)) {
            Some(index) => {
                self.rules.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, rule: &SharedDefenseRule) -> bool {
        self.rules.iter().any(|existing| same_rule(existing, rule))
    }

    pub fn priorities(&self) -> Vec<DefensePriority> {
        self.rules
            .iter()
            .map(|rule| rule.borrow().priority())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule that applies to the hit (collision-only rules skip direct damage), then
    /// lets all rules filter the hit's statuses. `NO_COUNTER` survives filtering.
    pub fn judge(&self, hit: &mut Hit, defender: EntityId) -> DefenseJudge {
        let mut judge = DefenseJudge::default();
        for rule in &self.rules {
            let mut rule = rule.borrow_mut();
            if rule.order() == DefenseOrder::CollisionOnly && !hit.collision {
                continue;
            }
            rule.can_block(&mut judge, hit, defender);
        }

        let no_counter = hit.flags & HitFlags::NO_COUNTER;
        for rule in &self.rules {
            rule.borrow_mut().filter_statuses(hit);
        }
        hit.flags |= no_counter;
        judge
    }
}

/// Watches the player's incoming hits while a counter bonus is active. An impact hit that gets
/// through arms a revoke signal the scene consumes on its next tick.
#[derive(Debug, Default)]
pub struct CounterDefenseRule {
    revoke: Cell<bool>,
}

impl CounterDefenseRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_revoke_signal(&self) -> bool {
        self.revoke.replace(false)
    }
}

impl DefenseRule for CounterDefenseRule {
    fn priority(&self) -> DefensePriority {
        DefensePriority::Last
    }

    fn order(&self) -> DefenseOrder {
        DefenseOrder::CollisionOnly
    }

    fn can_block(&mut self, judge: &mut DefenseJudge, hit: &Hit, _defender: EntityId) {
        if hit.flags.contains(HitFlags::IMPACT) && !judge.impact_blocked {
            self.revoke.set(true);
        }
    }
}
