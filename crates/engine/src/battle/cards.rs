use tracing::debug;

/// A chip the player loaded into the hand for the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleCard {
    pub short_name: String,
    pub damage: i32,
    pub booster: bool,
}

impl BattleCard {
    pub fn new(short_name: impl Into<String>, damage: i32) -> Self {
        Self {
            short_name: short_name.into(),
            damage,
            booster: false,
        }
    }

    pub fn booster(short_name: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            damage: 0,
            booster: true,
        }
    }

    /// Bonus carried by `Atk+N` boosters; zero for anything else.
    fn attack_bonus(&self) -> i32 {
        self.short_name
            .strip_prefix("Atk+")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Folds support cards into the damage of the closest preceding attack card and drops them
/// from the hand. Boosters with no attack before them are discarded unused.
pub fn filter_support_cards(cards: &mut Vec<BattleCard>) {
    let mut kept: Vec<BattleCard> = Vec::with_capacity(cards.len());
    for card in cards.drain(..) {
        if !card.booster {
            kept.push(card);
            continue;
        }
        debug!(card = %card.short_name, "booster_card_detected");
        if let Some(target) = kept.last_mut() {
            target.damage += card.attack_bonus();
        }
    }
    *cards = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boosters_add_to_the_previous_attack() {
        let mut hand = vec![
            BattleCard::booster("Atk+10"),
            BattleCard::new("Cannon", 40),
            BattleCard::booster("Atk+30"),
            BattleCard::booster("Atk+10"),
            BattleCard::new("Sword", 80),
            BattleCard::booster("Guard"),
        ];
        filter_support_cards(&mut hand);

        assert_eq!(
            hand,
            vec![BattleCard::new("Cannon", 80), BattleCard::new("Sword", 80)]
        );
    }
}
