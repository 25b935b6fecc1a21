//! Match settings and their sanitization

use serde::{Deserialize, Serialize};

use super::weapon::WeaponKind;

pub const SCORE_TARGET_RANGE: (u32, u32) = (1, 20);
pub const TIME_LIMIT_MINUTES_RANGE: (u32, u32) = (1, 15);
pub const MULTIPLIER_RANGE: (u32, u32) = (100, 200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinType {
    LastKnightStanding,
    KillBased,
    TimeBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettings {
    pub win_type: WinType,
    pub score_target: u32,
    pub time_limit_minutes: u32,
    pub map_id: String,
    pub enabled_weapons: Vec<WeaponKind>,
    pub friendly_fire: bool,
    /// Movement speed as a percentage of base
    pub speed_multiplier: u32,
    /// Powerup spawn rate as a percentage of base
    pub weapon_spawn_rate: u32,
}

impl MatchSettings {
    pub fn with_map(map_id: impl Into<String>) -> Self {
        Self {
            win_type: WinType::LastKnightStanding,
            score_target: 5,
            time_limit_minutes: 5,
            map_id: map_id.into(),
            enabled_weapons: WeaponKind::ALL.to_vec(),
            friendly_fire: false,
            speed_multiplier: 100,
            weapon_spawn_rate: 100,
        }
    }

    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit_minutes as u64 * 60_000
    }
}

/// Partial update sent by the host; absent fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchSettingsUpdate {
    pub win_type: Option<WinType>,
    pub score_target: Option<u32>,
    pub time_limit_minutes: Option<u32>,
    pub map_id: Option<String>,
    pub enabled_weapons: Option<Vec<WeaponKind>>,
    pub friendly_fire: Option<bool>,
    pub speed_multiplier: Option<u32>,
    pub weapon_spawn_rate: Option<u32>,
}

impl MatchSettingsUpdate {
    /// Merge into `settings`, clamping numeric fields and forcing the sword
    /// into the enabled set. Map ids are applied as given; the caller checks
    /// them against its map provider.
    pub fn apply(self, settings: &mut MatchSettings) {
        if let Some(win_type) = self.win_type {
            settings.win_type = win_type;
        }
        if let Some(v) = self.score_target {
            settings.score_target = v.clamp(SCORE_TARGET_RANGE.0, SCORE_TARGET_RANGE.1);
        }
        if let Some(v) = self.time_limit_minutes {
            settings.time_limit_minutes = v.clamp(TIME_LIMIT_MINUTES_RANGE.0, TIME_LIMIT_MINUTES_RANGE.1);
        }
        if let Some(map_id) = self.map_id {
            settings.map_id = map_id;
        }
        if let Some(mut weapons) = self.enabled_weapons {
            weapons.push(WeaponKind::Sword);
            weapons.sort();
            weapons.dedup();
            settings.enabled_weapons = weapons;
        }
        if let Some(v) = self.friendly_fire {
            settings.friendly_fire = v;
        }
        if let Some(v) = self.speed_multiplier {
            settings.speed_multiplier = v.clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1);
        }
        if let Some(v) = self.weapon_spawn_rate {
            settings.weapon_spawn_rate = v.clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sword_is_always_enabled() {
        let mut s = MatchSettings::with_map("arena");
        MatchSettingsUpdate {
            enabled_weapons: Some(vec![WeaponKind::Bow, WeaponKind::Bow]),
            ..Default::default()
        }
        .apply(&mut s);
        assert_eq!(s.enabled_weapons, vec![WeaponKind::Sword, WeaponKind::Bow]);
    }

    #[test]
    fn absent_fields_are_untouched() {
        let mut s = MatchSettings::with_map("arena");
        let before = s.clone();
        MatchSettingsUpdate::default().apply(&mut s);
        assert_eq!(s, before);
    }

    #[test]
    fn update_parses_partial_camel_case_json() {
        let update: MatchSettingsUpdate =
            serde_json::from_str(r#"{"winType":"KILL_BASED","scoreTarget":50}"#).expect("parses");
        let mut s = MatchSettings::with_map("arena");
        update.apply(&mut s);
        assert_eq!(s.win_type, WinType::KillBased);
        assert_eq!(s.score_target, 20);
    }

    proptest! {
        #[test]
        fn numeric_settings_always_land_in_range(
            score in any::<u32>(),
            minutes in any::<u32>(),
            speed in any::<u32>(),
            rate in any::<u32>(),
        ) {
            let mut s = MatchSettings::with_map("arena");
            MatchSettingsUpdate {
                score_target: Some(score),
                time_limit_minutes: Some(minutes),
                speed_multiplier: Some(speed),
                weapon_spawn_rate: Some(rate),
                ..Default::default()
            }
            .apply(&mut s);
            prop_assert!((1..=20).contains(&s.score_target));
            prop_assert!((1..=15).contains(&s.time_limit_minutes));
            prop_assert!((100..=200).contains(&s.speed_multiplier));
            prop_assert!((100..=200).contains(&s.weapon_spawn_rate));
        }
    }
}
