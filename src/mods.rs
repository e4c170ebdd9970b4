//! Gameplay modifiers and the parameter transforms they imply.
//!
//! Mods arrive as acronyms. Each acronym maps to exactly one `GameMod`
//! variant; an unknown acronym is rejected when the set is built.

use crate::error::{PerfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Stat values in the game are bounded to 0..=10.
const MAX_STAT: f64 = 10.0;

const EZ_CS_FACTOR: f64 = 0.5;
const EZ_HP_FACTOR: f64 = 0.5;
const HR_CS_FACTOR: f64 = 1.3;
const HR_HP_FACTOR: f64 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameMod {
    NoFail,
    Easy,
    TouchDevice,
    Hidden,
    HardRock,
    SuddenDeath,
    DoubleTime,
    Relax,
    HalfTime,
    Nightcore,
    Flashlight,
    SpunOut,
    Perfect,
    Classic,
}

impl GameMod {
    pub const ALL: [GameMod; 14] = [
        GameMod::NoFail,
        GameMod::Easy,
        GameMod::TouchDevice,
        GameMod::Hidden,
        GameMod::HardRock,
        GameMod::SuddenDeath,
        GameMod::DoubleTime,
        GameMod::Relax,
        GameMod::HalfTime,
        GameMod::Nightcore,
        GameMod::Flashlight,
        GameMod::SpunOut,
        GameMod::Perfect,
        GameMod::Classic,
    ];

    pub fn acronym(self) -> &'static str {
        match self {
            GameMod::NoFail => "NF",
            GameMod::Easy => "EZ",
            GameMod::TouchDevice => "TD",
            GameMod::Hidden => "HD",
            GameMod::HardRock => "HR",
            GameMod::SuddenDeath => "SD",
            GameMod::DoubleTime => "DT",
            GameMod::Relax => "RX",
            GameMod::HalfTime => "HT",
            GameMod::Nightcore => "NC",
            GameMod::Flashlight => "FL",
            GameMod::SpunOut => "SO",
            GameMod::Perfect => "PF",
            GameMod::Classic => "CL",
        }
    }

    /// Legacy bitmask value. Nightcore and Perfect carry their parent bit.
    /// Classic has no legacy representation.
    pub fn bits(self) -> u32 {
        match self {
            GameMod::NoFail => 1 << 0,
            GameMod::Easy => 1 << 1,
            GameMod::TouchDevice => 1 << 2,
            GameMod::Hidden => 1 << 3,
            GameMod::HardRock => 1 << 4,
            GameMod::SuddenDeath => 1 << 5,
            GameMod::DoubleTime => 1 << 6,
            GameMod::Relax => 1 << 7,
            GameMod::HalfTime => 1 << 8,
            GameMod::Nightcore => (1 << 9) | (1 << 6),
            GameMod::Flashlight => 1 << 10,
            GameMod::SpunOut => 1 << 12,
            GameMod::Perfect => (1 << 14) | (1 << 5),
            GameMod::Classic => 0,
        }
    }

    /// Fail-condition mods change nothing about how a play is scored.
    pub fn affects_difficulty(self) -> bool {
        !matches!(self, GameMod::SuddenDeath | GameMod::Perfect)
    }

    fn speeds_up(self) -> bool {
        matches!(self, GameMod::DoubleTime | GameMod::Nightcore)
    }
}

impl fmt::Display for GameMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acronym())
    }
}

impl FromStr for GameMod {
    type Err = PerfError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        GameMod::ALL
            .iter()
            .copied()
            .find(|m| m.acronym() == upper)
            .ok_or_else(|| PerfError::invalid(format!("unknown mod acronym '{}'", s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSet(BTreeSet<GameMod>);

impl ModSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse<S: AsRef<str>>(acronyms: &[S]) -> Result<Self> {
        acronyms
            .iter()
            .map(|a| a.as_ref().parse::<GameMod>())
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    pub fn contains(&self, m: GameMod) -> bool {
        self.0.contains(&m)
    }

    pub fn insert(&mut self, m: GameMod) -> bool {
        self.0.insert(m)
    }

    pub fn iter(&self) -> impl Iterator<Item = GameMod> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> u32 {
        self.iter().fold(0, |acc, m| acc | m.bits())
    }

    /// Reject pairs that cannot appear together in a real play.
    pub fn ensure_consistent(&self) -> Result<()> {
        if self.contains(GameMod::Easy) && self.contains(GameMod::HardRock) {
            return Err(PerfError::invalid("EZ and HR are mutually exclusive"));
        }
        if self.contains(GameMod::HalfTime) && self.iter().any(GameMod::speeds_up) {
            return Err(PerfError::invalid("HT cannot be combined with DT/NC"));
        }
        Ok(())
    }

    pub fn acronyms(&self) -> Vec<String> {
        self.iter().map(|m| m.acronym().to_string()).collect()
    }
}

impl FromIterator<GameMod> for ModSet {
    fn from_iter<I: IntoIterator<Item = GameMod>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Circle size and drain rate as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayParams {
    pub cs: f64,
    pub hp: f64,
}

/// Result of applying a mod set: what the backend gets and what is displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ModTransform {
    pub difficulty_mods: Vec<GameMod>,
    pub display: DisplayParams,
}

impl ModTransform {
    /// Callers pass a consistent set (see `ModSet::ensure_consistent`);
    /// EZ+HR is not filtered here.
    pub fn apply(mods: &ModSet, base_cs: f64, base_hp: f64) -> Self {
        let difficulty_mods = mods.iter().filter(|m| m.affects_difficulty()).collect();

        let mut display = DisplayParams {
            cs: base_cs,
            hp: base_hp,
        };
        if mods.contains(GameMod::Easy) {
            display.cs *= EZ_CS_FACTOR;
            display.hp *= EZ_HP_FACTOR;
        }
        if mods.contains(GameMod::HardRock) {
            display.cs = (display.cs * HR_CS_FACTOR).min(MAX_STAT);
            display.hp = (display.hp * HR_HP_FACTOR).min(MAX_STAT);
        }

        Self {
            difficulty_mods,
            display,
        }
    }

    pub fn difficulty_acronyms(&self) -> Vec<String> {
        self.difficulty_mods
            .iter()
            .map(|m| m.acronym().to_string())
            .collect()
    }
}
