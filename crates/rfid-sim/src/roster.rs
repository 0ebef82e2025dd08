//! Race participants and where they come from
//!
//! A roster source hands back every registration for a race. Only
//! participants with both a start number and a tag can have reads simulated,
//! so everyone else is dropped when the roster is built.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rfid_protocol::{TagValue, TAG_ID_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RosterError;

/// Race category a participant is registered in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Course a participant runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One race registration, as served by the race API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub start_number: Option<u32>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tag_id: Option<String>,
    pub track: Track,
}

/// A participant that can have tag reads simulated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub start_number: u32,
    pub tag_id: String,
    pub participant: Participant,
}

impl RosterEntry {
    /// One-line menu label: start number, tag, name
    pub fn label(&self) -> String {
        format!(
            "#{:04} {} {} {}",
            self.start_number,
            self.tag_id,
            self.participant.first_name,
            self.participant.last_name
        )
    }
}

/// Tag-assignable participants for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Keep participants that have both a start number and a tag
    pub fn from_participants(participants: Vec<Participant>) -> Self {
        let total = participants.len();
        let entries: Vec<RosterEntry> = participants
            .into_iter()
            .filter_map(|p| match (p.start_number, p.tag_id.clone()) {
                (Some(start_number), Some(tag_id)) => Some(RosterEntry {
                    start_number,
                    tag_id,
                    participant: p,
                }),
                _ => {
                    debug!(
                        "Excluding participant {} ({} {}): missing start number or tag",
                        p.id, p.first_name, p.last_name
                    );
                    None
                }
            })
            .collect();

        info!("Roster: {} of {} participants have tags", entries.len(), total);
        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&RosterEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Something that can list a race's registrations
pub trait RosterSource: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Fetch every registration for `race_id`
    fn fetch(&self, race_id: u32) -> Result<Vec<Participant>, RosterError>;
}

/// Fetch from `source` and keep the tag-assignable participants
pub fn load_roster(source: &dyn RosterSource, race_id: u32) -> Result<Roster, RosterError> {
    info!("Loading race {} roster from {}", race_id, source.describe());
    Ok(Roster::from_participants(source.fetch(race_id)?))
}

/// Roster source selection, as stored in settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterConfig {
    /// Built-in fixture list
    #[default]
    Fixture,
    /// Deterministic generated field
    Seeded { seed: u64, count: usize },
    /// Registrations dumped from the race API
    File { path: PathBuf },
}

impl RosterConfig {
    /// Build the configured source
    pub fn into_source(self) -> Box<dyn RosterSource> {
        match self {
            RosterConfig::Fixture => Box::new(FixtureRoster),
            RosterConfig::Seeded { seed, count } => Box::new(SeededRoster::new(seed, count)),
            RosterConfig::File { path } => Box::new(JsonFileRoster::new(path)),
        }
    }
}

fn category(id: u32, name: &str) -> Category {
    Category {
        id,
        name: name.to_string(),
        description: None,
    }
}

fn track(id: u32, name: &str) -> Track {
    Track {
        id,
        name: name.to_string(),
        description: String::new(),
    }
}

/// Fixed list of registrations, including some that cannot be simulated
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureRoster;

impl RosterSource for FixtureRoster {
    fn describe(&self) -> String {
        "built-in fixture".to_string()
    }

    fn fetch(&self, _race_id: u32) -> Result<Vec<Participant>, RosterError> {
        Ok(FIXTURE
            .iter()
            .map(|&(id, first, last, start_number, tag, (cat_id, cat), (track_id, trk))| {
                Participant {
                    id,
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    start_number,
                    categories: vec![category(cat_id, cat)],
                    tag_id: tag.map(str::to_string),
                    track: track(track_id, trk),
                }
            })
            .collect())
    }
}

type FixtureRow = (
    u32,
    &'static str,
    &'static str,
    Option<u32>,
    Option<&'static str>,
    (u32, &'static str),
    (u32, &'static str),
);

#[rustfmt::skip]
const FIXTURE: &[FixtureRow] = &[
    (1, "John", "Doe", None, Some("E200001234"), (92, "A10"), (25, "10 Km")),
    (2, "Carlos", "Smith", Some(123), Some("E200001111"), (92, "A10"), (25, "10 Km")),
    (3, "Oioioi", "Boi", Some(124), None, (93, "B4"), (26, "4 Km")),
    (4, "Jana", "Novakova", Some(125), Some("E200002222"), (94, "W10"), (25, "10 Km")),
    (5, "Petr", "Svoboda", Some(126), Some("E200003333"), (93, "B4"), (26, "4 Km")),
    (6, "Eva", "Dvorakova", Some(127), Some("E200004444"), (95, "W4"), (26, "4 Km")),
];

const FIRST_NAMES: &[&str] = &[
    "Adam", "Barbora", "Cyril", "Dana", "Emil", "Filip", "Hana", "Ivan", "Klara", "Lukas",
    "Marie", "Ondrej", "Pavla", "Radek", "Tereza", "Vojtech",
];

const LAST_NAMES: &[&str] = &[
    "Benes", "Cerny", "Dolezal", "Fiala", "Horak", "Kral", "Kucera", "Marek", "Nemec", "Pokorny",
    "Ruzicka", "Sedlacek", "Vesely", "Zeman",
];

/// Generated field of participants, reproducible from a seed
#[derive(Debug, Clone, Copy)]
pub struct SeededRoster {
    seed: u64,
    count: usize,
}

impl SeededRoster {
    /// Every n-th participant has no tag
    const NO_TAG_EVERY: usize = 7;
    /// Every n-th participant has no start number
    const NO_START_NUMBER_EVERY: usize = 11;
    const FIRST_START_NUMBER: u32 = 100;

    pub fn new(seed: u64, count: usize) -> Self {
        Self { seed, count }
    }
}

impl RosterSource for SeededRoster {
    fn describe(&self) -> String {
        format!("generator (seed {}, {} participants)", self.seed, self.count)
    }

    fn fetch(&self, race_id: u32) -> Result<Vec<Participant>, RosterError> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ (u64::from(race_id) << 32));
        let categories = [category(92, "A10"), category(93, "B4"), category(94, "W10")];
        let tracks = [track(25, "10 Km"), track(26, "4 Km")];

        let participants = (1..=self.count)
            .map(|n| {
                let tag = rng.gen::<[u8; TAG_ID_LEN]>();
                let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
                let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
                Participant {
                    id: n as u32,
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    start_number: (n % Self::NO_START_NUMBER_EVERY != 0)
                        .then(|| Self::FIRST_START_NUMBER + n as u32),
                    categories: vec![categories[rng.gen_range(0..categories.len())].clone()],
                    tag_id: (n % Self::NO_TAG_EVERY != 0).then(|| TagValue::new(tag).to_hex()),
                    track: tracks[rng.gen_range(0..tracks.len())].clone(),
                }
            })
            .collect();
        Ok(participants)
    }
}

/// Registrations read from a JSON file in the race API format
#[derive(Debug, Clone)]
pub struct JsonFileRoster {
    path: PathBuf,
}

impl JsonFileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RosterSource for JsonFileRoster {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn fetch(&self, _race_id: u32) -> Result<Vec<Participant>, RosterError> {
        let json = std::fs::read_to_string(&self.path).map_err(|source| RosterError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| RosterError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
