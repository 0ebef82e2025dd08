//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rfid_sim::{ProvisionPolicy, RosterConfig};

use crate::settings::Settings;

/// Participants generated when `--roster seeded` gives no count
const DEFAULT_SEEDED_COUNT: usize = 50;

/// Roster source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RosterKind {
    /// Built-in fixture list
    Fixture,
    /// Deterministic generated field
    Seeded,
    /// Registrations JSON file
    File,
}

/// Simulated RFID readers on virtual serial links
#[derive(Parser, Debug)]
#[command(name = "rfidstub", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (default: $XDG_CONFIG_HOME/rfidstub/settings.json)
    #[arg(long, env = "RFIDSTUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of simulated readers
    #[arg(short = 'n', long)]
    pub devices: Option<usize>,

    /// Directory for reader link paths
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Link helper executable
    #[arg(long)]
    pub helper: Option<String>,

    /// Keep running when some readers fail to start
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Roster source
    #[arg(long, value_enum)]
    pub roster: Option<RosterKind>,

    /// Registrations file for `--roster file`
    #[arg(long)]
    pub roster_file: Option<PathBuf>,

    /// Seed for `--roster seeded`
    #[arg(long)]
    pub seed: Option<u64>,

    /// Participant count for `--roster seeded`
    #[arg(long)]
    pub count: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pick participants from the roster and send their tags (default)
    Run {
        /// Race to load participants for
        #[arg(default_value_t = 3)]
        race_id: u32,

        /// Do not mark sent participants
        #[arg(long)]
        no_sent_marks: bool,
    },

    /// Send generated tags on a fixed interval
    Generate {
        /// First byte of every tag, in hex; tells simulator instances apart
        #[arg(short, long, value_parser = parse_hex_byte)]
        discriminator: Option<u8>,

        /// Milliseconds between tags
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Race whose roster is loaded
        #[arg(long, default_value_t = 3)]
        race_id: u32,
    },

    /// Print tags received on reader device paths
    Dump {
        /// Reader device paths
        paths: Vec<PathBuf>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Run {
            race_id: 3,
            no_sent_marks: false,
        }
    }
}

fn parse_hex_byte(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("expected a hex byte: {e}"))
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) -> Result<(), String> {
        if let Some(devices) = self.devices {
            settings.session.devices = devices;
        }
        if let Some(dir) = &self.dir {
            settings.session.link.dir = dir.clone();
        }
        if let Some(helper) = &self.helper {
            settings.session.link.helper = helper.clone();
        }
        if self.continue_on_failure {
            settings.session.provision_policy = ProvisionPolicy::Continue;
        }
        if let Some(roster) = self.roster_config(&settings.roster)? {
            settings.roster = roster;
        }

        match &self.command {
            Some(Command::Run { no_sent_marks, .. }) if *no_sent_marks => {
                settings.track_sent = false;
            }
            Some(Command::Generate {
                discriminator,
                interval_ms,
                ..
            }) => {
                if let Some(d) = discriminator {
                    settings.generator.discriminator = *d;
                }
                if let Some(ms) = interval_ms {
                    settings.generator.interval_ms = *ms;
                }
            }
            Some(Command::Dump { paths, baud }) => {
                if !paths.is_empty() {
                    settings.dump_paths = paths.clone();
                }
                if let Some(baud) = baud {
                    settings.session.link.baud_rate = *baud;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Roster selected on the command line, if any
    ///
    /// `--roster-file` alone selects a file roster and `--seed` alone a seeded one.
    fn roster_config(&self, current: &RosterConfig) -> Result<Option<RosterConfig>, String> {
        let kind = match (self.roster, &self.roster_file, self.seed) {
            (Some(kind), _, _) => kind,
            (None, Some(_), _) => RosterKind::File,
            (None, None, Some(_)) => RosterKind::Seeded,
            (None, None, None) => return Ok(None),
        };

        let config = match kind {
            RosterKind::Fixture => RosterConfig::Fixture,
            RosterKind::Seeded => {
                let (seed, count) = match current {
                    RosterConfig::Seeded { seed, count } => (*seed, *count),
                    _ => (0, DEFAULT_SEEDED_COUNT),
                };
                RosterConfig::Seeded {
                    seed: self.seed.unwrap_or(seed),
                    count: self.count.unwrap_or(count),
                }
            }
            RosterKind::File => match (&self.roster_file, current) {
                (Some(path), _) => RosterConfig::File { path: path.clone() },
                (None, RosterConfig::File { path }) => RosterConfig::File { path: path.clone() },
                (None, _) => return Err("--roster file needs --roster-file".to_string()),
            },
        };
        Ok(Some(config))
    }
}
